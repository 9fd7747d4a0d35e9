//! Document entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "documents")]
pub struct Model {
    /// NFD-normalized title
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub id: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub url: Option<String>,

    #[sea_orm(column_type = "Text")]
    pub title: String,

    /// JSON array of plain-text paragraphs
    #[sea_orm(column_type = "Json")]
    pub text: Json,

    /// JSON array of paragraphs with link markup
    #[sea_orm(column_type = "Json")]
    pub text_with_links: Json,

    /// JSON array of per-paragraph tag lists, absent when not tagged
    #[sea_orm(column_type = "Json", nullable)]
    pub text_ner: Option<Json>,

    pub paragraph_count: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
