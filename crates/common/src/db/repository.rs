//! Repository for document store operations
//!
//! Wraps the `documents` table behind batched lookups and implements the
//! [`DocumentStore`] contract for the selection pipeline.

use crate::corpus::{DocumentRecord, DocumentStore};
use crate::db::models::*;
use crate::db::DbPool;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Schema, Set,
};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Repository for document access
#[derive(Clone)]
pub struct DocumentRepository {
    pool: DbPool,
    batch_size: usize,
}

impl DocumentRepository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool, batch_size: usize) -> Self {
        Self {
            pool,
            batch_size: batch_size.max(1),
        }
    }

    fn conn(&self) -> &DatabaseConnection {
        self.pool.conn()
    }

    // ========================================================================
    // Schema
    // ========================================================================

    /// Create the `documents` table if it does not exist
    pub async fn create_schema(&self) -> Result<()> {
        if self.pool.is_read_only() {
            return Err(AppError::Store {
                message: "cannot create schema on a read-only store".to_string(),
            });
        }

        let backend = self.conn().get_database_backend();
        let schema = Schema::new(backend);
        let mut stmt = schema.create_table_from_entity(DocumentEntity);
        stmt.if_not_exists();

        self.conn().execute(backend.build(&stmt)).await?;
        Ok(())
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Fetch documents by id, in the order of `ids`; missing ids are omitted
    pub async fn find_batch(&self, ids: &[String]) -> Result<Vec<DocumentRecord>> {
        let mut found: HashMap<String, DocumentRecord> = HashMap::with_capacity(ids.len());

        for chunk in ids.chunks(self.batch_size) {
            let rows = DocumentEntity::find()
                .filter(DocumentColumn::Id.is_in(chunk.iter().cloned()))
                .all(self.conn())
                .await?;

            for row in rows {
                let record = to_record(row)?;
                found.insert(record.id.clone(), record);
            }
        }

        debug!(requested = ids.len(), found = found.len(), "Document batch lookup");
        Ok(ids.iter().filter_map(|id| found.remove(id)).collect())
    }

    /// Ids in `ids` that exist in the store
    pub async fn existing_ids(&self, ids: &[String]) -> Result<HashSet<String>> {
        let mut existing = HashSet::with_capacity(ids.len());
        for chunk in ids.chunks(self.batch_size) {
            let rows: Vec<String> = DocumentEntity::find()
                .select_only()
                .column(DocumentColumn::Id)
                .filter(DocumentColumn::Id.is_in(chunk.iter().cloned()))
                .into_tuple()
                .all(self.conn())
                .await?;
            existing.extend(rows);
        }
        Ok(existing)
    }

    /// All document ids, sorted
    pub async fn all_ids(&self) -> Result<Vec<String>> {
        DocumentEntity::find()
            .select_only()
            .column(DocumentColumn::Id)
            .order_by_asc(DocumentColumn::Id)
            .into_tuple()
            .all(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Number of stored documents
    pub async fn count(&self) -> Result<u64> {
        DocumentEntity::find()
            .count(self.conn())
            .await
            .map_err(Into::into)
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Insert documents; ids already present are left untouched.
    /// Returns the number of rows written.
    pub async fn insert_documents(&self, documents: Vec<DocumentRecord>) -> Result<u64> {
        if documents.is_empty() {
            return Ok(0);
        }

        let models = documents
            .into_iter()
            .map(to_active_model)
            .collect::<Result<Vec<_>>>()?;

        let written = DocumentEntity::insert_many(models)
            .on_conflict(
                OnConflict::column(DocumentColumn::Id)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(self.conn())
            .await?;

        Ok(written)
    }
}

fn to_record(row: Document) -> Result<DocumentRecord> {
    let tags = row.text_ner.map(serde_json::from_value).transpose()?;
    Ok(DocumentRecord {
        id: row.id,
        url: row.url,
        title: row.title,
        paragraphs: serde_json::from_value(row.text)?,
        paragraphs_with_links: serde_json::from_value(row.text_with_links)?,
        tags,
    })
}

fn to_active_model(record: DocumentRecord) -> Result<DocumentActiveModel> {
    let paragraph_count = i32::try_from(record.paragraphs.len()).map_err(|_| {
        AppError::InvalidFormat {
            message: format!("document '{}' has too many paragraphs", record.id),
        }
    })?;
    let text_ner = record.tags.as_ref().map(serde_json::to_value).transpose()?;

    Ok(DocumentActiveModel {
        id: Set(record.id),
        url: Set(record.url),
        title: Set(record.title),
        text: Set(serde_json::to_value(&record.paragraphs)?),
        text_with_links: Set(serde_json::to_value(&record.paragraphs_with_links)?),
        text_ner: Set(text_ner),
        paragraph_count: Set(paragraph_count),
    })
}

#[async_trait]
impl DocumentStore for DocumentRepository {
    async fn get_batch(&self, ids: &[String]) -> Result<Vec<DocumentRecord>> {
        self.find_batch(ids).await
    }

    async fn contains_batch(&self, ids: &[String]) -> Result<Vec<bool>> {
        let existing = self.existing_ids(ids).await?;
        Ok(ids.iter().map(|id| existing.contains(id)).collect())
    }

    async fn ids(&self) -> Result<Vec<String>> {
        self.all_ids().await
    }

    fn backend(&self) -> &'static str {
        "sqlite"
    }
}
