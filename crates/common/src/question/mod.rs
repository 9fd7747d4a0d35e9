//! Questions and their candidate document sets

use crate::corpus::normalize_document_id;
use crate::errors::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

/// One selection input: the question text plus the ordered ids of the
/// documents it may draw evidence from. An empty candidate list means open
/// retrieval over the whole store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub text: String,
    pub candidate_documents: Vec<String>,
}

impl Question {
    pub fn new<I, S>(id: impl Into<String>, text: impl Into<String>, candidates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let candidate_documents = candidates
            .into_iter()
            .map(|c| normalize_document_id(c.as_ref()))
            .filter(|c| seen.insert(c.clone()))
            .collect();

        Self {
            id: id.into(),
            text: text.into(),
            candidate_documents,
        }
    }

    pub fn is_open_retrieval(&self) -> bool {
        self.candidate_documents.is_empty()
    }
}

/// HotpotQA-style record: `context` is a list of `[title, sentences]` pairs
#[derive(Debug, Deserialize)]
struct RawQuestion {
    #[serde(rename = "_id", alias = "id")]
    id: String,
    question: String,
    #[serde(default)]
    context: Vec<(String, serde_json::Value)>,
    #[serde(default)]
    titles: Vec<String>,
}

impl From<RawQuestion> for Question {
    fn from(raw: RawQuestion) -> Self {
        let titles = raw
            .context
            .into_iter()
            .map(|(title, _)| title)
            .chain(raw.titles);
        Question::new(raw.id, raw.question, titles)
    }
}

/// Parse a JSON array of questions
pub fn parse_questions(json: &str) -> Result<Vec<Question>> {
    let raw: Vec<RawQuestion> = serde_json::from_str(json).map_err(|e| AppError::InvalidFormat {
        message: format!("Invalid question file: {}", e),
    })?;
    Ok(raw.into_iter().map(Question::from).collect())
}

/// Load the question file. An unreadable or invalid file is fatal.
pub fn load_questions(path: &Path) -> Result<Vec<Question>> {
    let json = std::fs::read_to_string(path).map_err(|e| AppError::Configuration {
        message: format!("Failed to read questions {}: {}", path.display(), e),
    })?;
    let questions = parse_questions(&json).map_err(|e| AppError::Configuration {
        message: format!("{} ({})", e, path.display()),
    })?;

    info!(path = %path.display(), questions = questions.len(), "Questions loaded");
    Ok(questions)
}
