//! Knowledge-base documents and the document store contract
//!
//! Documents are immutable once loaded. The store is read-only for the whole
//! selection run and supports keyed lookup, existence checks and batch
//! retrieval by id set.

use crate::config::{StoreBackend, StoreConfig};
use crate::errors::{AppError, Result};
use crate::ner::RawTag;
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};
use unicode_normalization::UnicodeNormalization;

/// Canonical form of a document id (titles are stored NFD-normalized)
pub fn normalize_document_id(id: &str) -> String {
    id.nfd().collect()
}

/// A document as stored in the knowledge base
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: String,

    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub title: String,

    /// Plain-text paragraphs
    #[serde(rename = "text")]
    pub paragraphs: Vec<String>,

    /// The same paragraphs with `<a href="...">` link markup
    #[serde(rename = "text_with_links", default)]
    pub paragraphs_with_links: Vec<String>,

    /// NER tags per paragraph, byte offsets into the plain text
    #[serde(rename = "text_ner", default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<Vec<RawTag>>>,
}

impl DocumentRecord {
    /// Normalize the id and check that the per-paragraph arrays line up.
    ///
    /// A record without link markup gets its plain paragraphs as markup.
    pub fn into_normalized(mut self) -> Result<Self> {
        self.id = normalize_document_id(&self.id);
        if self.title.is_empty() {
            self.title = self.id.clone();
        }
        if self.paragraphs_with_links.is_empty() {
            self.paragraphs_with_links = self.paragraphs.clone();
        }
        if self.paragraphs.len() != self.paragraphs_with_links.len() {
            return Err(AppError::InvalidFormat {
                message: format!(
                    "document '{}' has {} paragraphs but {} linked paragraphs",
                    self.id,
                    self.paragraphs.len(),
                    self.paragraphs_with_links.len()
                ),
            });
        }
        if let Some(tags) = &self.tags {
            if tags.len() != self.paragraphs.len() {
                return Err(AppError::InvalidFormat {
                    message: format!(
                        "document '{}' has {} paragraphs but {} tag lists",
                        self.id,
                        self.paragraphs.len(),
                        tags.len()
                    ),
                });
            }
        }
        Ok(self)
    }

    /// Stored tags of one paragraph, if the document was tagged at ingestion
    pub fn paragraph_tags(&self, index: usize) -> Option<&[RawTag]> {
        self.tags.as_ref()?.get(index).map(Vec::as_slice)
    }
}

/// Identity of a paragraph: (document id, within-document index)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParagraphId {
    pub document: String,
    pub index: usize,
}

impl ParagraphId {
    pub fn new(document: impl Into<String>, index: usize) -> Self {
        Self {
            document: document.into(),
            index,
        }
    }
}

impl fmt::Display for ParagraphId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.document, self.index)
    }
}

impl FromStr for ParagraphId {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        let (document, index) = s.rsplit_once('#').ok_or_else(|| AppError::InvalidFormat {
            message: format!("paragraph id '{}' is missing '#<index>'", s),
        })?;
        let index = index.parse().map_err(|_| AppError::InvalidFormat {
            message: format!("paragraph id '{}' has a non-numeric index", s),
        })?;
        Ok(Self::new(document, index))
    }
}

impl Serialize for ParagraphId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ParagraphId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Read-only keyed access to the knowledge base
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch every document in `ids` that exists. Missing ids are omitted;
    /// the result follows the order of `ids`.
    async fn get_batch(&self, ids: &[String]) -> Result<Vec<DocumentRecord>>;

    /// Existence flag per id, in the order of `ids`
    async fn contains_batch(&self, ids: &[String]) -> Result<Vec<bool>>;

    /// Every document id, sorted
    async fn ids(&self) -> Result<Vec<String>>;

    /// Backend name for logs
    fn backend(&self) -> &'static str;

    async fn get(&self, id: &str) -> Result<Option<DocumentRecord>> {
        Ok(self.get_batch(&[id.to_string()]).await?.into_iter().next())
    }

    async fn contains(&self, id: &str) -> Result<bool> {
        Ok(self
            .contains_batch(&[id.to_string()])
            .await?
            .first()
            .copied()
            .unwrap_or(false))
    }
}

/// Store held entirely in memory, loaded from a JSON-lines file
#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: BTreeMap<String, DocumentRecord>,
}

impl MemoryStore {
    /// Build from records, normalizing ids. Invalid records are rejected.
    pub fn from_records<I>(records: I) -> Result<Self>
    where
        I: IntoIterator<Item = DocumentRecord>,
    {
        let mut documents = BTreeMap::new();
        for record in records {
            let record = record.into_normalized()?;
            documents.insert(record.id.clone(), record);
        }
        Ok(Self { documents })
    }

    /// Load one document per line. Blank lines are skipped; lines that fail
    /// to parse or validate are logged and skipped.
    pub fn from_jsonl(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| AppError::Store {
            message: format!("Failed to open {}: {}", path.display(), e),
        })?;

        let mut documents = BTreeMap::new();
        let mut rejected = 0usize;
        for (line_no, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| AppError::Store {
                message: format!("Failed to read {}: {}", path.display(), e),
            })?;
            if line.trim().is_empty() {
                continue;
            }

            let parsed = serde_json::from_str::<DocumentRecord>(&line)
                .map_err(AppError::from)
                .and_then(DocumentRecord::into_normalized);
            match parsed {
                Ok(record) => {
                    documents.insert(record.id.clone(), record);
                }
                Err(e) => {
                    rejected += 1;
                    warn!(line = line_no + 1, error = %e, "Skipping invalid document record");
                }
            }
        }

        info!(
            path = %path.display(),
            documents = documents.len(),
            rejected,
            "Loaded in-memory document store"
        );
        Ok(Self { documents })
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get_batch(&self, ids: &[String]) -> Result<Vec<DocumentRecord>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.documents.get(id).cloned())
            .collect())
    }

    async fn contains_batch(&self, ids: &[String]) -> Result<Vec<bool>> {
        Ok(ids.iter().map(|id| self.documents.contains_key(id)).collect())
    }

    async fn ids(&self) -> Result<Vec<String>> {
        Ok(self.documents.keys().cloned().collect())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

/// Open the configured store read-only. Failure here is fatal.
pub async fn open_store(config: &StoreConfig) -> Result<Arc<dyn DocumentStore>> {
    match config.backend {
        StoreBackend::Jsonl => {
            let path = config.path.clone();
            let store = tokio::task::spawn_blocking(move || MemoryStore::from_jsonl(&path))
                .await
                .map_err(|e| AppError::Internal {
                    message: format!("Store loader panicked: {}", e),
                })??;
            Ok(Arc::new(store))
        }
        StoreBackend::Sqlite => {
            if !config.path.is_file() {
                return Err(AppError::Store {
                    message: format!("SQLite store {} does not exist", config.path.display()),
                });
            }
            let pool = crate::db::DbPool::open(config, true).await?;
            Ok(Arc::new(crate::db::DocumentRepository::new(
                pool,
                config.lookup_batch_size,
            )))
        }
    }
}
