//! Named-entity tagging
//!
//! The tagger is an external collaborator: a function from text to an
//! ordered sequence of `(start, end, label)` spans. Implementations:
//! - HTTP service (spaCy-style NER model behind a JSON endpoint)
//! - Gazetteer (dictionary of known entity strings)
//! - Null tagger (no model; merging relies on title and context mentions)

pub mod merger;

pub use merger::{EntityTagMerger, MergedTags, ParagraphInput};

use crate::config::{TaggerConfig, TaggerProvider};
use crate::entities::normalize::find_all_word_bounded;
use crate::errors::{AppError, Result};
use crate::upstream::JsonClient;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// A tagger span in byte offsets of the tagged text, before validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTag {
    pub start: usize,
    pub end: usize,
    pub label: String,
}

/// Trait for NER taggers
#[async_trait]
pub trait Tagger: Send + Sync {
    /// Tag a single text
    async fn tag(&self, text: &str) -> Result<Vec<RawTag>>;

    /// Tag several texts; one tag list per input, in input order
    async fn tag_batch(&self, texts: &[String]) -> Result<Vec<Vec<RawTag>>> {
        let mut tagged = Vec::with_capacity(texts.len());
        for text in texts {
            tagged.push(self.tag(text).await?);
        }
        Ok(tagged)
    }

    /// Tagger name for logs and metrics
    fn name(&self) -> &str;
}

/// NER service client
///
/// Wire format: `{"texts": [..]}` -> `{"tags": [[{"start", "end", "label"}]]}`
/// with character offsets, converted here to byte offsets.
pub struct HttpTagger {
    client: JsonClient,
    batch_size: usize,
}

#[derive(Serialize)]
struct TagRequest<'a> {
    texts: &'a [String],
}

#[derive(Deserialize)]
struct TagResponse {
    tags: Vec<Vec<RawTag>>,
}

impl HttpTagger {
    pub fn new(
        endpoint: impl Into<String>,
        timeout: Duration,
        batch_size: usize,
        max_retries: u32,
    ) -> Result<Self> {
        Ok(Self {
            client: JsonClient::new(endpoint, timeout, max_retries)?,
            batch_size: batch_size.max(1),
        })
    }

    async fn request(&self, texts: &[String]) -> Result<Vec<Vec<RawTag>>> {
        let response: TagResponse = self
            .client
            .post(&TagRequest { texts })
            .await
            .map_err(|e| AppError::TaggerUnavailable {
                message: e.to_string(),
            })?;

        if response.tags.len() != texts.len() {
            return Err(AppError::TaggerUnavailable {
                message: format!(
                    "tagger returned {} tag lists for {} texts",
                    response.tags.len(),
                    texts.len()
                ),
            });
        }

        Ok(texts
            .iter()
            .zip(response.tags)
            .map(|(text, tags)| to_byte_offsets(text, tags))
            .collect())
    }
}

#[async_trait]
impl Tagger for HttpTagger {
    async fn tag(&self, text: &str) -> Result<Vec<RawTag>> {
        let tagged = self.request(&[text.to_string()]).await?;
        Ok(tagged.into_iter().next().unwrap_or_default())
    }

    async fn tag_batch(&self, texts: &[String]) -> Result<Vec<Vec<RawTag>>> {
        let mut all = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.batch_size) {
            all.extend(self.request(chunk).await?);
        }
        Ok(all)
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// Convert character offsets to byte offsets. Offsets past the end of the
/// text stay out of bounds so the merger reports them as malformed.
fn to_byte_offsets(text: &str, tags: Vec<RawTag>) -> Vec<RawTag> {
    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_count = boundaries.len() - 1;

    let convert = |offset: usize| match boundaries.get(offset) {
        Some(&byte) => byte,
        None => text.len() + (offset - char_count),
    };

    tags.into_iter()
        .map(|tag| RawTag {
            start: convert(tag.start),
            end: convert(tag.end),
            label: tag.label,
        })
        .collect()
}

/// Dictionary tagger: case-sensitive, word-bounded, longest match first
pub struct GazetteerTagger {
    /// Entries sorted by descending length, then lexicographically
    entries: Vec<(String, String)>,
}

impl GazetteerTagger {
    pub fn new<I, S, L>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, L)>,
        S: Into<String>,
        L: Into<String>,
    {
        let mut entries: Vec<(String, String)> = entries
            .into_iter()
            .map(|(surface, label)| (surface.into(), label.into()))
            .filter(|(surface, _)| !surface.trim().is_empty())
            .collect();
        entries.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then(a.0.cmp(&b.0)));
        entries.dedup_by(|a, b| a.0 == b.0);
        Self { entries }
    }

    /// Load a JSON object mapping entity string -> label
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| AppError::Configuration {
            message: format!("Failed to read gazetteer {}: {}", path.display(), e),
        })?;
        let entries: BTreeMap<String, String> =
            serde_json::from_str(&raw).map_err(|e| AppError::Configuration {
                message: format!("Invalid gazetteer {}: {}", path.display(), e),
            })?;

        let tagger = Self::new(entries);
        info!(path = %path.display(), entries = tagger.entries.len(), "Gazetteer loaded");
        Ok(tagger)
    }

    fn scan(&self, text: &str) -> Vec<RawTag> {
        let mut taken: Vec<(usize, usize)> = Vec::new();
        let mut tags = Vec::new();
        for (surface, label) in &self.entries {
            for (start, end) in find_all_word_bounded(text, surface, false) {
                if taken.iter().any(|&(s, e)| start < e && s < end) {
                    continue;
                }
                taken.push((start, end));
                tags.push(RawTag {
                    start,
                    end,
                    label: label.clone(),
                });
            }
        }
        tags.sort_by_key(|t| (t.start, t.end));
        tags
    }
}

#[async_trait]
impl Tagger for GazetteerTagger {
    async fn tag(&self, text: &str) -> Result<Vec<RawTag>> {
        Ok(self.scan(text))
    }

    fn name(&self) -> &str {
        "gazetteer"
    }
}

/// Tagger that finds nothing
pub struct NullTagger;

#[async_trait]
impl Tagger for NullTagger {
    async fn tag(&self, _text: &str) -> Result<Vec<RawTag>> {
        Ok(Vec::new())
    }

    async fn tag_batch(&self, texts: &[String]) -> Result<Vec<Vec<RawTag>>> {
        Ok(vec![Vec::new(); texts.len()])
    }

    fn name(&self) -> &str {
        "none"
    }
}

/// Create a tagger based on configuration
pub fn create_tagger(config: &TaggerConfig) -> Result<Arc<dyn Tagger>> {
    match config.provider {
        TaggerProvider::Http => {
            let endpoint = config.endpoint.clone().ok_or_else(|| AppError::Configuration {
                message: "tagger.endpoint is required for the http tagger".to_string(),
            })?;
            Ok(Arc::new(HttpTagger::new(
                endpoint,
                config.timeout(),
                config.batch_size,
                config.max_retries,
            )?))
        }
        TaggerProvider::Gazetteer => {
            let path = config
                .gazetteer_path
                .as_ref()
                .ok_or_else(|| AppError::Configuration {
                    message: "tagger.gazetteer_path is required for the gazetteer tagger"
                        .to_string(),
                })?;
            Ok(Arc::new(GazetteerTagger::load(path)?))
        }
        TaggerProvider::None => Ok(Arc::new(NullTagger)),
    }
}
