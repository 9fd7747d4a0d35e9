//! Relevance scoring
//!
//! The relevance model is external: a batched function from
//! `(question, paragraph)` pairs to scalar scores. Implementations:
//! - HTTP service (single-paragraph neural relevance model)
//! - Lexical (count of question entities occurring in the paragraph)
//! - Mock (fixed scores, for tests and dry runs)
//!
//! [`ScorerAdapter`] wraps any of them with capping, batching, timeouts and
//! the lexical fallback.

mod adapter;

pub use adapter::{RelevanceScore, ScoreSheet, ScorerAdapter, ScoringCandidate, ScoringSession};

use crate::config::{ScorerConfig, ScorerProvider};
use crate::entities::normalize::{find_all_word_bounded, surface_key};
use crate::entities::EntityMention;
use crate::errors::{AppError, Result};
use crate::upstream::JsonClient;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

/// Which scorer produced a score sheet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreSource {
    Model,
    Lexical,
}

/// The question side of a scoring request
#[derive(Debug, Clone, Default)]
pub struct ScoringQuery {
    pub text: String,
    /// Matching variants per distinct question entity: the canonical key
    /// plus every pre-alias surface key that resolved to it
    pub entity_terms: Vec<Vec<String>>,
}

impl ScoringQuery {
    pub fn new(text: impl Into<String>, mentions: &[EntityMention]) -> Self {
        let mut grouped: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for mention in mentions {
            let variants = grouped.entry(mention.key.as_str()).or_default();
            variants.insert(mention.key.as_str());
            variants.insert(mention.surface_key.as_str());
        }

        Self {
            text: text.into(),
            entity_terms: grouped
                .into_values()
                .map(|v| v.into_iter().map(str::to_string).collect())
                .collect(),
        }
    }
}

/// Trait for relevance scorers
#[async_trait]
pub trait Scorer: Send + Sync {
    /// Score every paragraph against the question; one score per paragraph,
    /// in input order
    async fn score_batch(&self, query: &ScoringQuery, paragraphs: &[&str]) -> Result<Vec<f32>>;

    /// Scorer name for logs and metrics
    fn name(&self) -> &str;

    fn source(&self) -> ScoreSource {
        ScoreSource::Model
    }
}

/// Neural relevance model behind a JSON endpoint
///
/// Wire format: `{"question", "paragraphs": [..]}` -> `{"scores": [..]}`
pub struct HttpScorer {
    client: JsonClient,
}

#[derive(Serialize)]
struct ScoreRequest<'a> {
    question: &'a str,
    paragraphs: &'a [&'a str],
}

#[derive(Deserialize)]
struct ScoreResponse {
    scores: Vec<f32>,
}

impl HttpScorer {
    pub fn new(endpoint: impl Into<String>, timeout: Duration, max_retries: u32) -> Result<Self> {
        Ok(Self {
            client: JsonClient::new(endpoint, timeout, max_retries)?,
        })
    }
}

#[async_trait]
impl Scorer for HttpScorer {
    async fn score_batch(&self, query: &ScoringQuery, paragraphs: &[&str]) -> Result<Vec<f32>> {
        let response: ScoreResponse = self
            .client
            .post(&ScoreRequest {
                question: &query.text,
                paragraphs,
            })
            .await
            .map_err(|e| AppError::ScorerUnavailable {
                message: format!("{}: {}", self.client.endpoint(), e),
            })?;
        Ok(response.scores)
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// Entity-mention count scorer
///
/// A paragraph scores the number of distinct question entities that occur
/// in it at word boundaries, after the same normalization as the mentions.
#[derive(Debug, Clone, Copy)]
pub struct LexicalScorer {
    case_fold: bool,
}

impl LexicalScorer {
    pub fn new(case_fold: bool) -> Self {
        Self { case_fold }
    }

    pub fn score_text(&self, query: &ScoringQuery, paragraph: &str) -> f32 {
        let normalized = surface_key(paragraph, self.case_fold);
        query
            .entity_terms
            .iter()
            .filter(|variants| {
                variants
                    .iter()
                    .any(|term| !find_all_word_bounded(&normalized, term, false).is_empty())
            })
            .count() as f32
    }
}

#[async_trait]
impl Scorer for LexicalScorer {
    async fn score_batch(&self, query: &ScoringQuery, paragraphs: &[&str]) -> Result<Vec<f32>> {
        Ok(paragraphs.iter().map(|p| self.score_text(query, p)).collect())
    }

    fn name(&self) -> &str {
        "lexical"
    }

    fn source(&self) -> ScoreSource {
        ScoreSource::Lexical
    }
}

/// Scorer returning fixed scores per paragraph text
#[derive(Debug, Clone, Default)]
pub struct MockScorer {
    scores: HashMap<String, f32>,
    default: f32,
}

impl MockScorer {
    pub fn new(default: f32) -> Self {
        Self {
            scores: HashMap::new(),
            default,
        }
    }

    pub fn with_score(mut self, paragraph: impl Into<String>, score: f32) -> Self {
        self.scores.insert(paragraph.into(), score);
        self
    }
}

#[async_trait]
impl Scorer for MockScorer {
    async fn score_batch(&self, _query: &ScoringQuery, paragraphs: &[&str]) -> Result<Vec<f32>> {
        Ok(paragraphs
            .iter()
            .map(|p| self.scores.get(*p).copied().unwrap_or(self.default))
            .collect())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Create a scorer based on configuration
pub fn create_scorer(config: &ScorerConfig, case_fold: bool) -> Result<Arc<dyn Scorer>> {
    match config.provider {
        ScorerProvider::Http => {
            let endpoint = config.endpoint.clone().ok_or_else(|| AppError::Configuration {
                message: "scorer.endpoint is required for the http scorer".to_string(),
            })?;
            Ok(Arc::new(HttpScorer::new(
                endpoint,
                config.timeout(),
                config.max_retries,
            )?))
        }
        ScorerProvider::Lexical => Ok(Arc::new(LexicalScorer::new(case_fold))),
        ScorerProvider::Mock => Ok(Arc::new(MockScorer::new(0.0))),
    }
}
