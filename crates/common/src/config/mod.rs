//! Configuration management for BridgeHop
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default, config/{APP_ENV}, config/local)
//! - Default values
//!
//! Loaded configuration is validated before use; a config that fails
//! validation is a fatal startup error.

use crate::errors::{AppError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use validator::Validate;

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
pub struct AppConfig {
    /// Document store configuration
    #[serde(default)]
    #[validate(nested)]
    pub store: StoreConfig,

    /// Question input / selection output paths
    #[serde(default)]
    pub input: InputConfig,

    /// Entity normalization configuration
    #[serde(default)]
    #[validate(nested)]
    pub entities: EntityConfig,

    /// Candidate and output breadth
    #[serde(default)]
    #[validate(nested)]
    pub selection: SelectionConfig,

    /// Score fusion weights
    #[serde(default)]
    #[validate(nested)]
    pub fusion: FusionConfig,

    /// Relevance scorer configuration
    #[serde(default)]
    #[validate(nested)]
    pub scorer: ScorerConfig,

    /// NER tagger configuration
    #[serde(default)]
    #[validate(nested)]
    pub tagger: TaggerConfig,

    /// Worker / concurrency configuration
    #[serde(default)]
    #[validate(nested)]
    pub runtime: RuntimeConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Corpus ingestion configuration
    #[serde(default)]
    pub ingestion: IngestionConfig,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// SQLite database written by the ingestion service
    Sqlite,
    /// JSON-lines file loaded fully into memory
    Jsonl,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct StoreConfig {
    #[serde(default = "default_store_backend")]
    pub backend: StoreBackend,

    /// Path to the SQLite database or JSON-lines file
    #[serde(default = "default_store_path")]
    pub path: PathBuf,

    /// Maximum pooled connections (SQLite backend)
    #[serde(default = "default_store_connections")]
    #[validate(range(min = 1))]
    pub max_connections: u32,

    /// Ids per batched lookup
    #[serde(default = "default_store_batch")]
    #[validate(range(min = 1))]
    pub lookup_batch_size: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InputConfig {
    /// Question file (JSON array)
    #[serde(default = "default_questions_path")]
    pub questions_path: PathBuf,

    /// Selection output file (JSON array)
    #[serde(default = "default_output_path")]
    pub output_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct EntityConfig {
    /// Lower-case mentions for matching
    #[serde(default = "default_true")]
    pub case_fold: bool,

    /// JSON object mapping alias -> canonical entity string
    #[serde(default)]
    pub alias_table_path: Option<PathBuf>,

    /// Mentions whose normalized form is shorter than this are discarded
    #[serde(default = "default_min_mention_chars")]
    #[validate(range(min = 1))]
    pub min_mention_chars: usize,

    /// NER labels kept for matching (empty keeps everything)
    #[serde(default = "default_allowed_types")]
    pub allowed_types: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct SelectionConfig {
    /// Candidate cap N: paragraphs per scorer pass
    #[serde(default = "default_candidate_cap")]
    #[validate(range(min = 1))]
    pub candidate_cap: usize,

    /// Hop-1 breadth M: top paragraphs by relevance added to the hop-1 set
    #[serde(default = "default_hop1_breadth")]
    #[validate(range(min = 1))]
    pub hop1_breadth: usize,

    /// Hop-2 breadth H: hop-1 candidates expanded through links
    #[serde(default = "default_hop2_breadth")]
    pub hop2_breadth: usize,

    /// Output size K: chains emitted per question
    #[serde(default = "default_output_size")]
    #[validate(range(min = 1))]
    pub output_size: usize,

    /// Paragraphs of a link target document considered as hop-2 candidates
    #[serde(default = "default_hop2_paragraphs")]
    #[validate(range(min = 1))]
    pub hop2_paragraphs_per_target: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct FusionConfig {
    /// Weight of the min-max normalized relevance score
    #[serde(default = "default_relevance_weight")]
    #[validate(range(min = 0.0))]
    pub relevance_weight: f32,

    /// Weight of the question entity overlap fraction
    #[serde(default = "default_entity_weight")]
    #[validate(range(min = 0.0))]
    pub entity_weight: f32,

    /// Weight of the hop-2 paragraph's normalized relevance
    #[serde(default = "default_hop2_weight")]
    #[validate(range(min = 0.0))]
    pub hop2_weight: f32,

    /// Bonus for a bridge whose anchor matches the entity surface exactly
    #[serde(default = "default_bridge_exact_bonus")]
    #[validate(range(min = 0.0))]
    pub bridge_exact_bonus: f32,

    /// Bonus for a bridge matched through the alias table
    #[serde(default = "default_bridge_alias_bonus")]
    #[validate(range(min = 0.0))]
    pub bridge_alias_bonus: f32,

    /// Multiplier for bridges whose entity appears only in the hop-1 paragraph
    #[serde(default = "default_paragraph_bridge_factor")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub paragraph_bridge_factor: f32,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ScorerProvider {
    /// Remote neural relevance model
    Http,
    /// Entity-mention count only
    Lexical,
    /// Constant scores, for dry runs
    Mock,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct ScorerConfig {
    #[serde(default = "default_scorer_provider")]
    pub provider: ScorerProvider,

    /// Scoring endpoint URL (http provider)
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Per-batch timeout in milliseconds
    #[serde(default = "default_scorer_timeout")]
    #[validate(range(min = 1))]
    pub timeout_ms: u64,

    /// Paragraphs per scorer request
    #[serde(default = "default_scorer_batch")]
    #[validate(range(min = 1))]
    pub batch_size: usize,

    /// Retries for transient HTTP failures
    #[serde(default = "default_retries")]
    pub max_retries: u32,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TaggerProvider {
    /// Remote NER service
    Http,
    /// Dictionary of known entity strings
    Gazetteer,
    /// No tagger: only title and context mentions are produced
    None,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct TaggerConfig {
    #[serde(default = "default_tagger_provider")]
    pub provider: TaggerProvider,

    /// Tagging endpoint URL (http provider)
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Gazetteer file (gazetteer provider)
    #[serde(default)]
    pub gazetteer_path: Option<PathBuf>,

    /// Request timeout in milliseconds
    #[serde(default = "default_tagger_timeout")]
    #[validate(range(min = 1))]
    pub timeout_ms: u64,

    /// Texts per tagger request
    #[serde(default = "default_tagger_batch")]
    #[validate(range(min = 1))]
    pub batch_size: usize,

    /// Retries for transient HTTP failures
    #[serde(default = "default_retries")]
    pub max_retries: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct RuntimeConfig {
    /// Partitions for extraction and ingestion
    #[serde(default = "default_workers")]
    #[validate(range(min = 1))]
    pub workers: usize,

    /// Questions processed concurrently
    #[serde(default = "default_max_concurrent")]
    #[validate(range(min = 1))]
    pub max_concurrent_questions: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error) or a full EnvFilter directive
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_true")]
    pub json_logging: bool,

    /// Prometheus exporter port (0 to disable)
    #[serde(default)]
    pub metrics_port: u16,

    /// Service name for logs
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IngestionConfig {
    /// File or directory of JSON-lines dumps
    #[serde(default = "default_data_path")]
    pub data_path: PathBuf,

    /// Replace an existing store instead of refusing
    #[serde(default)]
    pub overwrite: bool,

    /// Documents per insert batch
    #[serde(default = "default_insert_batch")]
    pub insert_batch_size: usize,
}

// Default value functions
fn default_true() -> bool { true }
fn default_store_backend() -> StoreBackend { StoreBackend::Sqlite }
fn default_store_path() -> PathBuf { PathBuf::from("data/corpus.db") }
fn default_store_connections() -> u32 { 4 }
fn default_store_batch() -> usize { 500 }
fn default_questions_path() -> PathBuf { PathBuf::from("data/questions.json") }
fn default_output_path() -> PathBuf { PathBuf::from("data/selection.json") }
fn default_min_mention_chars() -> usize { 2 }
fn default_allowed_types() -> Vec<String> {
    [
        "PERSON", "NORP", "FAC", "ORG", "GPE", "LOC", "PRODUCT", "EVENT", "WORK_OF_ART", "LAW",
        "LANGUAGE",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
fn default_candidate_cap() -> usize { 300 }
fn default_hop1_breadth() -> usize { 10 }
fn default_hop2_breadth() -> usize { 5 }
fn default_output_size() -> usize { 10 }
fn default_hop2_paragraphs() -> usize { 1 }
fn default_relevance_weight() -> f32 { 1.0 }
fn default_entity_weight() -> f32 { 0.5 }
fn default_hop2_weight() -> f32 { 1.0 }
fn default_bridge_exact_bonus() -> f32 { 0.3 }
fn default_bridge_alias_bonus() -> f32 { 0.15 }
fn default_paragraph_bridge_factor() -> f32 { 0.5 }
fn default_scorer_provider() -> ScorerProvider { ScorerProvider::Lexical }
fn default_scorer_timeout() -> u64 { 5_000 }
fn default_scorer_batch() -> usize { 64 }
fn default_retries() -> u32 { 2 }
fn default_tagger_provider() -> TaggerProvider { TaggerProvider::None }
fn default_tagger_timeout() -> u64 { 10_000 }
fn default_tagger_batch() -> usize { 256 }
fn default_workers() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}
fn default_max_concurrent() -> usize { 16 }
fn default_log_level() -> String { "info".to_string() }
fn default_service_name() -> String { "bridgehop".to_string() }
fn default_data_path() -> PathBuf { PathBuf::from("data/wiki") }
fn default_insert_batch() -> usize { 1_000 }

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            path: default_store_path(),
            max_connections: default_store_connections(),
            lookup_batch_size: default_store_batch(),
        }
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            questions_path: default_questions_path(),
            output_path: default_output_path(),
        }
    }
}

impl Default for EntityConfig {
    fn default() -> Self {
        Self {
            case_fold: true,
            alias_table_path: None,
            min_mention_chars: default_min_mention_chars(),
            allowed_types: default_allowed_types(),
        }
    }
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            candidate_cap: default_candidate_cap(),
            hop1_breadth: default_hop1_breadth(),
            hop2_breadth: default_hop2_breadth(),
            output_size: default_output_size(),
            hop2_paragraphs_per_target: default_hop2_paragraphs(),
        }
    }
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            relevance_weight: default_relevance_weight(),
            entity_weight: default_entity_weight(),
            hop2_weight: default_hop2_weight(),
            bridge_exact_bonus: default_bridge_exact_bonus(),
            bridge_alias_bonus: default_bridge_alias_bonus(),
            paragraph_bridge_factor: default_paragraph_bridge_factor(),
        }
    }
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            provider: default_scorer_provider(),
            endpoint: None,
            timeout_ms: default_scorer_timeout(),
            batch_size: default_scorer_batch(),
            max_retries: default_retries(),
        }
    }
}

impl Default for TaggerConfig {
    fn default() -> Self {
        Self {
            provider: default_tagger_provider(),
            endpoint: None,
            gazetteer_path: None,
            timeout_ms: default_tagger_timeout(),
            batch_size: default_tagger_batch(),
            max_retries: default_retries(),
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            max_concurrent_questions: default_max_concurrent(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: true,
            metrics_port: 0,
            service_name: default_service_name(),
        }
    }
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            data_path: default_data_path(),
            overwrite: false,
            insert_batch_size: default_insert_batch(),
        }
    }
}

impl FusionConfig {
    fn weights(&self) -> [(&'static str, f32); 6] {
        [
            ("relevance_weight", self.relevance_weight),
            ("entity_weight", self.entity_weight),
            ("hop2_weight", self.hop2_weight),
            ("bridge_exact_bonus", self.bridge_exact_bonus),
            ("bridge_alias_bonus", self.bridge_alias_bonus),
            ("paragraph_bridge_factor", self.paragraph_bridge_factor),
        ]
    }
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables with APP__ prefix
            // e.g., APP__SELECTION__OUTPUT_SIZE=20
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate_all()?;
        Ok(config)
    }

    /// Load from a specific config file
    pub fn from_file(path: &str) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate_all()?;
        Ok(config)
    }

    /// Field-level validation plus checks that span sections
    pub fn validate_all(&self) -> Result<()> {
        self.validate()?;

        for (name, value) in self.fusion.weights() {
            if !value.is_finite() {
                return Err(AppError::Validation {
                    message: format!("fusion.{} must be finite, got {}", name, value),
                    field: Some(name.to_string()),
                });
            }
        }

        if self.selection.hop2_breadth > self.selection.candidate_cap {
            return Err(AppError::Validation {
                message: format!(
                    "selection.hop2_breadth ({}) exceeds selection.candidate_cap ({})",
                    self.selection.hop2_breadth, self.selection.candidate_cap
                ),
                field: Some("hop2_breadth".to_string()),
            });
        }

        if self.scorer.provider == ScorerProvider::Http && self.scorer.endpoint.is_none() {
            return Err(AppError::Configuration {
                message: "scorer.endpoint is required for the http scorer".to_string(),
            });
        }

        match self.tagger.provider {
            TaggerProvider::Http if self.tagger.endpoint.is_none() => {
                return Err(AppError::Configuration {
                    message: "tagger.endpoint is required for the http tagger".to_string(),
                });
            }
            TaggerProvider::Gazetteer if self.tagger.gazetteer_path.is_none() => {
                return Err(AppError::Configuration {
                    message: "tagger.gazetteer_path is required for the gazetteer tagger"
                        .to_string(),
                });
            }
            _ => {}
        }

        Ok(())
    }
}

impl ScorerConfig {
    /// Scorer batch timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl TaggerConfig {
    /// Tagger request timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.selection.output_size, 10);
        assert_eq!(config.entities.min_mention_chars, 2);
        assert_eq!(config.entities.allowed_types.len(), 11);
        assert!(config.validate_all().is_ok());
    }

    #[test]
    fn test_negative_weight_rejected() {
        let mut config = AppConfig::default();
        config.fusion.entity_weight = -0.5;
        let err = config.validate_all().unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_nan_weight_rejected() {
        let mut config = AppConfig::default();
        config.fusion.hop2_weight = f32::NAN;
        assert!(config.validate_all().is_err());
    }

    #[test]
    fn test_hop2_breadth_bounded_by_cap() {
        let mut config = AppConfig::default();
        config.selection.candidate_cap = 4;
        config.selection.hop2_breadth = 5;
        assert!(config.validate_all().is_err());
    }

    #[test]
    fn test_http_scorer_requires_endpoint() {
        let mut config = AppConfig::default();
        config.scorer.provider = ScorerProvider::Http;
        assert!(config.validate_all().is_err());

        config.scorer.endpoint = Some("http://localhost:8501/score".to_string());
        assert!(config.validate_all().is_ok());
    }

    #[test]
    fn test_from_file_partial_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridgehop.toml");
        std::fs::write(
            &path,
            "[selection]\noutput_size = 4\n\n[fusion]\nentity_weight = 0.25\n",
        )
        .unwrap();

        let config = AppConfig::from_file(path.to_str().unwrap()).unwrap();
        assert_eq!(config.selection.output_size, 4);
        assert_eq!(config.selection.hop1_breadth, 10);
        assert_eq!(config.fusion.entity_weight, 0.25);
        assert_eq!(config.store.backend, StoreBackend::Sqlite);
    }
}
