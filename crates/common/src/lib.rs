//! BridgeHop Common Library
//!
//! Shared code for the BridgeHop services including:
//! - Document model, store contract and the SQLite repository
//! - Link extraction from paragraph markup
//! - NER tagger abstraction and entity-tag merging
//! - Relevance scorer abstraction with lexical fallback
//! - Error types and handling
//! - Configuration management
//! - Metrics and observability

pub mod config;
pub mod corpus;
pub mod db;
pub mod entities;
pub mod errors;
pub mod extract;
pub mod metrics;
pub mod ner;
pub mod question;
pub mod scoring;
pub mod upstream;

// Re-export commonly used types
pub use config::AppConfig;
pub use corpus::{DocumentRecord, DocumentStore, ParagraphId};
pub use errors::{AppError, ErrorCode, Issue, Result};
pub use ner::Tagger;
pub use question::Question;
pub use scoring::Scorer;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
