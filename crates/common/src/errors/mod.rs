//! Error types for BridgeHop
//!
//! Provides an error handling system with:
//! - Distinct error types for each failure mode of the selection pipeline
//! - Machine-readable error codes grouped by component
//! - A fatal/recoverable split: only configuration and store failures stop a run
//! - `Issue` records for conditions that are logged and carried in the output

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Configuration (1xxx)
    ConfigurationError,
    ValidationError,

    // Corpus (2xxx)
    MissingDocument,
    InvalidFormat,
    StoreError,

    // Tagging (3xxx)
    MalformedMention,
    TaggerUnavailable,

    // Scoring (4xxx)
    ScorerUnavailable,
    ScorerTimeout,

    // Selection (5xxx)
    NoCandidates,

    // Internal (9xxx)
    UpstreamError,
    SerializationError,
    InternalError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            ErrorCode::ConfigurationError => 1001,
            ErrorCode::ValidationError => 1002,

            ErrorCode::MissingDocument => 2001,
            ErrorCode::InvalidFormat => 2002,
            ErrorCode::StoreError => 2003,

            ErrorCode::MalformedMention => 3001,
            ErrorCode::TaggerUnavailable => 3002,

            ErrorCode::ScorerUnavailable => 4001,
            ErrorCode::ScorerTimeout => 4002,

            ErrorCode::NoCandidates => 5001,

            ErrorCode::UpstreamError => 9001,
            ErrorCode::SerializationError => 9002,
            ErrorCode::InternalError => 9999,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Validation failed: {message}")]
    Validation { message: String, field: Option<String> },

    // Corpus errors
    #[error("Document not found in store: {id}")]
    MissingDocument { id: String },

    #[error("Invalid format: {message}")]
    InvalidFormat { message: String },

    #[error("Document store error: {message}")]
    Store { message: String },

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    // Tagging errors
    #[error("Malformed mention in {subject}: span {start}..{end} ({reason})")]
    MalformedMention {
        subject: String,
        start: usize,
        end: usize,
        reason: String,
    },

    #[error("NER tagger unavailable: {message}")]
    TaggerUnavailable { message: String },

    // Scoring errors
    #[error("Relevance scorer unavailable: {message}")]
    ScorerUnavailable { message: String },

    #[error("Relevance scorer timed out after {timeout_ms}ms")]
    ScorerTimeout { timeout_ms: u64 },

    // Selection
    #[error("No hop-1 candidates for question {question_id}")]
    NoCandidates { question_id: String },

    // External / internal
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::MissingDocument { .. } => ErrorCode::MissingDocument,
            AppError::InvalidFormat { .. } => ErrorCode::InvalidFormat,
            AppError::Store { .. } => ErrorCode::StoreError,
            AppError::Database(_) => ErrorCode::StoreError,
            AppError::MalformedMention { .. } => ErrorCode::MalformedMention,
            AppError::TaggerUnavailable { .. } => ErrorCode::TaggerUnavailable,
            AppError::ScorerUnavailable { .. } => ErrorCode::ScorerUnavailable,
            AppError::ScorerTimeout { .. } => ErrorCode::ScorerTimeout,
            AppError::NoCandidates { .. } => ErrorCode::NoCandidates,
            AppError::HttpClient(_) => ErrorCode::UpstreamError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Errors that stop a run at startup. Everything else is isolated to the
    /// document, mention or question it concerns.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AppError::Configuration { .. }
                | AppError::Validation { .. }
                | AppError::Store { .. }
                | AppError::Database(_)
        )
    }

    /// Convert into a recorded issue
    pub fn to_issue(&self) -> Issue {
        Issue {
            code: self.code(),
            message: self.to_string(),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration {
            message: err.to_string(),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation {
            message: err.to_string(),
            field: err.field_errors().keys().next().map(|k| k.to_string()),
        }
    }
}

/// A non-fatal condition recorded during a run and carried in the output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub code: ErrorCode,
    pub message: String,
}

impl From<AppError> for Issue {
    fn from(err: AppError) -> Self {
        err.to_issue()
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.as_code(), self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        let err = AppError::MissingDocument { id: "Barack Obama".into() };
        assert_eq!(err.code(), ErrorCode::MissingDocument);
        assert_eq!(err.code().as_code(), 2001);
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_configuration_is_fatal() {
        let err = AppError::Configuration {
            message: "negative weight".into(),
        };
        assert!(err.is_fatal());
        assert!(!AppError::ScorerTimeout { timeout_ms: 50 }.is_fatal());
    }

    #[test]
    fn test_issue_serialization() {
        let issue = AppError::MalformedMention {
            subject: "question".into(),
            start: 5,
            end: 3,
            reason: "start >= end".into(),
        }
        .to_issue();

        let json = serde_json::to_string(&issue).unwrap();
        assert!(json.contains("\"MALFORMED_MENTION\""));
        assert!(issue.to_string().starts_with("[3001]"));
    }
}
