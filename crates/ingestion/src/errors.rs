//! Ingestion error types

use bridgehop_common::errors::AppError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("Document store {path} already exists (set ingestion.overwrite to replace it)")]
    StoreExists { path: String },

    #[error("Dump path not found: {0}")]
    DumpNotFound(String),

    #[error("Failed to read dump {path}: {message}")]
    DumpRead { path: String, message: String },

    #[error("Ingestion worker failed: {0}")]
    Worker(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    App(#[from] AppError),
}
