//! Database layer for the document store
//!
//! Provides:
//! - SeaORM entity model for stored documents
//! - Repository implementing the document store contract
//! - Connection pool management for the SQLite file

pub mod models;
mod repository;

pub use repository::DocumentRepository;

use crate::config::StoreConfig;
use crate::errors::{AppError, Result};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::time::Duration;
use tracing::info;

/// Database connection pool wrapper
#[derive(Clone)]
pub struct DbPool {
    conn: DatabaseConnection,
    read_only: bool,
}

impl DbPool {
    /// Connect to the SQLite file named by the store configuration.
    ///
    /// A read-only pool never creates the file; a writable pool creates it
    /// when absent.
    pub async fn open(config: &StoreConfig, read_only: bool) -> Result<Self> {
        let mode = if read_only { "ro" } else { "rwc" };
        let url = format!("sqlite://{}?mode={}", config.path.display(), mode);
        info!(path = %config.path.display(), read_only, "Connecting to document store...");

        let mut opts = ConnectOptions::new(url);
        opts.max_connections(config.max_connections)
            .min_connections(1)
            .connect_timeout(Duration::from_secs(10))
            .sqlx_logging(false);

        let conn = Database::connect(opts).await.map_err(|e| AppError::Store {
            message: format!("Failed to open {}: {}", config.path.display(), e),
        })?;

        info!("Document store connection established");
        Ok(Self { conn, read_only })
    }

    /// Connection for both reads and writes
    pub fn conn(&self) -> &DatabaseConnection {
        &self.conn
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }
}
