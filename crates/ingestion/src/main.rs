//! BridgeHop Ingestion
//!
//! Builds the knowledge-base document store:
//! 1. Walks the JSON-lines dump directory
//! 2. Validates and normalizes document records
//! 3. Tags paragraphs with the configured NER tagger
//! 4. Writes the SQLite document store

mod errors;
mod processor;
mod reader;

use bridgehop_common::config::{AppConfig, ObservabilityConfig, TaggerProvider};
use bridgehop_common::ner::create_tagger;
use bridgehop_common::{metrics, VERSION};
use processor::IngestionProcessor;
use std::time::Instant;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        e
    })?;

    init_tracing(&config.observability);
    info!("Starting BridgeHop Ingestion v{}", VERSION);
    metrics::register_metrics();

    let tagger = match config.tagger.provider {
        TaggerProvider::None => {
            info!("No tagger configured, documents are stored untagged");
            None
        }
        _ => Some(create_tagger(&config.tagger)?),
    };

    let started = Instant::now();
    let repository =
        IngestionProcessor::prepare_store(&config.store, config.ingestion.overwrite)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to prepare document store");
                e
            })?;

    let processor = IngestionProcessor::new(
        repository,
        tagger,
        config.tagger.batch_size,
        config.ingestion.insert_batch_size,
        config.runtime.workers,
    );
    let summary = processor.ingest(&config.ingestion.data_path).await?;

    info!(
        store = %config.store.path.display(),
        documents = summary.ingested,
        elapsed_secs = started.elapsed().as_secs_f64(),
        "Document store ready"
    );
    Ok(())
}

fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if config.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}
