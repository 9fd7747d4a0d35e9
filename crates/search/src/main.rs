//! BridgeHop Search
//!
//! Batch selection of multi-hop evidence:
//! - Loads questions and the documents they reference from the store
//! - Extracts paragraph links and builds the link graph arena
//! - Merges entity tags and scores candidate paragraphs
//! - Ranks 1-hop and 2-hop paragraph chains per question
//! - Writes one output record per question

mod graph;
mod output;
mod pipeline;
mod selection;

use anyhow::Context;
use bridgehop_common::config::{AppConfig, ObservabilityConfig};
use bridgehop_common::corpus::open_store;
use bridgehop_common::entities::Normalizer;
use bridgehop_common::extract::LinkExtractor;
use bridgehop_common::ner::{create_tagger, EntityTagMerger};
use bridgehop_common::question::load_questions;
use bridgehop_common::scoring::{create_scorer, ScorerAdapter};
use bridgehop_common::{metrics, VERSION};
use graph::LinkGraph;
use metrics_exporter_prometheus::PrometheusBuilder;
use pipeline::SelectionPipeline;
use selection::{MultiHopSelector, SelectionStatus};
use std::net::SocketAddr;
use std::sync::Arc;
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
    let config = Arc::new(config);

    init_tracing(&config.observability);
    info!("Starting BridgeHop Search v{}", VERSION);

    init_metrics(&config.observability)?;

    let started = Instant::now();
    let result = run(config).await;
    if let Err(e) = &result {
        error!(error = %e, "Selection run failed");
    }
    info!(elapsed_secs = started.elapsed().as_secs_f64(), "Search run finished");
    result
}

async fn run(config: Arc<AppConfig>) -> anyhow::Result<()> {
    // Static inputs: normalization, store, questions
    let normalizer = Arc::new(Normalizer::from_config(&config.entities)?);
    let store = open_store(&config.store).await?;
    let questions = load_questions(&config.input.questions_path)?;
    info!(questions = questions.len(), backend = store.backend(), "Inputs loaded");

    // Referenced documents plus one level of link targets
    let extractor = LinkExtractor::new(config.runtime.workers);
    let mut extraction = extractor.extract(Arc::clone(&store), &questions).await?;
    extractor
        .expand_targets(Arc::clone(&store), &mut extraction)
        .await?;

    let graph = Arc::new(LinkGraph::build(&extraction, &normalizer)?);

    // Collaborators
    let tagger = create_tagger(&config.tagger)?;
    let scorer = create_scorer(&config.scorer, config.entities.case_fold)?;
    let adapter = Arc::new(ScorerAdapter::new(
        scorer,
        &config.scorer,
        config.selection.candidate_cap,
        config.entities.case_fold,
    ));
    info!(
        tagger = tagger.name(),
        scorer = adapter.scorer_name(),
        "Collaborators ready"
    );

    let pipeline = SelectionPipeline::new(
        graph,
        Arc::new(EntityTagMerger::new(Arc::clone(&normalizer), &config.entities)),
        tagger,
        adapter,
        Arc::new(MultiHopSelector::new(&config.selection, &config.fusion)),
        config.runtime.max_concurrent_questions,
    );

    let inputs = questions
        .into_iter()
        .map(|q| {
            let issues = extraction.issues_for(&q);
            (q, issues)
        })
        .collect();
    let records = pipeline.run(inputs).await;

    let count = |status: SelectionStatus| records.iter().filter(|r| r.status == status).count();
    info!(
        ok = count(SelectionStatus::Ok),
        no_candidates = count(SelectionStatus::NoCandidates),
        failed = count(SelectionStatus::Failed),
        "Questions processed"
    );

    output::write_records(&config.input.output_path, &records)
        .with_context(|| format!("writing {}", config.input.output_path.display()))?;
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

/// Install the Prometheus exporter when a metrics port is configured
fn init_metrics(config: &ObservabilityConfig) -> anyhow::Result<()> {
    if config.metrics_port == 0 {
        return Ok(());
    }

    let addr: SocketAddr = ([0, 0, 0, 0], config.metrics_port).into();
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("installing Prometheus exporter")?;
    metrics::register_metrics();
    info!("Metrics exporter listening on {}", addr);
    Ok(())
}
