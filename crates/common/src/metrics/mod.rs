//! Metrics and observability utilities
//!
//! Prometheus-style metrics for the extraction, tagging, scoring and
//! selection stages, with standardized naming under a common prefix.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all BridgeHop metrics
pub const METRICS_PREFIX: &str = "bridgehop";

/// Histogram buckets for per-question latency (in seconds)
pub const LATENCY_BUCKETS: &[f64] = &[
    0.005, // 5ms
    0.010, // 10ms
    0.025, // 25ms
    0.050, // 50ms
    0.100, // 100ms
    0.250, // 250ms
    0.500, // 500ms
    1.000, // 1s
    2.500, // 2.5s
    5.000, // 5s
    10.00, // 10s
    30.00, // 30s
];

/// Buckets for scorer batch latency (model inference is the slow path)
pub const SCORER_BUCKETS: &[f64] = &[
    0.010, // 10ms
    0.050, // 50ms
    0.100, // 100ms
    0.250, // 250ms
    0.500, // 500ms
    1.000, // 1s
    2.000, // 2s
    5.000, // 5s
    10.00, // 10s
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Extraction metrics
    describe_counter!(
        format!("{}_documents_extracted_total", METRICS_PREFIX),
        Unit::Count,
        "Documents loaded and parsed by the link extractor"
    );

    describe_counter!(
        format!("{}_documents_missing_total", METRICS_PREFIX),
        Unit::Count,
        "Referenced document ids absent from the store"
    );

    describe_counter!(
        format!("{}_links_dropped_total", METRICS_PREFIX),
        Unit::Count,
        "Links dropped because the anchor or the target could not be resolved"
    );

    // Tagging metrics
    describe_counter!(
        format!("{}_malformed_mentions_total", METRICS_PREFIX),
        Unit::Count,
        "Tagger spans dropped as malformed"
    );

    describe_counter!(
        format!("{}_tagger_requests_total", METRICS_PREFIX),
        Unit::Count,
        "NER tagger requests"
    );

    // Scorer metrics
    describe_counter!(
        format!("{}_scorer_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Relevance scorer batch requests"
    );

    describe_histogram!(
        format!("{}_scorer_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Relevance scorer batch latency in seconds"
    );

    describe_counter!(
        format!("{}_scorer_fallbacks_total", METRICS_PREFIX),
        Unit::Count,
        "Questions that fell back to lexical scoring"
    );

    // Selection metrics
    describe_counter!(
        format!("{}_questions_total", METRICS_PREFIX),
        Unit::Count,
        "Questions processed, by outcome"
    );

    describe_counter!(
        format!("{}_chains_emitted_total", METRICS_PREFIX),
        Unit::Count,
        "Paragraph chains emitted, by length"
    );

    describe_histogram!(
        format!("{}_question_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "End-to-end latency of one question pipeline"
    );

    // Ingestion metrics
    describe_counter!(
        format!("{}_documents_ingested_total", METRICS_PREFIX),
        Unit::Count,
        "Documents written to the store"
    );

    describe_counter!(
        format!("{}_records_rejected_total", METRICS_PREFIX),
        Unit::Count,
        "Dump records rejected during ingestion"
    );

    tracing::info!("Metrics registered");
}

/// Tracks one question pipeline from start to finish
pub struct QuestionMetrics {
    start: Instant,
}

impl QuestionMetrics {
    /// Start tracking a question
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Record the outcome of the question
    pub fn finish(self, status: &str, single_hop: usize, two_hop: usize) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_questions_total", METRICS_PREFIX),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(format!("{}_question_duration_seconds", METRICS_PREFIX)).record(duration);

        counter!(
            format!("{}_chains_emitted_total", METRICS_PREFIX),
            "hops" => "1"
        )
        .increment(single_hop as u64);

        counter!(
            format!("{}_chains_emitted_total", METRICS_PREFIX),
            "hops" => "2"
        )
        .increment(two_hop as u64);
    }
}

/// Helper to record extraction metrics
pub fn record_extraction(documents: usize, missing: usize) {
    counter!(format!("{}_documents_extracted_total", METRICS_PREFIX)).increment(documents as u64);
    counter!(format!("{}_documents_missing_total", METRICS_PREFIX)).increment(missing as u64);
}

/// Helper to record dropped links
pub fn record_links_dropped(reason: &str, count: usize) {
    if count == 0 {
        return;
    }
    counter!(
        format!("{}_links_dropped_total", METRICS_PREFIX),
        "reason" => reason.to_string()
    )
    .increment(count as u64);
}

/// Helper to record malformed tagger spans
pub fn record_malformed_mention(source: &str) {
    counter!(
        format!("{}_malformed_mentions_total", METRICS_PREFIX),
        "source" => source.to_string()
    )
    .increment(1);
}

/// Helper to record tagger requests
pub fn record_tagger_call(tagger: &str, success: bool) {
    let status = if success { "success" } else { "error" };
    counter!(
        format!("{}_tagger_requests_total", METRICS_PREFIX),
        "tagger" => tagger.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Helper to record scorer batch metrics
pub fn record_scorer_call(duration_secs: f64, scorer: &str, batch_size: usize, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_scorer_requests_total", METRICS_PREFIX),
        "scorer" => scorer.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    if success {
        histogram!(
            format!("{}_scorer_duration_seconds", METRICS_PREFIX),
            "scorer" => scorer.to_string()
        )
        .record(duration_secs);
    }

    tracing::trace!(scorer, batch_size, success, "Scorer batch recorded");
}

/// Helper to record a switch to the lexical fallback
pub fn record_scorer_fallback(reason: &str) {
    counter!(
        format!("{}_scorer_fallbacks_total", METRICS_PREFIX),
        "reason" => reason.to_string()
    )
    .increment(1);
}

/// Helper to record ingestion metrics
pub fn record_ingestion(ingested: usize, rejected: usize) {
    counter!(format!("{}_documents_ingested_total", METRICS_PREFIX)).increment(ingested as u64);
    counter!(format!("{}_records_rejected_total", METRICS_PREFIX)).increment(rejected as u64);
}
