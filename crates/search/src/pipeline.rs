//! Per-question selection pipeline
//!
//! Every question runs as its own tokio task (merge tags, score, select),
//! bounded by a semaphore. Results are collected in question input order;
//! a task that panics yields a `failed` record for that question only.

use crate::graph::LinkGraph;
use crate::output::SelectionRecord;
use crate::selection::MultiHopSelector;
use bridgehop_common::errors::{AppError, Issue};
use bridgehop_common::metrics::QuestionMetrics;
use bridgehop_common::ner::{EntityTagMerger, Tagger};
use bridgehop_common::scoring::ScorerAdapter;
use bridgehop_common::Question;
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument};

/// Shared, read-only state of a selection run
#[derive(Clone)]
pub struct SelectionPipeline {
    graph: Arc<LinkGraph>,
    merger: Arc<EntityTagMerger>,
    tagger: Arc<dyn Tagger>,
    adapter: Arc<ScorerAdapter>,
    selector: Arc<MultiHopSelector>,
    permits: Arc<Semaphore>,
}

impl SelectionPipeline {
    pub fn new(
        graph: Arc<LinkGraph>,
        merger: Arc<EntityTagMerger>,
        tagger: Arc<dyn Tagger>,
        adapter: Arc<ScorerAdapter>,
        selector: Arc<MultiHopSelector>,
        max_concurrent: usize,
    ) -> Self {
        Self {
            graph,
            merger,
            tagger,
            adapter,
            selector,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Run every question. `prior_issues` (e.g. missing candidate documents)
    /// are attached to the matching question's record.
    pub async fn run(&self, questions: Vec<(Question, Vec<Issue>)>) -> Vec<SelectionRecord> {
        info!(questions = questions.len(), "Selection started");

        let handles: Vec<(String, JoinHandle<SelectionRecord>)> = questions
            .into_iter()
            .map(|(question, prior_issues)| {
                let id = question.id.clone();
                let pipeline = self.clone();
                let handle = tokio::spawn(async move {
                    let _permit = match Arc::clone(&pipeline.permits).acquire_owned().await {
                        Ok(permit) => permit,
                        Err(e) => {
                            let err = AppError::Internal {
                                message: format!("question scheduler closed: {}", e),
                            };
                            return SelectionRecord::failed(question.id, err.to_issue());
                        }
                    };
                    pipeline.process(question, prior_issues).await
                });
                (id, handle)
            })
            .collect();

        let (ids, handles): (Vec<String>, Vec<JoinHandle<SelectionRecord>>) = handles.into_iter().unzip();
        let joined = join_all(handles).await;

        let mut records = Vec::with_capacity(joined.len());
        for (id, outcome) in ids.into_iter().zip(joined) {
            match outcome {
                Ok(record) => records.push(record),
                Err(e) => {
                    let err = AppError::Internal {
                        message: format!("question task failed: {}", e),
                    };
                    error!(question_id = %id, error = %err, "Question pipeline aborted");
                    QuestionMetrics::start().finish("failed", 0, 0);
                    records.push(SelectionRecord::failed(id, err.to_issue()));
                }
            }
        }

        info!(records = records.len(), "Selection finished");
        records
    }

    #[instrument(skip_all, fields(question_id = %question.id))]
    async fn process(&self, question: Question, mut issues: Vec<Issue>) -> SelectionRecord {
        let metrics = QuestionMetrics::start();

        let pool = self.selector.candidate_pool(&self.graph, &question);
        let merged = self
            .merger
            .merge(
                &question.text,
                &self.graph.merge_inputs(&pool),
                &self.graph.titles_of(&pool),
                self.tagger.as_ref(),
            )
            .await;
        issues.extend(merged.issues.iter().cloned());

        let selection = self
            .selector
            .select(&self.graph, &question, &pool, &merged, &self.adapter)
            .await;

        let two_hop = selection.two_hop_count();
        debug!(
            status = selection.status.as_str(),
            source = ?selection.source,
            chains = selection.chains.len(),
            two_hop,
            "Question selected"
        );
        metrics.finish(
            selection.status.as_str(),
            selection.chains.len() - two_hop,
            two_hop,
        );

        SelectionRecord::from_selection(question.id, selection, issues)
    }
}
