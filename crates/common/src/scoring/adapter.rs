//! Scorer adapter: capping, batching, timeouts and lexical fallback

use super::{LexicalScorer, ScoreSource, Scorer, ScoringQuery};
use crate::config::ScorerConfig;
use crate::corpus::ParagraphId;
use crate::errors::{AppError, Issue, Result};
use crate::metrics;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Relevance of one paragraph for one question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelevanceScore {
    pub paragraph: ParagraphId,
    pub score: f32,
}

/// Scores for one candidate set, in candidate order
#[derive(Debug, Clone)]
pub struct ScoreSheet {
    pub scores: Vec<RelevanceScore>,
    pub source: ScoreSource,
    pub issues: Vec<Issue>,
}

/// A paragraph submitted for scoring
#[derive(Debug, Clone)]
pub struct ScoringCandidate<'a> {
    pub id: ParagraphId,
    pub text: &'a str,
}

/// Wraps a [`Scorer`] for use by the selector
pub struct ScorerAdapter {
    scorer: Arc<dyn Scorer>,
    lexical: LexicalScorer,
    cap: usize,
    batch_size: usize,
    timeout: Duration,
}

impl ScorerAdapter {
    pub fn new(
        scorer: Arc<dyn Scorer>,
        config: &ScorerConfig,
        candidate_cap: usize,
        case_fold: bool,
    ) -> Self {
        Self {
            scorer,
            lexical: LexicalScorer::new(case_fold),
            cap: candidate_cap.max(1),
            batch_size: config.batch_size.max(1),
            timeout: config.timeout(),
        }
    }

    pub fn candidate_cap(&self) -> usize {
        self.cap
    }

    pub fn scorer_name(&self) -> &str {
        self.scorer.name()
    }

    /// Start scoring for one question. Every pass of the session shares the
    /// fallback state, so scores stay comparable within the question.
    pub fn session<'a>(&'a self, query: &'a ScoringQuery) -> ScoringSession<'a> {
        ScoringSession {
            adapter: self,
            query,
            fallen_back: self.scorer.source() == ScoreSource::Lexical,
        }
    }

    async fn score_with_model(&self, query: &ScoringQuery, texts: &[&str]) -> Result<Vec<f32>> {
        let mut scores = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.batch_size) {
            let started = Instant::now();
            let outcome = tokio::time::timeout(self.timeout, self.scorer.score_batch(query, batch))
                .await
                .map_err(|_| AppError::ScorerTimeout {
                    timeout_ms: self.timeout.as_millis() as u64,
                })
                .and_then(|result| result)
                .and_then(|batch_scores| check_batch(batch.len(), batch_scores));

            metrics::record_scorer_call(
                started.elapsed().as_secs_f64(),
                self.scorer.name(),
                batch.len(),
                outcome.is_ok(),
            );
            scores.extend(outcome?);
        }

        Ok(scores)
    }
}

/// Reject batches that do not line up with their input or contain NaN/inf
fn check_batch(expected: usize, scores: Vec<f32>) -> Result<Vec<f32>> {
    if scores.len() != expected {
        return Err(AppError::ScorerUnavailable {
            message: format!("scorer returned {} scores for {} paragraphs", scores.len(), expected),
        });
    }
    if let Some(bad) = scores.iter().find(|s| !s.is_finite()) {
        return Err(AppError::ScorerUnavailable {
            message: format!("scorer returned a non-finite score ({})", bad),
        });
    }
    Ok(scores)
}

/// Per-question scoring state
pub struct ScoringSession<'a> {
    adapter: &'a ScorerAdapter,
    query: &'a ScoringQuery,
    fallen_back: bool,
}

impl<'a> ScoringSession<'a> {
    /// True once this question is scored lexically
    pub fn fallen_back(&self) -> bool {
        self.fallen_back
    }

    /// Score up to `candidate_cap` candidates, preserving their order.
    ///
    /// Never fails: a scorer failure switches the session to lexical scoring
    /// and the sheet carries the issue.
    pub async fn score(&mut self, candidates: &[ScoringCandidate<'_>]) -> ScoreSheet {
        let candidates = &candidates[..candidates.len().min(self.adapter.cap)];
        let texts: Vec<&str> = candidates.iter().map(|c| c.text).collect();
        let mut issues = Vec::new();

        let (values, source) = if self.fallen_back || texts.is_empty() {
            (self.lexical_scores(&texts), ScoreSource::Lexical)
        } else {
            match self.adapter.score_with_model(self.query, &texts).await {
                Ok(values) => (values, self.adapter.scorer.source()),
                Err(e) => {
                    let err = match e {
                        AppError::ScorerTimeout { .. } | AppError::ScorerUnavailable { .. } => e,
                        other => AppError::ScorerUnavailable {
                            message: other.to_string(),
                        },
                    };
                    warn!(
                        scorer = self.adapter.scorer.name(),
                        error = %err,
                        "Relevance scorer failed, falling back to lexical scoring"
                    );
                    metrics::record_scorer_fallback(fallback_reason(&err));
                    issues.push(err.to_issue());
                    self.fallen_back = true;
                    (self.lexical_scores(&texts), ScoreSource::Lexical)
                }
            }
        };

        debug!(candidates = candidates.len(), ?source, "Scored candidate set");

        ScoreSheet {
            scores: candidates
                .iter()
                .zip(values)
                .map(|(c, score)| RelevanceScore {
                    paragraph: c.id.clone(),
                    score,
                })
                .collect(),
            source,
            issues,
        }
    }

    fn lexical_scores(&self, texts: &[&str]) -> Vec<f32> {
        texts
            .iter()
            .map(|t| self.adapter.lexical.score_text(self.query, t))
            .collect()
    }
}

fn fallback_reason(err: &AppError) -> &'static str {
    match err {
        AppError::ScorerTimeout { .. } => "timeout",
        _ => "unavailable",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorCode;
    use crate::scoring::MockScorer;
    use async_trait::async_trait;

    struct FailingScorer;

    #[async_trait]
    impl Scorer for FailingScorer {
        async fn score_batch(&self, _q: &ScoringQuery, _p: &[&str]) -> Result<Vec<f32>> {
            Err(AppError::ScorerUnavailable {
                message: "model offline".into(),
            })
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    struct SlowScorer;

    #[async_trait]
    impl Scorer for SlowScorer {
        async fn score_batch(&self, _q: &ScoringQuery, p: &[&str]) -> Result<Vec<f32>> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(vec![1.0; p.len()])
        }

        fn name(&self) -> &str {
            "slow"
        }
    }

    struct NanScorer;

    #[async_trait]
    impl Scorer for NanScorer {
        async fn score_batch(&self, _q: &ScoringQuery, p: &[&str]) -> Result<Vec<f32>> {
            Ok(vec![f32::NAN; p.len()])
        }

        fn name(&self) -> &str {
            "nan"
        }
    }

    fn config(timeout_ms: u64, batch_size: usize) -> ScorerConfig {
        ScorerConfig {
            timeout_ms,
            batch_size,
            ..ScorerConfig::default()
        }
    }

    fn query() -> ScoringQuery {
        ScoringQuery {
            text: "Where was Obama born?".to_string(),
            entity_terms: vec![vec!["obama".to_string()]],
        }
    }

    fn candidates(texts: &[&'static str]) -> Vec<ScoringCandidate<'static>> {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| ScoringCandidate {
                id: ParagraphId::new("doc", i),
                text: t,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_model_scores_keep_order_and_batches() {
        let scorer = MockScorer::new(0.0)
            .with_score("a", 0.3)
            .with_score("b", 0.9)
            .with_score("c", 0.5);
        let adapter = ScorerAdapter::new(Arc::new(scorer), &config(1000, 2), 300, true);
        let q = query();
        let mut session = adapter.session(&q);

        let sheet = session.score(&candidates(&["a", "b", "c"])).await;
        assert_eq!(sheet.source, ScoreSource::Model);
        let values: Vec<f32> = sheet.scores.iter().map(|s| s.score).collect();
        assert_eq!(values, vec![0.3, 0.9, 0.5]);
        assert_eq!(sheet.scores[2].paragraph, ParagraphId::new("doc", 2));
        assert!(sheet.issues.is_empty());
    }

    #[tokio::test]
    async fn test_candidate_cap() {
        let adapter = ScorerAdapter::new(Arc::new(MockScorer::new(1.0)), &config(1000, 8), 2, true);
        let q = query();
        let sheet = adapter.session(&q).score(&candidates(&["a", "b", "c"])).await;
        assert_eq!(sheet.scores.len(), 2);
    }

    #[tokio::test]
    async fn test_failure_falls_back_and_sticks() {
        let adapter = ScorerAdapter::new(Arc::new(FailingScorer), &config(1000, 8), 300, true);
        let q = query();
        let mut session = adapter.session(&q);

        let sheet = session
            .score(&candidates(&["Obama was born in Hawaii.", "Hawaii is a state."]))
            .await;
        assert_eq!(sheet.source, ScoreSource::Lexical);
        assert_eq!(sheet.scores[0].score, 1.0);
        assert_eq!(sheet.scores[1].score, 0.0);
        assert_eq!(sheet.issues[0].code, ErrorCode::ScorerUnavailable);
        assert!(session.fallen_back());

        // The second pass does not retry the model
        let second = session.score(&candidates(&["Obama"])).await;
        assert_eq!(second.source, ScoreSource::Lexical);
        assert!(second.issues.is_empty());
    }

    #[tokio::test]
    async fn test_timeout_falls_back() {
        let adapter = ScorerAdapter::new(Arc::new(SlowScorer), &config(20, 8), 300, true);
        let q = query();
        let sheet = adapter.session(&q).score(&candidates(&["Obama"])).await;
        assert_eq!(sheet.source, ScoreSource::Lexical);
        assert_eq!(sheet.issues[0].code, ErrorCode::ScorerTimeout);
    }

    #[tokio::test]
    async fn test_non_finite_scores_fall_back() {
        let adapter = ScorerAdapter::new(Arc::new(NanScorer), &config(1000, 8), 300, true);
        let q = query();
        let sheet = adapter.session(&q).score(&candidates(&["Obama"])).await;
        assert_eq!(sheet.source, ScoreSource::Lexical);
        assert_eq!(sheet.scores[0].score, 1.0);
    }

    #[tokio::test]
    async fn test_identical_inputs_identical_sheets() {
        let adapter = ScorerAdapter::new(
            Arc::new(MockScorer::new(0.25).with_score("x", 0.75)),
            &config(1000, 1),
            300,
            true,
        );
        let q = query();
        let input = candidates(&["x", "y"]);
        let first = adapter.session(&q).score(&input).await;
        let second = adapter.session(&q).score(&input).await;
        assert_eq!(first.scores, second.scores);
    }
}
