//! Multi-hop paragraph selection
//!
//! Per question: build the candidate pool, rank hop-1 paragraphs by fused
//! relevance and entity overlap, expand the best of them through bridge
//! links, and emit the top chains of length 1 or 2.

pub mod fusion;
pub mod hop1;
pub mod hop2;
pub mod prefilter;
mod selector;

pub use hop2::Bridge;
pub use selector::MultiHopSelector;

use bridgehop_common::errors::Issue;
use bridgehop_common::scoring::ScoreSource;
use bridgehop_common::ParagraphId;
use serde::{Deserialize, Serialize};

/// An ordered evidence chain of one or two paragraphs
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParagraphChain {
    pub paragraphs: Vec<ParagraphId>,
    pub score: f32,
    /// The link crossed by a two-hop chain
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bridge: Option<Bridge>,
}

impl ParagraphChain {
    pub fn is_two_hop(&self) -> bool {
        self.paragraphs.len() == 2
    }
}

/// Outcome of selection for one question
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStatus {
    Ok,
    NoCandidates,
    Failed,
}

impl SelectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionStatus::Ok => "ok",
            SelectionStatus::NoCandidates => "no_candidates",
            SelectionStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Selection {
    /// Chains by descending score
    pub chains: Vec<ParagraphChain>,
    pub status: SelectionStatus,
    pub issues: Vec<Issue>,
    /// Scorer that produced the relevance scores
    pub source: ScoreSource,
}

impl Selection {
    pub fn two_hop_count(&self) -> usize {
        self.chains.iter().filter(|c| c.is_two_hop()).count()
    }
}
