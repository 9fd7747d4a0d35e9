//! Hop-1 candidate generation and ranking

use super::fusion::{ChainFusion, ScoreScale};
use crate::graph::ParagraphIdx;

/// A pool paragraph with its raw relevance and entity overlap
#[derive(Debug, Clone, Copy)]
pub struct PoolEntry {
    pub paragraph: ParagraphIdx,
    pub raw: f32,
    /// Share of distinct question entity keys found in the paragraph
    pub overlap: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct Hop1Candidate {
    pub paragraph: ParagraphIdx,
    /// Position in the candidate pool
    pub pool_rank: usize,
    pub fused: f32,
}

/// Entity-overlapping paragraphs plus the `breadth` best positively scored
/// ones, ranked by fused score with ties broken by pool order
pub fn rank_hop1(
    entries: &[PoolEntry],
    breadth: usize,
    scale: &ScoreScale,
    fusion: &ChainFusion,
) -> Vec<Hop1Candidate> {
    let mut by_relevance: Vec<usize> = (0..entries.len())
        .filter(|&i| entries[i].raw > 0.0)
        .collect();
    by_relevance.sort_by(|&a, &b| entries[b].raw.total_cmp(&entries[a].raw).then(a.cmp(&b)));
    by_relevance.truncate(breadth);

    let mut selected = vec![false; entries.len()];
    for i in by_relevance {
        selected[i] = true;
    }
    for (i, entry) in entries.iter().enumerate() {
        if entry.overlap > 0.0 {
            selected[i] = true;
        }
    }

    let mut candidates: Vec<Hop1Candidate> = entries
        .iter()
        .enumerate()
        .filter(|(i, _)| selected[*i])
        .map(|(pool_rank, entry)| Hop1Candidate {
            paragraph: entry.paragraph,
            pool_rank,
            fused: fusion.hop1(scale.normalize(entry.raw), entry.overlap),
        })
        .collect();

    candidates.sort_by(|a, b| b.fused.total_cmp(&a.fused).then(a.pool_rank.cmp(&b.pool_rank)));
    candidates
}
