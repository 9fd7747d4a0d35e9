//! Score fusion for hop-1 ranking and chain scoring
//!
//! Raw relevance scores are only comparable within a question, so every
//! score is min-max normalized over the question's raw scores before it is
//! combined with entity overlap and bridge bonuses.

use bridgehop_common::config::FusionConfig;
use serde::Serialize;

/// Min-max normalization over one question's raw scores
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreScale {
    min: f32,
    max: f32,
}

impl ScoreScale {
    pub fn from_scores<I: IntoIterator<Item = f32>>(scores: I) -> Self {
        let mut iter = scores.into_iter();
        let Some(first) = iter.next() else {
            return Self { min: 0.0, max: 0.0 };
        };
        let (min, max) = iter.fold((first, first), |(lo, hi), s| (lo.min(s), hi.max(s)));
        Self { min, max }
    }

    /// Map into `[0, 1]`. A flat distribution maps to 1 when positive, else 0.
    pub fn normalize(&self, score: f32) -> f32 {
        if self.max > self.min {
            ((score - self.min) / (self.max - self.min)).clamp(0.0, 1.0)
        } else if self.max > 0.0 {
            1.0
        } else {
            0.0
        }
    }
}

/// How the anchor text matched the bridge entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeMatch {
    /// Only the canonical keys agree (alias table)
    Alias,
    /// The pre-alias surface keys agree
    Exact,
}

/// Where the bridge entity was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeSource {
    /// Only in the hop-1 paragraph
    Paragraph,
    /// In the question
    Question,
}

/// Fusion weights and bonuses
#[derive(Debug, Clone)]
pub struct ChainFusion {
    pub relevance_weight: f32,
    pub entity_weight: f32,
    pub hop2_weight: f32,
    pub exact_bonus: f32,
    pub alias_bonus: f32,
    pub paragraph_factor: f32,
}

impl Default for ChainFusion {
    fn default() -> Self {
        Self::from_config(&FusionConfig::default())
    }
}

impl ChainFusion {
    pub fn from_config(config: &FusionConfig) -> Self {
        Self {
            relevance_weight: config.relevance_weight,
            entity_weight: config.entity_weight,
            hop2_weight: config.hop2_weight,
            exact_bonus: config.bridge_exact_bonus,
            alias_bonus: config.bridge_alias_bonus,
            paragraph_factor: config.paragraph_bridge_factor,
        }
    }

    /// Fused hop-1 score
    pub fn hop1(&self, normalized: f32, overlap_fraction: f32) -> f32 {
        self.relevance_weight * normalized + self.entity_weight * overlap_fraction
    }

    pub fn bridge_bonus(&self, matched: BridgeMatch, source: BridgeSource) -> f32 {
        let bonus = match matched {
            BridgeMatch::Exact => self.exact_bonus,
            BridgeMatch::Alias => self.alias_bonus,
        };
        match source {
            BridgeSource::Question => bonus,
            BridgeSource::Paragraph => bonus * self.paragraph_factor,
        }
    }

    /// Score of a two-hop chain given its hop-1 fused score
    pub fn chain(&self, hop1: f32, hop2_normalized: f32, matched: BridgeMatch, source: BridgeSource) -> f32 {
        hop1 + self.hop2_weight * hop2_normalized + self.bridge_bonus(matched, source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale() {
        let scale = ScoreScale::from_scores([2.0, -1.0, 5.0]);
        assert_eq!(scale.normalize(-1.0), 0.0);
        assert_eq!(scale.normalize(5.0), 1.0);
        assert_eq!(scale.normalize(2.0), 0.5);
    }

    #[test]
    fn test_flat_scale() {
        assert_eq!(ScoreScale::from_scores([0.4, 0.4]).normalize(0.4), 1.0);
        assert_eq!(ScoreScale::from_scores([0.0, 0.0]).normalize(0.0), 0.0);
        assert_eq!(ScoreScale::from_scores(std::iter::empty()).normalize(3.0), 0.0);
    }

    #[test]
    fn test_bridge_strength_ordering() {
        let fusion = ChainFusion::default();
        let exact_q = fusion.bridge_bonus(BridgeMatch::Exact, BridgeSource::Question);
        let alias_q = fusion.bridge_bonus(BridgeMatch::Alias, BridgeSource::Question);
        let exact_p = fusion.bridge_bonus(BridgeMatch::Exact, BridgeSource::Paragraph);
        let alias_p = fusion.bridge_bonus(BridgeMatch::Alias, BridgeSource::Paragraph);
        assert!(exact_q > alias_q);
        assert!(exact_q > exact_p);
        assert!(alias_q > alias_p);
        assert!(exact_p > alias_p);
    }

    #[test]
    fn test_chain_score() {
        let fusion = ChainFusion::default();
        let score = fusion.chain(1.0, 0.5, BridgeMatch::Exact, BridgeSource::Question);
        assert!((score - 1.8).abs() < 1e-6);
        assert!((fusion.hop1(1.0, 1.0) - 1.5).abs() < 1e-6);
    }
}
