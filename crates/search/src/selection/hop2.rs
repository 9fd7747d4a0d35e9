//! Hop-2 expansion through bridge links
//!
//! A link out of a hop-1 paragraph is a bridge when its anchor normalizes
//! to an entity of the question or of the hop-1 paragraph itself.

use super::fusion::{BridgeMatch, BridgeSource, ChainFusion};
use crate::graph::{LinkEdge, LinkGraph, ParagraphIdx};
use bridgehop_common::entities::EntityMention;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// The link a two-hop chain crosses
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bridge {
    pub anchor: String,
    /// Canonical key of the bridge entity
    pub entity: String,
    pub matched: BridgeMatch,
    pub source: BridgeSource,
}

#[derive(Debug, Clone)]
pub struct Hop2Candidate {
    pub paragraph: ParagraphIdx,
    pub bridge: Bridge,
    pub bonus: f32,
}

/// Canonical key -> surface keys that resolved to it
#[derive(Debug, Default)]
pub struct EntityKeys<'a> {
    keys: BTreeMap<&'a str, BTreeSet<&'a str>>,
}

impl<'a> EntityKeys<'a> {
    pub fn new(mentions: &'a [EntityMention]) -> Self {
        let mut keys: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for mention in mentions {
            keys.entry(mention.key.as_str())
                .or_default()
                .insert(mention.surface_key.as_str());
        }
        Self { keys }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains_key(key)
    }

    /// How an anchor matches these entities, if at all
    pub fn match_anchor(&self, link: &LinkEdge) -> Option<BridgeMatch> {
        let surfaces = self.keys.get(link.anchor_key.as_str())?;
        if surfaces.contains(link.anchor_surface_key.as_str()) {
            Some(BridgeMatch::Exact)
        } else {
            Some(BridgeMatch::Alias)
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Strongest bridge a link offers, or `None` when it is not a bridge
pub fn bridge_for(
    link: &LinkEdge,
    question: &EntityKeys<'_>,
    paragraph: &EntityKeys<'_>,
    fusion: &ChainFusion,
) -> Option<(Bridge, f32)> {
    let options = [
        question.match_anchor(link).map(|m| (m, BridgeSource::Question)),
        paragraph.match_anchor(link).map(|m| (m, BridgeSource::Paragraph)),
    ];

    let (matched, source) = options
        .into_iter()
        .flatten()
        .max_by(|a, b| {
            fusion
                .bridge_bonus(a.0, a.1)
                .total_cmp(&fusion.bridge_bonus(b.0, b.1))
                .then(a.1.cmp(&b.1))
        })?;

    let bridge = Bridge {
        anchor: link.anchor.clone(),
        entity: link.anchor_key.clone(),
        matched,
        source,
    };
    Some((bridge, fusion.bridge_bonus(matched, source)))
}

/// Hop-2 candidates reachable from one hop-1 paragraph. Each target
/// paragraph appears once, with its strongest bridge.
pub fn expand(
    graph: &LinkGraph,
    hop1: ParagraphIdx,
    question: &EntityKeys<'_>,
    paragraph: &EntityKeys<'_>,
    per_target: usize,
    fusion: &ChainFusion,
) -> Vec<Hop2Candidate> {
    let own_document = graph.paragraph(hop1).document;
    let mut best: BTreeMap<ParagraphIdx, Hop2Candidate> = BTreeMap::new();

    for link in graph.links_from(hop1) {
        if link.target == own_document {
            continue;
        }
        let Some((bridge, bonus)) = bridge_for(link, question, paragraph, fusion) else {
            continue;
        };

        for target in graph.document(link.target).paragraph_indices().take(per_target) {
            match best.get(&target) {
                Some(existing) if existing.bonus >= bonus => {}
                _ => {
                    best.insert(
                        target,
                        Hop2Candidate {
                            paragraph: target,
                            bridge: bridge.clone(),
                            bonus,
                        },
                    );
                }
            }
        }
    }

    best.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::tests::{extraction, record};
    use bridgehop_common::entities::normalize::AliasTable;
    use bridgehop_common::entities::{EntityType, Normalizer};

    fn mention(text: &str, normalizer: &Normalizer) -> EntityMention {
        EntityMention::new(text, 0, text.len(), EntityType::Person, None, normalizer, 1).unwrap()
    }

    fn graph(normalizer: &Normalizer) -> LinkGraph {
        let ex = extraction(vec![
            record(
                "A",
                &[(
                    "Barack Obama met Michelle in Chicago.",
                    r#"<a href="B">Barack Obama</a> met <a href="M">Michelle</a> in <a href="A">Chicago</a>."#,
                )],
            ),
            record(
                "B",
                &[
                    ("Obama was born in Hawaii.", "Obama was born in Hawaii."),
                    ("He studied law.", "He studied law."),
                ],
            ),
            record("M", &[("Michelle Obama is a lawyer.", "Michelle Obama is a lawyer.")]),
        ]);
        LinkGraph::build(&ex, normalizer).unwrap()
    }

    #[test]
    fn test_bridge_from_question_entity() {
        let normalizer = Normalizer::default();
        let g = graph(&normalizer);
        let q = [mention("Barack Obama", &normalizer)];
        let question = EntityKeys::new(&q);
        let paragraph = EntityKeys::default();

        let a0 = g.find_paragraph(&bridgehop_common::ParagraphId::new("A", 0)).unwrap();
        let found = expand(&g, a0, &question, &paragraph, 2, &ChainFusion::default());

        let ids: Vec<String> = found.iter().map(|c| g.paragraph_id(c.paragraph).to_string()).collect();
        assert_eq!(ids, vec!["B#0", "B#1"]);
        assert_eq!(found[0].bridge.matched, BridgeMatch::Exact);
        assert_eq!(found[0].bridge.source, BridgeSource::Question);
    }

    #[test]
    fn test_paragraph_entity_bridges_and_self_links_skipped() {
        let normalizer = Normalizer::default();
        let g = graph(&normalizer);
        let p = [mention("Michelle", &normalizer), mention("Chicago", &normalizer)];
        let paragraph = EntityKeys::new(&p);

        let a0 = g.find_paragraph(&bridgehop_common::ParagraphId::new("A", 0)).unwrap();
        let found = expand(&g, a0, &EntityKeys::default(), &paragraph, 1, &ChainFusion::default());

        // "Chicago" links back to A itself and is never followed
        assert_eq!(found.len(), 1);
        assert_eq!(g.paragraph_id(found[0].paragraph).to_string(), "M#0");
        assert_eq!(found[0].bridge.source, BridgeSource::Paragraph);
    }

    #[test]
    fn test_alias_match_is_weaker() {
        let aliases = AliasTable::from_pairs([("barack obama", "obama")], true).unwrap();
        let normalizer = Normalizer::new(true, aliases);
        let g = graph(&normalizer);
        let q = [mention("Obama", &normalizer)];
        let question = EntityKeys::new(&q);

        let a0 = g.find_paragraph(&bridgehop_common::ParagraphId::new("A", 0)).unwrap();
        let found = expand(&g, a0, &question, &EntityKeys::default(), 1, &ChainFusion::default());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].bridge.matched, BridgeMatch::Alias);
        assert_eq!(found[0].bridge.entity, "obama");
    }

    #[test]
    fn test_no_entities_no_bridges() {
        let normalizer = Normalizer::default();
        let g = graph(&normalizer);
        let empty = EntityKeys::default();
        let a0 = g.find_paragraph(&bridgehop_common::ParagraphId::new("A", 0)).unwrap();
        assert!(expand(&g, a0, &empty, &empty, 1, &ChainFusion::default()).is_empty());
    }
}
