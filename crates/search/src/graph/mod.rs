//! Entity-link graph
//!
//! Immutable arena of documents, paragraphs and links, built once per run
//! from the extraction and shared by every question task.

mod arena;

pub use arena::{DocIdx, DocumentNode, LinkEdge, ParagraphIdx, ParagraphNode};

use bridgehop_common::entities::Normalizer;
use bridgehop_common::errors::{AppError, Result};
use bridgehop_common::extract::Extraction;
use bridgehop_common::metrics;
use bridgehop_common::ner::merger::ParagraphInput;
use bridgehop_common::ParagraphId;
use std::collections::{HashMap, HashSet};
use tracing::info;

/// Read-only link graph
#[derive(Debug, Default)]
pub struct LinkGraph {
    documents: Vec<DocumentNode>,
    paragraphs: Vec<ParagraphNode>,
    /// Links grouped by source paragraph
    links: Vec<LinkEdge>,
    /// CSR offsets: links of paragraph `p` are `links[offsets[p]..offsets[p + 1]]`
    link_offsets: Vec<u32>,
    by_id: HashMap<String, DocIdx>,
}

impl LinkGraph {
    /// Build the arena. Documents are laid out in id order; links to
    /// documents outside the extraction are dropped.
    pub fn build(extraction: &Extraction, normalizer: &Normalizer) -> Result<Self> {
        let mut graph = LinkGraph::default();

        for (position, document) in extraction.documents.values().enumerate() {
            let idx = DocIdx(to_u32(position)?);
            let first = to_u32(graph.paragraphs.len())?;
            for paragraph in &document.paragraphs {
                graph.paragraphs.push(ParagraphNode {
                    document: idx,
                    index: paragraph.index,
                    text: paragraph.text.clone(),
                    tags: paragraph.tags.clone(),
                });
            }
            let end = to_u32(graph.paragraphs.len())?;

            graph.by_id.insert(document.id.clone(), idx);
            graph.documents.push(DocumentNode {
                id: document.id.clone(),
                title: document.title.clone(),
                paragraphs: first..end,
            });
        }

        let mut dropped = 0usize;
        graph.link_offsets.push(0);
        for document in extraction.documents.values() {
            for paragraph in &document.paragraphs {
                for link in &paragraph.links {
                    let Some(&target) = graph.by_id.get(&link.target) else {
                        dropped += 1;
                        continue;
                    };
                    let (anchor_surface_key, anchor_key) = normalizer.keys(&link.anchor);
                    graph.links.push(LinkEdge {
                        target,
                        anchor: link.anchor.clone(),
                        anchor_key,
                        anchor_surface_key,
                    });
                }
                graph.link_offsets.push(to_u32(graph.links.len())?);
            }
        }

        metrics::record_links_dropped("target", dropped);
        info!(
            documents = graph.document_count(),
            paragraphs = graph.paragraph_count(),
            links = graph.link_count(),
            dropped_links = dropped,
            "Link graph built"
        );
        Ok(graph)
    }

    pub fn document(&self, idx: DocIdx) -> &DocumentNode {
        &self.documents[idx.get()]
    }

    pub fn paragraph(&self, idx: ParagraphIdx) -> &ParagraphNode {
        &self.paragraphs[idx.get()]
    }

    pub fn document_index(&self, id: &str) -> Option<DocIdx> {
        self.by_id.get(id).copied()
    }

    /// Outgoing links of a paragraph, in paragraph order
    pub fn links_from(&self, idx: ParagraphIdx) -> &[LinkEdge] {
        let start = self.link_offsets[idx.get()] as usize;
        let end = self.link_offsets[idx.get() + 1] as usize;
        &self.links[start..end]
    }

    pub fn paragraph_id(&self, idx: ParagraphIdx) -> ParagraphId {
        let node = self.paragraph(idx);
        ParagraphId::new(self.document(node.document).id.clone(), node.index)
    }

    /// Merger inputs for a set of paragraphs, carrying their stored tags
    pub fn merge_inputs(&self, paragraphs: &[ParagraphIdx]) -> Vec<ParagraphInput<'_>> {
        paragraphs
            .iter()
            .map(|&p| {
                let node = self.paragraph(p);
                ParagraphInput {
                    id: self.paragraph_id(p),
                    text: &node.text,
                    stored_tags: node.tags.as_deref(),
                }
            })
            .collect()
    }

    /// Distinct titles of the documents owning `paragraphs`, first-seen order
    pub fn titles_of(&self, paragraphs: &[ParagraphIdx]) -> Vec<String> {
        let mut seen = HashSet::new();
        paragraphs
            .iter()
            .map(|&p| self.paragraph(p).document)
            .filter(|doc| seen.insert(*doc))
            .map(|doc| self.document(doc).title.clone())
            .collect()
    }

    /// Every paragraph in arena order
    pub fn all_paragraphs(&self) -> impl Iterator<Item = ParagraphIdx> {
        (0..self.paragraphs.len() as u32).map(ParagraphIdx)
    }

    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    pub fn paragraph_count(&self) -> usize {
        self.paragraphs.len()
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }
}

#[cfg(test)]
impl LinkGraph {
    pub fn find_paragraph(&self, id: &ParagraphId) -> Option<ParagraphIdx> {
        let doc = self.document(self.document_index(&id.document)?);
        doc.paragraph_indices()
            .find(|&p| self.paragraph(p).index == id.index)
    }
}

fn to_u32(n: usize) -> Result<u32> {
    u32::try_from(n).map_err(|_| AppError::Internal {
        message: format!("link graph exceeds {} nodes", u32::MAX),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use bridgehop_common::extract::parse_document;
    use bridgehop_common::DocumentRecord;

    pub(crate) fn record(id: &str, paragraphs: &[(&str, &str)]) -> DocumentRecord {
        DocumentRecord {
            id: id.to_string(),
            url: None,
            title: id.to_string(),
            paragraphs: paragraphs.iter().map(|(t, _)| t.to_string()).collect(),
            paragraphs_with_links: paragraphs.iter().map(|(_, m)| m.to_string()).collect(),
            tags: None,
        }
    }

    pub(crate) fn extraction(records: Vec<DocumentRecord>) -> Extraction {
        let mut extraction = Extraction::default();
        for record in records {
            let (document, _) = parse_document(record);
            extraction.documents.insert(document.id.clone(), document);
        }
        extraction
    }

    #[test]
    fn test_build_arena() {
        let ex = extraction(vec![
            record(
                "A",
                &[(
                    "Barack Obama was president.",
                    r#"Barack <a href="B">Obama</a> was president."#,
                )],
            ),
            record(
                "B",
                &[
                    ("Obama was born in Hawaii.", r#"<a href="A">Obama</a> was born in <a href="Hawaii">Hawaii</a>."#),
                    ("He attended school.", "He attended school."),
                ],
            ),
        ]);
        let graph = LinkGraph::build(&ex, &Normalizer::default()).unwrap();

        assert_eq!(graph.document_count(), 2);
        assert_eq!(graph.paragraph_count(), 3);
        // The link to the absent "Hawaii" document is dropped
        assert_eq!(graph.link_count(), 2);

        let a0 = graph.find_paragraph(&ParagraphId::new("A", 0)).unwrap();
        let links = graph.links_from(a0);
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].anchor_key, "obama");
        assert_eq!(graph.document(links[0].target).id, "B");

        let b1 = graph.find_paragraph(&ParagraphId::new("B", 1)).unwrap();
        assert!(graph.links_from(b1).is_empty());
        assert_eq!(graph.paragraph_id(b1).to_string(), "B#1");
        assert!(graph.find_paragraph(&ParagraphId::new("B", 7)).is_none());
    }

    #[test]
    fn test_cycles_are_representable() {
        let ex = extraction(vec![
            record("A", &[("to B", r#"to <a href="B">B</a>"#)]),
            record("B", &[("to A", r#"to <a href="A">A</a>"#)]),
        ]);
        let graph = LinkGraph::build(&ex, &Normalizer::default()).unwrap();
        let a = graph.document_index("A").unwrap();
        let b = graph.document_index("B").unwrap();
        assert_eq!(graph.links_from(ParagraphIdx(0))[0].target, b);
        assert_eq!(graph.links_from(ParagraphIdx(1))[0].target, a);
    }
}
