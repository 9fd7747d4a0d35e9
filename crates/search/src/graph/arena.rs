//! Arena node types
//!
//! Documents, paragraphs and links live in flat vectors and refer to each
//! other by `u32` indices, so the graph is cheap to share read-only.

use bridgehop_common::ner::RawTag;
use std::ops::Range;

/// Index of a document in the arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocIdx(pub u32);

/// Index of a paragraph in the arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParagraphIdx(pub u32);

impl DocIdx {
    pub fn get(self) -> usize {
        self.0 as usize
    }
}

impl ParagraphIdx {
    pub fn get(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone)]
pub struct DocumentNode {
    pub id: String,
    pub title: String,
    /// Arena range of this document's paragraphs, in paragraph order
    pub paragraphs: Range<u32>,
}

impl DocumentNode {
    pub fn paragraph_indices(&self) -> impl Iterator<Item = ParagraphIdx> {
        self.paragraphs.clone().map(ParagraphIdx)
    }
}

#[derive(Debug, Clone)]
pub struct ParagraphNode {
    pub document: DocIdx,
    /// Position within the owning document
    pub index: usize,
    pub text: String,
    /// Tags stored at ingestion, if any
    pub tags: Option<Vec<RawTag>>,
}

/// Directed link from a paragraph to a document; the source paragraph is
/// implied by its position in the CSR layout
#[derive(Debug, Clone)]
pub struct LinkEdge {
    pub target: DocIdx,
    pub anchor: String,
    /// Canonical key of the anchor text
    pub anchor_key: String,
    /// Anchor key before alias resolution
    pub anchor_surface_key: String,
}
