//! Entity mentions and their matching keys
//!
//! An [`EntityMention`] is a typed span inside a question or paragraph. It
//! keeps the original surface form for display next to the normalized keys
//! used for matching mentions against each other and against link anchors.

pub mod normalize;

pub use normalize::{AliasTable, Normalizer};

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Entity type of a mention
///
/// Covers the OntoNotes label set emitted by spaCy-style taggers, plus the
/// two mention kinds produced while merging tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    Person,
    Norp,
    Fac,
    Org,
    Gpe,
    Loc,
    Product,
    Event,
    WorkOfArt,
    Law,
    Language,
    Date,
    Time,
    Percent,
    Money,
    Quantity,
    Ordinal,
    Cardinal,
    /// A candidate document title found in the text
    Title,
    /// A context paragraph entity found in the question
    Context,
    /// Any label outside the known set
    Other,
}

impl EntityType {
    /// Parse a tagger label; unknown labels map to `Other`
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_uppercase().as_str() {
            "PERSON" | "PER" => EntityType::Person,
            "NORP" => EntityType::Norp,
            "FAC" => EntityType::Fac,
            "ORG" => EntityType::Org,
            "GPE" => EntityType::Gpe,
            "LOC" => EntityType::Loc,
            "PRODUCT" => EntityType::Product,
            "EVENT" => EntityType::Event,
            "WORK_OF_ART" => EntityType::WorkOfArt,
            "LAW" => EntityType::Law,
            "LANGUAGE" => EntityType::Language,
            "DATE" => EntityType::Date,
            "TIME" => EntityType::Time,
            "PERCENT" => EntityType::Percent,
            "MONEY" => EntityType::Money,
            "QUANTITY" => EntityType::Quantity,
            "ORDINAL" => EntityType::Ordinal,
            "CARDINAL" => EntityType::Cardinal,
            "TITLE" => EntityType::Title,
            "CONTEXT" => EntityType::Context,
            _ => EntityType::Other,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            EntityType::Person => "PERSON",
            EntityType::Norp => "NORP",
            EntityType::Fac => "FAC",
            EntityType::Org => "ORG",
            EntityType::Gpe => "GPE",
            EntityType::Loc => "LOC",
            EntityType::Product => "PRODUCT",
            EntityType::Event => "EVENT",
            EntityType::WorkOfArt => "WORK_OF_ART",
            EntityType::Law => "LAW",
            EntityType::Language => "LANGUAGE",
            EntityType::Date => "DATE",
            EntityType::Time => "TIME",
            EntityType::Percent => "PERCENT",
            EntityType::Money => "MONEY",
            EntityType::Quantity => "QUANTITY",
            EntityType::Ordinal => "ORDINAL",
            EntityType::Cardinal => "CARDINAL",
            EntityType::Title => "TITLE",
            EntityType::Context => "CONTEXT",
            EntityType::Other => "OTHER",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Set of tagger labels kept for matching
#[derive(Debug, Clone, Default)]
pub struct TypeFilter {
    allowed: BTreeSet<EntityType>,
}

impl TypeFilter {
    /// An empty label list keeps every type
    pub fn new<S: AsRef<str>>(labels: &[S]) -> Self {
        Self {
            allowed: labels.iter().map(|l| EntityType::from_label(l.as_ref())).collect(),
        }
    }

    pub fn allows(&self, entity_type: EntityType) -> bool {
        matches!(entity_type, EntityType::Title | EntityType::Context)
            || self.allowed.is_empty()
            || self.allowed.contains(&entity_type)
    }
}

/// A typed span of text that refers to an entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMention {
    /// Display form: the matched text, or the document title for `Title`
    pub surface: String,
    pub entity_type: EntityType,
    /// Byte offset of the span start in the owning text
    pub start: usize,
    /// Byte offset of the span end (exclusive)
    pub end: usize,
    /// Canonical matching key (after alias resolution)
    pub key: String,
    /// Matching key before alias resolution
    pub surface_key: String,
}

impl EntityMention {
    /// Build a mention over `text[start..end]`.
    ///
    /// Returns `None` when the normalized key is shorter than `min_chars`
    /// characters. The span must already be valid for `text`.
    pub fn new(
        text: &str,
        start: usize,
        end: usize,
        entity_type: EntityType,
        display: Option<&str>,
        normalizer: &Normalizer,
        min_chars: usize,
    ) -> Option<Self> {
        let span = text.get(start..end)?;
        let (surface_key, key) = normalizer.keys(display.unwrap_or(span));
        if key.chars().count() < min_chars || surface_key.chars().count() < min_chars {
            return None;
        }
        Some(Self {
            surface: display.unwrap_or(span).to_string(),
            entity_type,
            start,
            end,
            key,
            surface_key,
        })
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// True when `other` lies entirely inside this span
    pub fn contains(&self, other: &EntityMention) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

/// Check that `[start, end)` is a non-empty span on char boundaries of `text`
pub fn check_span(text: &str, start: usize, end: usize) -> Result<(), &'static str> {
    if start >= end {
        return Err("start >= end");
    }
    if end > text.len() {
        return Err("span out of bounds");
    }
    if !text.is_char_boundary(start) || !text.is_char_boundary(end) {
        return Err("span not on a character boundary");
    }
    Ok(())
}

/// Resolve overlapping mentions: the longest span wins and every span it
/// fully contains is discarded. Partial overlaps are kept. The result is
/// ordered by position, and exact duplicates (same span and key) collapse.
pub fn resolve_overlaps(mut mentions: Vec<EntityMention>) -> Vec<EntityMention> {
    mentions.sort_by(|a, b| {
        b.len()
            .cmp(&a.len())
            .then(a.start.cmp(&b.start))
            .then(a.entity_type.cmp(&b.entity_type))
    });

    let mut kept: Vec<EntityMention> = Vec::with_capacity(mentions.len());
    for mention in mentions {
        if kept.iter().any(|k| k.contains(&mention)) {
            continue;
        }
        kept.push(mention);
    }

    kept.sort_by(|a, b| a.start.cmp(&b.start).then(a.end.cmp(&b.end)));
    kept
}

/// Distinct canonical keys of a mention list
pub fn distinct_keys(mentions: &[EntityMention]) -> BTreeSet<&str> {
    mentions.iter().map(|m| m.key.as_str()).collect()
}

/// Drop a trailing parenthetical disambiguator: `"Queen (band)"` -> `"Queen"`
pub fn strip_disambiguator(title: &str) -> &str {
    let trimmed = title.trim_end();
    if trimmed.ends_with(')') {
        if let Some(open) = trimmed.rfind(" (") {
            let inner = &trimmed[open + 2..trimmed.len() - 1];
            if !inner.contains(')') {
                return trimmed[..open].trim_end();
            }
        }
    }
    trimmed
}
