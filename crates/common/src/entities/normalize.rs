//! Text normalization for entity matching
//!
//! Matching keys are built in two steps:
//! - the *surface key*: NFKC fold, optional lower-casing, surrounding
//!   punctuation stripped, whitespace collapsed
//! - the *entity key*: the surface key mapped through the alias table
//!
//! Both steps are idempotent: normalizing a key again returns it unchanged.

use crate::errors::{AppError, Result};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::info;
use unicode_normalization::UnicodeNormalization;

/// Alias -> canonical entity mapping, keyed and valued by surface keys
#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    aliases: HashMap<String, String>,
}

impl AliasTable {
    /// Load a JSON object of `"alias": "canonical"` pairs
    pub fn load(path: &Path, case_fold: bool) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| AppError::Configuration {
            message: format!("Failed to read alias table {}: {}", path.display(), e),
        })?;
        let pairs: BTreeMap<String, String> =
            serde_json::from_str(&raw).map_err(|e| AppError::Configuration {
                message: format!("Invalid alias table {}: {}", path.display(), e),
            })?;

        let table = Self::from_pairs(pairs, case_fold)?;
        info!(path = %path.display(), aliases = table.len(), "Alias table loaded");
        Ok(table)
    }

    /// Build from raw pairs, normalizing both sides and resolving chains
    /// (`a -> b`, `b -> c` becomes `a -> c`). Cycles are rejected.
    pub fn from_pairs<I, K, V>(pairs: I, case_fold: bool) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut direct: HashMap<String, String> = HashMap::new();
        for (alias, canonical) in pairs {
            let alias = surface_key(alias.as_ref(), case_fold);
            let canonical = surface_key(canonical.as_ref(), case_fold);
            if alias.is_empty() || canonical.is_empty() || alias == canonical {
                continue;
            }
            direct.insert(alias, canonical);
        }

        let mut aliases = HashMap::with_capacity(direct.len());
        for alias in direct.keys() {
            let mut current = alias;
            let mut steps = 0;
            while let Some(next) = direct.get(current) {
                current = next;
                steps += 1;
                if steps > direct.len() {
                    return Err(AppError::Configuration {
                        message: format!("Alias table contains a cycle through '{}'", alias),
                    });
                }
            }
            aliases.insert(alias.clone(), current.clone());
        }

        Ok(Self { aliases })
    }

    /// Canonical form of a surface key
    pub fn resolve<'a>(&'a self, key: &'a str) -> &'a str {
        self.aliases.get(key).map(String::as_str).unwrap_or(key)
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }
}

/// Builds matching keys for entity mentions and link anchors
#[derive(Debug, Clone)]
pub struct Normalizer {
    case_fold: bool,
    aliases: AliasTable,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(true, AliasTable::default())
    }
}

impl Normalizer {
    pub fn new(case_fold: bool, aliases: AliasTable) -> Self {
        Self { case_fold, aliases }
    }

    /// Build from entity configuration, loading the alias table if set
    pub fn from_config(config: &crate::config::EntityConfig) -> Result<Self> {
        let aliases = match &config.alias_table_path {
            Some(path) => AliasTable::load(path, config.case_fold)?,
            None => AliasTable::default(),
        };
        Ok(Self::new(config.case_fold, aliases))
    }

    /// Key before alias resolution
    pub fn surface_key(&self, text: &str) -> String {
        surface_key(text, self.case_fold)
    }

    /// Canonical matching key
    pub fn key(&self, text: &str) -> String {
        let surface = self.surface_key(text);
        self.aliases.resolve(&surface).to_string()
    }

    /// Both keys at once: (surface key, canonical key)
    pub fn keys(&self, text: &str) -> (String, String) {
        let surface = self.surface_key(text);
        let canonical = self.aliases.resolve(&surface).to_string();
        (surface, canonical)
    }
}

/// Normalize a surface form for matching.
///
/// # Examples
///
/// ```
/// use bridgehop_common::entities::normalize::surface_key;
///
/// assert_eq!(surface_key("  \"Barack   Obama\", ", true), "barack obama");
/// assert_eq!(surface_key("AT&T", true), "at&t");
/// ```
pub fn surface_key(text: &str, case_fold: bool) -> String {
    let folded: String = text.nfkc().collect();
    let folded = if case_fold {
        folded.to_lowercase().nfkc().collect()
    } else {
        folded
    };

    folded
        .trim_matches(|c: char| !c.is_alphanumeric())
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// First case-insensitive occurrence of `needle` in `haystack` that starts
/// and ends on word boundaries. Returns a byte span into `haystack`.
pub fn find_word_bounded(haystack: &str, needle: &str) -> Option<(usize, usize)> {
    find_all_word_bounded(haystack, needle, true).into_iter().next()
}

/// All non-overlapping word-bounded occurrences of `needle`, left to right
pub fn find_all_word_bounded(
    haystack: &str,
    needle: &str,
    case_insensitive: bool,
) -> Vec<(usize, usize)> {
    let needle: Vec<char> = if case_insensitive {
        needle.chars().flat_map(char::to_lowercase).collect()
    } else {
        needle.chars().collect()
    };
    if needle.is_empty() {
        return Vec::new();
    }

    let mut spans = Vec::new();
    let mut resume = 0;
    for (start, _) in haystack.char_indices() {
        if start < resume || !boundary_before(haystack, start) {
            continue;
        }
        if let Some(end) = match_at(haystack, start, &needle, case_insensitive) {
            if boundary_after(haystack, end) {
                spans.push((start, end));
                resume = end;
            }
        }
    }
    spans
}

fn match_at(haystack: &str, start: usize, needle: &[char], case_insensitive: bool) -> Option<usize> {
    let mut matched = 0;
    for (offset, c) in haystack[start..].char_indices() {
        if case_insensitive {
            for lower in c.to_lowercase() {
                if matched >= needle.len() || needle[matched] != lower {
                    return None;
                }
                matched += 1;
            }
        } else {
            if needle[matched] != c {
                return None;
            }
            matched += 1;
        }
        if matched == needle.len() {
            return Some(start + offset + c.len_utf8());
        }
    }
    None
}

fn boundary_before(text: &str, at: usize) -> bool {
    text[..at]
        .chars()
        .next_back()
        .map_or(true, |c| !c.is_alphanumeric())
}

fn boundary_after(text: &str, at: usize) -> bool {
    text[at..].chars().next().map_or(true, |c| !c.is_alphanumeric())
}
