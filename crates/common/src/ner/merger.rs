//! Entity-tag merging
//!
//! Turns raw tagger output for a question and its candidate paragraphs into
//! sanitized [`EntityMention`] sets keyed by paragraph id. Besides tagger
//! spans, two derived mention kinds are added:
//! - `Title`: a candidate document title found in the text
//! - `Context`: a paragraph entity string found in the question

use super::{RawTag, Tagger};
use crate::config::EntityConfig;
use crate::corpus::ParagraphId;
use crate::entities::normalize::find_all_word_bounded;
use crate::entities::{
    check_span, resolve_overlaps, strip_disambiguator, EntityMention, EntityType, Normalizer,
    TypeFilter,
};
use crate::errors::{AppError, Issue};
use crate::metrics;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// One candidate paragraph to merge
#[derive(Debug, Clone)]
pub struct ParagraphInput<'a> {
    pub id: ParagraphId,
    pub text: &'a str,
    /// Tags stored at ingestion; the tagger is called when absent
    pub stored_tags: Option<&'a [RawTag]>,
}

/// Merged entity mentions for one question
#[derive(Debug, Clone, Default)]
pub struct MergedTags {
    pub question: Vec<EntityMention>,
    pub paragraphs: BTreeMap<ParagraphId, Vec<EntityMention>>,
    pub issues: Vec<Issue>,
}

impl MergedTags {
    /// Mentions of one paragraph (empty when it was never merged)
    pub fn paragraph(&self, id: &ParagraphId) -> &[EntityMention] {
        self.paragraphs.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Distinct canonical keys of the question mentions
    pub fn question_keys(&self) -> BTreeSet<&str> {
        crate::entities::distinct_keys(&self.question)
    }
}

/// Normalizes tagger output into mention sets
#[derive(Debug, Clone)]
pub struct EntityTagMerger {
    normalizer: Arc<Normalizer>,
    filter: TypeFilter,
    min_chars: usize,
}

impl EntityTagMerger {
    pub fn new(normalizer: Arc<Normalizer>, config: &EntityConfig) -> Self {
        Self {
            normalizer,
            filter: TypeFilter::new(&config.allowed_types),
            min_chars: config.min_mention_chars,
        }
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    /// Merge tags for a question and its candidate paragraphs.
    ///
    /// Never fails: malformed spans and tagger errors become issues.
    pub async fn merge(
        &self,
        question: &str,
        paragraphs: &[ParagraphInput<'_>],
        titles: &[String],
        tagger: &dyn Tagger,
    ) -> MergedTags {
        let mut issues = Vec::new();

        let paragraph_tags = self.paragraph_tags(paragraphs, tagger, &mut issues).await;
        let titles = self.prepare_titles(titles);

        let mut merged = BTreeMap::new();
        for (input, tags) in paragraphs.iter().zip(paragraph_tags) {
            let subject = input.id.to_string();
            let mut mentions = self.from_tags(&subject, input.text, &tags, &mut issues);
            mentions.extend(self.title_mentions(input.text, &titles));
            merged.insert(input.id.clone(), resolve_overlaps(mentions));
        }

        let question_tags = match tagger.tag(question).await {
            Ok(tags) => {
                metrics::record_tagger_call(tagger.name(), true);
                tags
            }
            Err(e) => {
                metrics::record_tagger_call(tagger.name(), false);
                warn!(error = %e, "Question tagging failed");
                issues.push(e.to_issue());
                Vec::new()
            }
        };

        let mut question_mentions = self.from_tags("question", question, &question_tags, &mut issues);
        question_mentions.extend(self.title_mentions(question, &titles));
        question_mentions.extend(self.context_mentions(question, merged.values()));
        let question_mentions = resolve_overlaps(question_mentions);

        debug!(
            question_mentions = question_mentions.len(),
            paragraphs = merged.len(),
            issues = issues.len(),
            "Entity tags merged"
        );

        MergedTags {
            question: question_mentions,
            paragraphs: merged,
            issues,
        }
    }

    /// Stored tags where present, one batched tagger call for the rest
    async fn paragraph_tags(
        &self,
        paragraphs: &[ParagraphInput<'_>],
        tagger: &dyn Tagger,
        issues: &mut Vec<Issue>,
    ) -> Vec<Vec<RawTag>> {
        let untagged: Vec<usize> = paragraphs
            .iter()
            .enumerate()
            .filter(|(_, p)| p.stored_tags.is_none())
            .map(|(i, _)| i)
            .collect();

        let mut fresh: BTreeMap<usize, Vec<RawTag>> = BTreeMap::new();
        if !untagged.is_empty() {
            let texts: Vec<String> = untagged
                .iter()
                .map(|&i| paragraphs[i].text.to_string())
                .collect();
            match tagger.tag_batch(&texts).await {
                Ok(tagged) if tagged.len() == texts.len() => {
                    metrics::record_tagger_call(tagger.name(), true);
                    fresh.extend(untagged.iter().copied().zip(tagged));
                }
                Ok(tagged) => {
                    metrics::record_tagger_call(tagger.name(), false);
                    let err = AppError::TaggerUnavailable {
                        message: format!(
                            "{} returned {} tag lists for {} paragraphs",
                            tagger.name(),
                            tagged.len(),
                            texts.len()
                        ),
                    };
                    warn!(error = %err, "Paragraph tagging failed");
                    issues.push(err.to_issue());
                }
                Err(e) => {
                    metrics::record_tagger_call(tagger.name(), false);
                    warn!(error = %e, "Paragraph tagging failed");
                    issues.push(e.to_issue());
                }
            }
        }

        paragraphs
            .iter()
            .enumerate()
            .map(|(i, p)| match p.stored_tags {
                Some(tags) => tags.to_vec(),
                None => fresh.remove(&i).unwrap_or_default(),
            })
            .collect()
    }

    /// Validate and normalize raw tags of one text
    pub fn from_tags(
        &self,
        subject: &str,
        text: &str,
        tags: &[RawTag],
        issues: &mut Vec<Issue>,
    ) -> Vec<EntityMention> {
        let mut mentions = Vec::with_capacity(tags.len());
        for tag in tags {
            if let Err(reason) = check_span(text, tag.start, tag.end) {
                let err = AppError::MalformedMention {
                    subject: subject.to_string(),
                    start: tag.start,
                    end: tag.end,
                    reason: reason.to_string(),
                };
                warn!(error = %err, label = %tag.label, "Dropping malformed mention");
                metrics::record_malformed_mention(subject_kind(subject));
                issues.push(err.to_issue());
                continue;
            }

            let entity_type = EntityType::from_label(&tag.label);
            if !self.filter.allows(entity_type) {
                continue;
            }

            if let Some(mention) = EntityMention::new(
                text,
                tag.start,
                tag.end,
                entity_type,
                None,
                &self.normalizer,
                self.min_chars,
            ) {
                mentions.push(mention);
            }
        }
        mentions
    }

    /// Titles with their disambiguators stripped, deduplicated, longest first
    fn prepare_titles(&self, titles: &[String]) -> Vec<String> {
        let mut prepared: Vec<String> = titles
            .iter()
            .map(|t| strip_disambiguator(t).to_string())
            .filter(|t| !t.is_empty())
            .collect();
        prepared.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
        prepared.dedup();
        prepared
    }

    fn title_mentions(&self, text: &str, titles: &[String]) -> Vec<EntityMention> {
        let mut mentions = Vec::new();
        for title in titles {
            for (start, end) in find_all_word_bounded(text, title, true) {
                if let Some(mention) = EntityMention::new(
                    text,
                    start,
                    end,
                    EntityType::Title,
                    Some(title),
                    &self.normalizer,
                    self.min_chars,
                ) {
                    mentions.push(mention);
                }
            }
        }
        mentions
    }

    /// Paragraph entity strings that also occur in the question
    fn context_mentions<'a, I>(&self, question: &str, paragraphs: I) -> Vec<EntityMention>
    where
        I: IntoIterator<Item = &'a Vec<EntityMention>>,
    {
        let surfaces: BTreeSet<&str> = paragraphs
            .into_iter()
            .flatten()
            .filter(|m| !matches!(m.entity_type, EntityType::Title | EntityType::Context))
            .map(|m| m.surface.as_str())
            .collect();

        let mut mentions = Vec::new();
        for surface in surfaces {
            for (start, end) in find_all_word_bounded(question, surface, true) {
                if let Some(mention) = EntityMention::new(
                    question,
                    start,
                    end,
                    EntityType::Context,
                    None,
                    &self.normalizer,
                    self.min_chars,
                ) {
                    mentions.push(mention);
                }
            }
        }
        mentions
    }
}

fn subject_kind(subject: &str) -> &'static str {
    if subject == "question" {
        "question"
    } else {
        "paragraph"
    }
}
