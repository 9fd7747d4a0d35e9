//! Link/NER extraction
//!
//! Recovers, for every document referenced by any question, its paragraphs
//! with their outgoing links and stored entity tags. Documents are loaded in
//! disjoint partitions, one per worker, and merged at a join barrier.

pub mod markup;

use crate::corpus::{DocumentRecord, DocumentStore};
use crate::entities::normalize::find_all_word_bounded;
use crate::errors::{AppError, Issue, Result};
use crate::metrics;
use crate::ner::RawTag;
use crate::question::Question;
use markup::{strip_links, MarkupLink};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

/// An outgoing link of a paragraph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    /// Target document id
    pub target: String,
    pub anchor: String,
    /// Byte span of the anchor in the paragraph's plain text
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone)]
pub struct ExtractedParagraph {
    pub index: usize,
    pub text: String,
    pub links: Vec<Link>,
    pub tags: Option<Vec<RawTag>>,
}

#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    pub id: String,
    pub title: String,
    pub paragraphs: Vec<ExtractedParagraph>,
}

/// Result of extraction over the referenced documents
#[derive(Debug, Default)]
pub struct Extraction {
    pub documents: BTreeMap<String, ExtractedDocument>,
    /// Referenced ids absent from the store
    pub missing: BTreeSet<String>,
    /// Link targets absent from the store (not an error)
    pub unresolved_targets: BTreeSet<String>,
    pub issues: Vec<Issue>,
}

impl Extraction {
    /// Link targets that are neither loaded nor known to be absent
    pub fn pending_targets(&self) -> Vec<String> {
        let targets: BTreeSet<&str> = self
            .documents
            .values()
            .flat_map(|d| &d.paragraphs)
            .flat_map(|p| &p.links)
            .map(|l| l.target.as_str())
            .filter(|t| {
                !self.documents.contains_key(*t)
                    && !self.missing.contains(*t)
                    && !self.unresolved_targets.contains(*t)
            })
            .collect();
        targets.into_iter().map(str::to_string).collect()
    }

    /// MissingDocument issues for the candidate documents of one question
    pub fn issues_for(&self, question: &Question) -> Vec<Issue> {
        question
            .candidate_documents
            .iter()
            .filter(|id| self.missing.contains(*id))
            .map(|id| AppError::MissingDocument { id: id.clone() }.to_issue())
            .collect()
    }
}

/// Partial result of one worker
#[derive(Default)]
struct Partition {
    documents: Vec<ExtractedDocument>,
    missing: Vec<String>,
    dropped_links: usize,
}

/// Parallel document loader and link parser
#[derive(Debug, Clone)]
pub struct LinkExtractor {
    workers: usize,
}

impl LinkExtractor {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    /// Load and parse every document referenced by `questions`.
    ///
    /// A question without candidate documents references the whole store.
    /// Store failures are fatal; missing ids are recorded as issues.
    #[instrument(skip_all, fields(questions = questions.len()))]
    pub async fn extract(
        &self,
        store: Arc<dyn DocumentStore>,
        questions: &[Question],
    ) -> Result<Extraction> {
        let ids: Vec<String> = if questions.iter().any(Question::is_open_retrieval) {
            info!("Open-retrieval question present, referencing the whole store");
            store.ids().await?
        } else {
            let referenced: BTreeSet<&String> = questions
                .iter()
                .flat_map(|q| &q.candidate_documents)
                .collect();
            referenced.into_iter().cloned().collect()
        };

        let partition = self.load(store, ids).await?;

        let mut extraction = Extraction::default();
        for id in &partition.missing {
            let err = AppError::MissingDocument { id: id.clone() };
            warn!(error = %err, "Referenced document missing, treating as empty");
            extraction.issues.push(err.to_issue());
        }
        extraction.missing = partition.missing.into_iter().collect();
        metrics::record_extraction(partition.documents.len(), extraction.missing.len());
        metrics::record_links_dropped("anchor", partition.dropped_links);

        for document in partition.documents {
            extraction.documents.insert(document.id.clone(), document);
        }

        info!(
            documents = extraction.documents.len(),
            missing = extraction.missing.len(),
            dropped_links = partition.dropped_links,
            "Extraction complete"
        );
        Ok(extraction)
    }

    /// Load link targets not yet in the extraction so hop-2 paragraphs have
    /// text. Returns the number of documents added.
    #[instrument(skip_all)]
    pub async fn expand_targets(
        &self,
        store: Arc<dyn DocumentStore>,
        extraction: &mut Extraction,
    ) -> Result<usize> {
        let pending = extraction.pending_targets();
        if pending.is_empty() {
            return Ok(0);
        }

        let partition = self.load(store, pending).await?;
        let added = partition.documents.len();
        metrics::record_links_dropped("anchor", partition.dropped_links);

        extraction.unresolved_targets.extend(partition.missing);
        for document in partition.documents {
            extraction.documents.insert(document.id.clone(), document);
        }

        info!(
            added,
            unresolved = extraction.unresolved_targets.len(),
            "Link targets expanded"
        );
        Ok(added)
    }

    /// Split `ids` into one slice per worker and load the slices concurrently
    async fn load(&self, store: Arc<dyn DocumentStore>, ids: Vec<String>) -> Result<Partition> {
        if ids.is_empty() {
            return Ok(Partition::default());
        }

        let slice_len = ids.len().div_ceil(self.workers);
        let mut tasks = JoinSet::new();
        for slice in ids.chunks(slice_len) {
            let store = Arc::clone(&store);
            let slice = slice.to_vec();
            tasks.spawn(async move { load_partition(store, slice).await });
        }

        let mut merged = Partition::default();
        while let Some(joined) = tasks.join_next().await {
            let partition = joined.map_err(|e| AppError::Internal {
                message: format!("Extraction worker failed: {}", e),
            })??;
            merged.documents.extend(partition.documents);
            merged.missing.extend(partition.missing);
            merged.dropped_links += partition.dropped_links;
        }

        // Workers finish in any order
        merged.missing.sort();
        Ok(merged)
    }
}

async fn load_partition(store: Arc<dyn DocumentStore>, ids: Vec<String>) -> Result<Partition> {
    let records = store.get_batch(&ids).await?;
    let found: HashSet<&str> = records.iter().map(|r| r.id.as_str()).collect();
    let missing: Vec<String> = ids
        .iter()
        .filter(|id| !found.contains(id.as_str()))
        .cloned()
        .collect();

    let (documents, dropped_links) = tokio::task::spawn_blocking(move || {
        let mut dropped = 0;
        let documents = records
            .into_iter()
            .map(|record| {
                let (document, d) = parse_document(record);
                dropped += d;
                document
            })
            .collect::<Vec<_>>();
        (documents, dropped)
    })
    .await
    .map_err(|e| AppError::Internal {
        message: format!("Link parser failed: {}", e),
    })?;

    debug!(
        requested = ids.len(),
        loaded = documents.len(),
        "Partition loaded"
    );
    Ok(Partition {
        documents,
        missing,
        dropped_links,
    })
}

/// Parse every paragraph of a record. Returns the document and the number of
/// links dropped.
pub fn parse_document(record: DocumentRecord) -> (ExtractedDocument, usize) {
    let mut dropped = 0;
    let mut tags = record.tags.map(|t| t.into_iter());

    let paragraphs = record
        .paragraphs
        .into_iter()
        .zip(record.paragraphs_with_links)
        .enumerate()
        .map(|(index, (text, markup))| {
            let (links, d) = extract_links(&text, &markup);
            dropped += d;
            ExtractedParagraph {
                index,
                text,
                links,
                tags: tags.as_mut().and_then(|t| t.next()),
            }
        })
        .collect();

    let document = ExtractedDocument {
        id: record.id,
        title: record.title,
        paragraphs,
    };
    (document, dropped)
}

/// Links of one paragraph with spans valid for `text`, deduplicated on
/// (target, anchor). Returns the links and the number dropped.
pub fn extract_links(text: &str, markup: &str) -> (Vec<Link>, usize) {
    let stripped = strip_links(markup);
    let mut dropped = stripped.dropped;

    let located: Vec<MarkupLink> = if stripped.text == text {
        stripped.links
    } else {
        // Stored plain text disagrees with the markup: find each anchor as a
        // whole word in the stored text, left to right
        let mut cursor = 0;
        let mut relocated = Vec::with_capacity(stripped.links.len());
        for link in stripped.links {
            let spans = find_all_word_bounded(text, &link.anchor, false);
            let found = spans
                .iter()
                .find(|(start, _)| *start >= cursor)
                .or_else(|| spans.first())
                .copied();
            match found {
                Some((start, end)) => {
                    cursor = end;
                    relocated.push(MarkupLink { start, end, ..link });
                }
                None => dropped += 1,
            }
        }
        relocated
    };

    let mut seen = HashSet::new();
    let mut links = Vec::with_capacity(located.len());
    for link in located {
        if !seen.insert((link.target.clone(), link.anchor.clone())) {
            continue;
        }
        links.push(Link {
            target: link.target,
            anchor: link.anchor,
            start: link.start,
            end: link.end,
        });
    }

    (links, dropped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::MemoryStore;
    use crate::errors::ErrorCode;

    fn doc(id: &str, text: &str, markup: &str) -> DocumentRecord {
        DocumentRecord {
            id: id.to_string(),
            url: None,
            title: id.to_string(),
            paragraphs: vec![text.to_string()],
            paragraphs_with_links: vec![markup.to_string()],
            tags: None,
        }
    }

    fn store() -> Arc<dyn DocumentStore> {
        Arc::new(
            MemoryStore::from_records(vec![
                doc(
                    "A",
                    "Barack Obama was president.",
                    r#"Barack <a href="B">Obama</a> was president."#,
                ),
                doc("B", "Obama was born in Hawaii.", r#"Obama was born in <a href="Hawaii">Hawaii</a>."#),
                doc("Hawaii", "Hawaii is a state.", "Hawaii is a state."),
            ])
            .unwrap(),
        )
    }

    #[test]
    fn test_relocates_anchor_when_text_differs() {
        // Markup has an extra space the stored text does not
        let (links, dropped) = extract_links(
            "Obama met Biden.",
            r#"<a href="Obama">Obama</a>  met <a href="Joe%20Biden">Biden</a>. <a href="X">ghost</a>"#,
        );
        assert_eq!(dropped, 1);
        assert_eq!(links.len(), 2);
        assert_eq!(links[1].target, "Joe Biden");
        assert_eq!(&"Obama met Biden."[links[1].start..links[1].end], "Biden");
    }

    #[test]
    fn test_relocation_matches_whole_words() {
        let text = "Obamacare passed under Obama.";
        let (links, dropped) = extract_links(
            text,
            r#"Obamacare passed under <a href="Barack%20Obama">Obama</a> ."#,
        );
        assert_eq!(dropped, 0);
        assert_eq!(links[0].start, text.rfind("Obama").unwrap());
        assert_eq!(&text[links[0].start..links[0].end], "Obama");
    }

    #[test]
    fn test_escaped_anchor_matches_stored_text() {
        let text = "AT&T is a carrier.";
        let (links, dropped) = extract_links(text, r#"<a href="AT%26T">AT&amp;T</a> is a carrier."#);
        assert_eq!(dropped, 0);
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].anchor, "AT&T");
        assert_eq!(&text[links[0].start..links[0].end], "AT&T");
    }

    #[test]
    fn test_duplicate_links_removed() {
        let text = "Obama and Obama";
        let (links, _) = extract_links(
            text,
            r#"<a href="Obama">Obama</a> and <a href="Obama">Obama</a>"#,
        );
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].start, 0);
    }

    #[tokio::test]
    async fn test_extract_records_missing_documents() {
        let questions = vec![
            Question::new("q1", "Where was Obama born?", ["A", "Nowhere"]),
            Question::new("q2", "Who?", ["A"]),
        ];
        let extractor = LinkExtractor::new(3);
        let extraction = extractor.extract(store(), &questions).await.unwrap();

        assert_eq!(extraction.documents.len(), 1);
        assert!(extraction.missing.contains("Nowhere"));
        assert_eq!(extraction.issues.len(), 1);
        assert_eq!(extraction.issues[0].code, ErrorCode::MissingDocument);
        assert_eq!(extraction.issues_for(&questions[0]).len(), 1);
        assert!(extraction.issues_for(&questions[1]).is_empty());

        let link = &extraction.documents["A"].paragraphs[0].links[0];
        assert_eq!(link.target, "B");
        assert_eq!(link.anchor, "Obama");
    }

    #[tokio::test]
    async fn test_expand_targets_one_level() {
        let questions = vec![Question::new("q1", "Where was Obama born?", ["A"])];
        let extractor = LinkExtractor::new(2);
        let s = store();
        let mut extraction = extractor.extract(Arc::clone(&s), &questions).await.unwrap();

        let added = extractor.expand_targets(s, &mut extraction).await.unwrap();
        assert_eq!(added, 1);
        assert!(extraction.documents.contains_key("B"));
        // B links on to Hawaii, which is only loaded by a further expansion
        assert_eq!(extraction.pending_targets(), vec!["Hawaii"]);
    }

    #[tokio::test]
    async fn test_open_retrieval_loads_whole_store() {
        let questions = vec![Question::new("q1", "Where was Obama born?", Vec::<String>::new())];
        let extraction = LinkExtractor::new(4).extract(store(), &questions).await.unwrap();
        assert_eq!(extraction.documents.len(), 3);
        assert!(extraction.issues.is_empty());
    }
}
