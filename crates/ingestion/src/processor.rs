//! Ingestion processor
//!
//! Core logic for building the document store: read dump files in
//! parallel, tag paragraphs with the configured tagger, and insert the
//! records in batches.

use crate::errors::IngestionError;
use crate::reader::{dump_files, read_dump};
use bridgehop_common::config::StoreConfig;
use bridgehop_common::db::{DbPool, DocumentRepository};
use bridgehop_common::metrics;
use bridgehop_common::ner::{RawTag, Tagger};
use bridgehop_common::DocumentRecord;
use std::ops::AddAssign;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

/// Counts for one ingestion run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestionSummary {
    pub files: usize,
    pub ingested: u64,
    pub empty: usize,
    pub rejected: usize,
    pub tagged_documents: usize,
    pub tagger_failures: usize,
}

impl AddAssign for IngestionSummary {
    fn add_assign(&mut self, other: Self) {
        self.files += other.files;
        self.ingested += other.ingested;
        self.empty += other.empty;
        self.rejected += other.rejected;
        self.tagged_documents += other.tagged_documents;
        self.tagger_failures += other.tagger_failures;
    }
}

/// Ingestion processor
#[derive(Clone)]
pub struct IngestionProcessor {
    repository: DocumentRepository,
    /// `None` stores documents untagged; they are tagged at query time
    tagger: Option<Arc<dyn Tagger>>,
    tag_batch_size: usize,
    insert_batch_size: usize,
    workers: usize,
}

impl IngestionProcessor {
    pub fn new(
        repository: DocumentRepository,
        tagger: Option<Arc<dyn Tagger>>,
        tag_batch_size: usize,
        insert_batch_size: usize,
        workers: usize,
    ) -> Self {
        Self {
            repository,
            tagger,
            tag_batch_size: tag_batch_size.max(1),
            insert_batch_size: insert_batch_size.max(1),
            workers: workers.max(1),
        }
    }

    /// Open a fresh writable store with its schema in place.
    ///
    /// An existing store file is an error unless `overwrite` is set, in
    /// which case it is removed first.
    pub async fn prepare_store(
        config: &StoreConfig,
        overwrite: bool,
    ) -> Result<DocumentRepository, IngestionError> {
        if config.path.exists() {
            if !overwrite {
                return Err(IngestionError::StoreExists {
                    path: config.path.display().to_string(),
                });
            }
            warn!(path = %config.path.display(), "Removing existing document store");
            std::fs::remove_file(&config.path)?;
        }
        if let Some(parent) = config.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let pool = DbPool::open(config, false).await?;
        let repository = DocumentRepository::new(pool, config.lookup_batch_size);
        repository.create_schema().await?;
        Ok(repository)
    }

    /// Ingest every dump file under `data_path`, one worker per file
    #[instrument(skip(self), fields(path = %data_path.display()))]
    pub async fn ingest(&self, data_path: &Path) -> Result<IngestionSummary, IngestionError> {
        let files = dump_files(data_path)?;
        info!(files = files.len(), workers = self.workers, "Starting ingestion");

        let permits = Arc::new(Semaphore::new(self.workers));
        let mut tasks = JoinSet::new();
        for file in files {
            let processor = self.clone();
            let permits = Arc::clone(&permits);
            tasks.spawn(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|e| IngestionError::Worker(e.to_string()))?;
                processor.ingest_file(file).await
            });
        }

        let mut summary = IngestionSummary::default();
        while let Some(joined) = tasks.join_next().await {
            summary += joined.map_err(|e| IngestionError::Worker(e.to_string()))??;
        }

        metrics::record_ingestion(summary.ingested as usize, summary.rejected);
        info!(
            files = summary.files,
            ingested = summary.ingested,
            empty = summary.empty,
            rejected = summary.rejected,
            tagged = summary.tagged_documents,
            tagger_failures = summary.tagger_failures,
            "Ingestion complete"
        );
        Ok(summary)
    }

    async fn ingest_file(&self, path: PathBuf) -> Result<IngestionSummary, IngestionError> {
        let read_path = path.clone();
        let dump = tokio::task::spawn_blocking(move || read_dump(&read_path))
            .await
            .map_err(|e| IngestionError::Worker(e.to_string()))??;

        let mut records = dump.records;
        let (tagged_documents, tagger_failures) = self.tag_documents(&mut records).await;

        let mut ingested = 0;
        for batch in chunked(records, self.insert_batch_size) {
            ingested += self.repository.insert_documents(batch).await?;
        }

        debug!(path = %path.display(), ingested, "Dump file ingested");
        Ok(IngestionSummary {
            files: 1,
            ingested,
            empty: dump.empty,
            rejected: dump.rejected,
            tagged_documents,
            tagger_failures,
        })
    }

    /// Tag every paragraph of records without stored tags, in batches.
    ///
    /// A document is tagged only when all of its paragraphs were; a failed
    /// batch leaves its documents untagged. Returns (tagged, failed batches).
    async fn tag_documents(&self, records: &mut [DocumentRecord]) -> (usize, usize) {
        let Some(tagger) = &self.tagger else {
            return (0, 0);
        };

        let mut owners = Vec::new();
        let mut texts = Vec::new();
        for (doc, record) in records.iter().enumerate() {
            if record.tags.is_some() {
                continue;
            }
            for paragraph in &record.paragraphs {
                owners.push(doc);
                texts.push(paragraph.clone());
            }
        }

        let mut tags: Vec<Option<Vec<RawTag>>> = vec![None; texts.len()];
        let mut failures = 0;
        for (batch_no, batch) in texts.chunks(self.tag_batch_size).enumerate() {
            let offset = batch_no * self.tag_batch_size;
            match tagger.tag_batch(batch).await {
                Ok(tagged) if tagged.len() == batch.len() => {
                    metrics::record_tagger_call(tagger.name(), true);
                    for (slot, paragraph_tags) in tags[offset..].iter_mut().zip(tagged) {
                        *slot = Some(paragraph_tags);
                    }
                }
                Ok(tagged) => {
                    metrics::record_tagger_call(tagger.name(), false);
                    warn!(
                        expected = batch.len(),
                        received = tagged.len(),
                        "Tagger returned a short batch, leaving paragraphs untagged"
                    );
                    failures += 1;
                }
                Err(e) => {
                    metrics::record_tagger_call(tagger.name(), false);
                    warn!(error = %e, "Tagging batch failed, leaving paragraphs untagged");
                    failures += 1;
                }
            }
        }

        let mut per_document: Vec<Vec<Option<Vec<RawTag>>>> = vec![Vec::new(); records.len()];
        for (doc, paragraph_tags) in owners.into_iter().zip(tags) {
            per_document[doc].push(paragraph_tags);
        }

        let mut tagged = 0;
        for (record, paragraph_tags) in records.iter_mut().zip(per_document) {
            if record.tags.is_some() || paragraph_tags.is_empty() {
                continue;
            }
            if let Some(all) = paragraph_tags.into_iter().collect::<Option<Vec<_>>>() {
                record.tags = Some(all);
                tagged += 1;
            }
        }

        (tagged, failures)
    }
}

/// Split `items` into owned batches of at most `size`
fn chunked<T>(mut items: Vec<T>, size: usize) -> Vec<Vec<T>> {
    let mut batches = Vec::with_capacity(items.len().div_ceil(size));
    while items.len() > size {
        let rest = items.split_off(size);
        batches.push(items);
        items = rest;
    }
    if !items.is_empty() {
        batches.push(items);
    }
    batches
}
