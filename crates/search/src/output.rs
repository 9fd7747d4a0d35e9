//! Persisted selection output
//!
//! One JSON array for the whole run, one record per question in input order.

use crate::selection::{Selection, SelectionStatus};
use bridgehop_common::errors::{AppError, Issue, Result};
use bridgehop_common::ParagraphId;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::info;

/// Selection result of one question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionRecord {
    pub question_id: String,
    /// Chains by descending fused score
    pub chains: Vec<Vec<ParagraphId>>,
    /// Fused score of each chain
    pub scores: Vec<f32>,
    pub status: SelectionStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<Issue>,
}

impl SelectionRecord {
    pub fn from_selection(question_id: impl Into<String>, selection: Selection, mut issues: Vec<Issue>) -> Self {
        issues.extend(selection.issues);
        let (chains, scores) = selection
            .chains
            .into_iter()
            .map(|chain| (chain.paragraphs, chain.score))
            .unzip();

        Self {
            question_id: question_id.into(),
            chains,
            scores,
            status: selection.status,
            issues,
        }
    }

    /// Record for a question whose pipeline did not complete
    pub fn failed(question_id: impl Into<String>, issue: Issue) -> Self {
        Self {
            question_id: question_id.into(),
            chains: Vec::new(),
            scores: Vec::new(),
            status: SelectionStatus::Failed,
            issues: vec![issue],
        }
    }
}

/// Write all records as a pretty-printed JSON array
pub fn write_records(path: &Path, records: &[SelectionRecord]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let file = File::create(path).map_err(|e| AppError::Internal {
        message: format!("Failed to create output {}: {}", path.display(), e),
    })?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, records)?;
    writer.write_all(b"\n")?;
    writer.flush()?;

    info!(path = %path.display(), records = records.len(), "Selection output written");
    Ok(())
}
