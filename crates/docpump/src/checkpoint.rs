//! Durable progress checkpoints.
//!
//! One JSON snapshot per run, overwritten in full on every update. The
//! record is a snapshot, not a log: last writer wins, and concurrent runs
//! sharing a path will race (documented limitation). Persistence failures
//! must never fail the run; the pump logs and absorbs them.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PumpError, Result};

/// Progress state recorded in a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CheckpointStatus {
    /// A page is being processed.
    InProgress,

    /// The source was exhausted and every write settled.
    Complete,

    /// The run stopped on a fatal failure.
    Error,
}

/// Snapshot of run progress, persisted after each page.
///
/// The `offset` field always carries the cumulative count of successfully
/// written documents at the time of the update, one consistent unit for
/// every status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointRecord {
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,

    /// Logical name of the source, resolved once per run.
    #[serde(rename = "indexName")]
    pub index_name: String,

    /// Run status at the time of the update.
    pub status: CheckpointStatus,

    /// Cumulative successfully-written document count.
    pub offset: u64,
}

impl CheckpointRecord {
    /// Read a checkpoint back from disk.
    ///
    /// There is no automatic resume: a caller that wants to continue an
    /// interrupted run reads the record and re-invokes with its progress.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Writes progress snapshots to a fixed path.
pub struct CheckpointStore {
    path: PathBuf,
    index_name: String,
}

impl CheckpointStore {
    /// Create a store writing to `path`, deriving the source identifier
    /// from the input descriptor once up front.
    pub fn new(path: PathBuf, input: &str) -> Self {
        Self {
            path,
            index_name: source_identifier(input),
        }
    }

    /// The resolved source identifier recorded in every snapshot.
    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    /// Overwrite the checkpoint file with a fresh snapshot.
    ///
    /// Errors are returned for observability but the caller is expected
    /// to absorb them: checkpointing is best-effort by contract.
    pub fn update(&self, offset: u64, status: CheckpointStatus) -> Result<CheckpointRecord> {
        let record = CheckpointRecord {
            timestamp: Utc::now().timestamp_millis(),
            index_name: self.index_name.clone(),
            status,
            offset,
        };

        let content = serde_json::to_string_pretty(&record)?;
        std::fs::write(&self.path, content).map_err(|err| {
            PumpError::Checkpoint(format!(
                "failed to write {}: {}",
                self.path.display(),
                err
            ))
        })?;

        debug!(path = %self.path.display(), ?status, offset, "checkpoint updated");
        Ok(record)
    }
}

/// Resolve the logical source name from an input descriptor.
///
/// File-like inputs use the file basename without extension; URL-like
/// inputs use the first path segment (the index name); anything else is
/// taken verbatim.
fn source_identifier(input: &str) -> String {
    let name = if input.starts_with("http://") || input.starts_with("https://") {
        let without_scheme = input.split_once("://").map(|(_, rest)| rest).unwrap_or(input);
        let path = without_scheme.split(['?', '#']).next().unwrap_or("");
        path.split('/')
            .skip(1)
            .find(|segment| !segment.is_empty())
            .unwrap_or("")
            .to_string()
    } else {
        let basename = input.rsplit('/').next().unwrap_or(input);
        match basename.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem.to_string(),
            _ => basename.to_string(),
        }
    };

    if name.is_empty() {
        "unknown".to_string()
    } else {
        name
    }
}
