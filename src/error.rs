// ❗ Error taxonomy for tracker runs
//
// Row-level defects (MalformedRow) are recovered locally by the normalizer and
// only surface as counts. Every other variant aborts the run before anything
// persisted is touched.

use chrono::NaiveDate;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("Malformed row at line {line}: {reason}")]
    MalformedRow { line: usize, reason: String },

    #[error("Snapshot contains no usable rows ({dropped} dropped); refusing to reconcile")]
    EmptySnapshot { dropped: usize },

    #[error("History is out of order: run date {run_date} precedes last recorded date {last_date}")]
    OutOfOrderHistory {
        run_date: NaiveDate,
        last_date: NaiveDate,
    },

    #[error("Master store at {path} is corrupt: {reason}")]
    CorruptMasterStore { path: PathBuf, reason: String },

    #[error("Run date {run_date} precedes latest date {latest} already in the master register")]
    StaleRunDate {
        run_date: NaiveDate,
        latest: NaiveDate,
    },

    #[error("Artifact {path} is corrupt: {reason}")]
    CorruptArtifact { path: PathBuf, reason: String },

    #[error("Master store is locked by another run ({path})")]
    StoreLocked { path: PathBuf },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl TrackerError {
    pub fn corrupt_master(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        TrackerError::CorruptMasterStore {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// True for defects that only drop a single row.
    pub fn is_row_level(&self) -> bool {
        matches!(self, TrackerError::MalformedRow { .. })
    }
}

pub type Result<T> = std::result::Result<T, TrackerError>;
