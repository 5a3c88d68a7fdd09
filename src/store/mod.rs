// 🗄️ Master store - load / persist contract for the register
//
// Reconciliation never touches storage; it works on a MasterRegister that a
// store loaded and hands the result back for persisting. Backends differ only
// in medium.

pub mod csv_file;
pub mod sqlite;

pub use self::csv_file::CsvMasterStore;
pub use self::sqlite::SqliteMasterStore;

use crate::config::{StorageBackend, TrackerConfig};
use crate::error::{Result, TrackerError};
use crate::register::MasterRegister;
use chrono::NaiveDate;
use serde::Serialize;
use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

// ============================================================================
// STORE TRAIT
// ============================================================================

/// Audit entry for one successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunRecord {
    pub run_id: Uuid,
    pub run_date: NaiveDate,
    pub snapshot: String,
    pub fingerprint: String,
    pub added: usize,
    pub removed: usize,
    pub total_active: usize,
}

pub trait MasterStore {
    /// Load the whole register. A store that does not exist yet is empty.
    fn load(&self) -> Result<MasterRegister>;

    /// Replace the stored register atomically.
    fn persist(&mut self, register: &MasterRegister) -> Result<()>;

    /// Keep an audit row for a committed run, where the medium supports it.
    fn record_run(&mut self, _run: &RunRecord) -> Result<()> {
        Ok(())
    }

    /// Where the register lives (logging only)
    fn location(&self) -> &Path;
}

/// Open the backend named in the config.
pub fn open_store(config: &TrackerConfig) -> Result<Box<dyn MasterStore>> {
    let path = &config.paths.master;
    match config.storage.backend {
        StorageBackend::Csv => Ok(Box::new(CsvMasterStore::new(path))),
        StorageBackend::Sqlite => Ok(Box::new(SqliteMasterStore::open(path)?)),
    }
}

// ============================================================================
// LOCK FILE
// ============================================================================

/// Exclusive lock held for the duration of a run; released on drop.
#[derive(Debug)]
pub struct StoreLock {
    path: PathBuf,
}

impl StoreLock {
    pub fn acquire(path: &Path) -> Result<Self> {
        ensure_parent(path)?;
        let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(TrackerError::StoreLocked {
                    path: path.to_path_buf(),
                });
            }
            Err(e) => return Err(e.into()),
        };
        writeln!(file, "{}", std::process::id())?;
        debug!(lock = %path.display(), "lock acquired");

        Ok(StoreLock {
            path: path.to_path_buf(),
        })
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(lock = %self.path.display(), "failed to release lock: {}", e);
        }
    }
}

// ============================================================================
// STAGED WRITES
// ============================================================================

/// A file written next to its target, published by `commit`.
///
/// Dropping an uncommitted stage deletes the temporary file, so an aborted
/// run leaves the published file untouched.
#[derive(Debug)]
pub struct StagedFile {
    staged: PathBuf,
    target: PathBuf,
    committed: bool,
}

impl StagedFile {
    pub fn write(target: &Path, bytes: &[u8]) -> Result<Self> {
        ensure_parent(target)?;
        let staged = staging_path(target);
        fs::write(&staged, bytes)?;

        Ok(StagedFile {
            staged,
            target: target.to_path_buf(),
            committed: false,
        })
    }

    pub fn commit(mut self) -> Result<()> {
        fs::rename(&self.staged, &self.target)?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_file(&self.staged);
        }
    }
}

/// Stage a pretty-printed JSON artifact.
pub fn stage_json<T: Serialize>(target: &Path, value: &T) -> Result<StagedFile> {
    let mut bytes = serde_json::to_vec_pretty(value)?;
    bytes.push(b'\n');
    StagedFile::write(target, &bytes)
}

/// `daily_delta.json` -> `daily_delta.json.tmp`
pub fn staging_path(target: &Path) -> PathBuf {
    let mut name: OsString = target.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
