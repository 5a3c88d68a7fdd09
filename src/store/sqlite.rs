// 🗄️ SQLite master register (WAL mode)
//
// The sponsors table is rewritten inside one transaction per run, so readers
// see either the old register or the new one. A runs table keeps one audit row
// per committed run.

use super::{MasterStore, RunRecord};
use crate::error::{Result, TrackerError};
use crate::normalize::{IdentityKey, SponsorAttributes};
use crate::register::{MasterRegister, SponsorRecord};
use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // ==========================================================================
    // Sponsors Table (one row per logical instance, insertion order kept)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS sponsors (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            organisation_name TEXT NOT NULL,
            city TEXT NOT NULL,
            county TEXT NOT NULL,
            type_and_rating TEXT NOT NULL,
            route TEXT NOT NULL,
            first_seen TEXT NOT NULL,
            last_updated TEXT NOT NULL,
            removed_date TEXT
        )",
        [],
    )?;

    // ==========================================================================
    // Runs Table (audit trail)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id TEXT UNIQUE NOT NULL,
            run_date TEXT NOT NULL,
            snapshot TEXT NOT NULL,
            fingerprint TEXT NOT NULL,
            added INTEGER NOT NULL,
            removed INTEGER NOT NULL,
            total_active INTEGER NOT NULL,
            recorded_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_sponsors_key ON sponsors(organisation_name, city)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_runs_date ON runs(run_date)",
        [],
    )?;

    Ok(())
}

/// A sponsors row before date parsing.
struct StoredRow {
    organisation_name: String,
    city: String,
    county: String,
    type_and_rating: String,
    route: String,
    first_seen: String,
    last_updated: String,
    removed_date: Option<String>,
}

pub struct SqliteMasterStore {
    conn: Connection,
    path: PathBuf,
}

impl SqliteMasterStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        setup_database(&conn)?;

        Ok(SqliteMasterStore {
            conn,
            path: path.to_path_buf(),
        })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        setup_database(&conn)?;

        Ok(SqliteMasterStore {
            conn,
            path: PathBuf::from(":memory:"),
        })
    }

    pub fn run_count(&self) -> Result<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM runs", [], |row| row.get(0))?;
        Ok(count)
    }

    fn parse_date(&self, value: &str, column: &str) -> Result<NaiveDate> {
        NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|e| {
            TrackerError::corrupt_master(&self.path, format!("bad {} '{}': {}", column, value, e))
        })
    }

    fn record_from_row(&self, row: StoredRow) -> Result<SponsorRecord> {
        let removed_date = match row.removed_date.as_deref() {
            Some(value) if !value.is_empty() => Some(self.parse_date(value, "removed_date")?),
            _ => None,
        };

        Ok(SponsorRecord {
            key: IdentityKey::normalized(&row.organisation_name, &row.city),
            attributes: SponsorAttributes::new(&row.county, &row.type_and_rating, &row.route),
            first_seen: self.parse_date(&row.first_seen, "first_seen")?,
            last_updated: self.parse_date(&row.last_updated, "last_updated")?,
            removed_date,
        })
    }
}

impl MasterStore for SqliteMasterStore {
    fn load(&self) -> Result<MasterRegister> {
        let mut stmt = self.conn.prepare(
            "SELECT organisation_name, city, county, type_and_rating, route,
                    first_seen, last_updated, removed_date
             FROM sponsors
             ORDER BY id",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok(StoredRow {
                    organisation_name: row.get(0)?,
                    city: row.get(1)?,
                    county: row.get(2)?,
                    type_and_rating: row.get(3)?,
                    route: row.get(4)?,
                    first_seen: row.get(5)?,
                    last_updated: row.get(6)?,
                    removed_date: row.get(7)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let records = rows
            .into_iter()
            .map(|row| self.record_from_row(row))
            .collect::<Result<Vec<_>>>()?;

        let register = MasterRegister::from_records(records)
            .map_err(|reason| TrackerError::corrupt_master(&self.path, reason))?;
        debug!(records = register.len(), "master register loaded from sqlite");
        Ok(register)
    }

    fn persist(&mut self, register: &MasterRegister) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM sponsors", [])?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO sponsors (
                    organisation_name, city, county, type_and_rating, route,
                    first_seen, last_updated, removed_date
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            for record in register.records() {
                insert.execute(params![
                    record.key.organisation,
                    record.key.city,
                    record.attributes.county,
                    record.attributes.type_and_rating,
                    record.attributes.route,
                    record.first_seen.format(DATE_FORMAT).to_string(),
                    record.last_updated.format(DATE_FORMAT).to_string(),
                    record.removed_date.map(|d| d.format(DATE_FORMAT).to_string()),
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn record_run(&mut self, run: &RunRecord) -> Result<()> {
        self.conn.execute(
            "INSERT INTO runs (
                run_id, run_date, snapshot, fingerprint, added, removed, total_active, recorded_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                run.run_id.to_string(),
                run.run_date.format(DATE_FORMAT).to_string(),
                run.snapshot,
                run.fingerprint,
                run.added as i64,
                run.removed as i64,
                run.total_active as i64,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn location(&self) -> &Path {
        &self.path
    }
}

// ============================================================================
// TESTS
// ============================================================================
