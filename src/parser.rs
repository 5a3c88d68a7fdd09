// 📥 Snapshot Parser - raw register rows as published
//
// Reads the day's CSV into untouched free-text rows. No cleaning happens here;
// that is the normalizer's job. Rows the CSV layer cannot decode are kept as
// row-level defects so the run can count them instead of failing.

use crate::error::{Result, TrackerError};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Header names used by the published register.
pub const COL_ORGANISATION: &str = "Organisation Name";
pub const COL_CITY: &str = "Town/City";
pub const COL_COUNTY: &str = "County";
pub const COL_TYPE_RATING: &str = "Type & Rating";
pub const COL_ROUTE: &str = "Route";

// ============================================================================
// CORE TYPES
// ============================================================================

/// RawSponsorRow - one row exactly as the register published it
///
/// Missing columns deserialize as empty strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawSponsorRow {
    #[serde(rename = "Organisation Name", default)]
    pub organisation_name: String,

    #[serde(rename = "Town/City", default)]
    pub city: String,

    #[serde(rename = "County", default)]
    pub county: String,

    #[serde(rename = "Type & Rating", default)]
    pub type_and_rating: String,

    #[serde(rename = "Route", default)]
    pub route: String,

    /// Line in the source file (1-based, header is line 1)
    #[serde(skip)]
    pub line_number: usize,
}

impl RawSponsorRow {
    pub fn new(organisation_name: &str, city: &str, route: &str) -> Self {
        RawSponsorRow {
            organisation_name: organisation_name.to_string(),
            city: city.to_string(),
            route: route.to_string(),
            ..Default::default()
        }
    }

    /// Builder pattern: add county
    pub fn with_county(mut self, county: &str) -> Self {
        self.county = county.to_string();
        self
    }

    /// Builder pattern: add the combined type & rating field
    pub fn with_type_and_rating(mut self, type_and_rating: &str) -> Self {
        self.type_and_rating = type_and_rating.to_string();
        self
    }

    pub fn at_line(mut self, line_number: usize) -> Self {
        self.line_number = line_number;
        self
    }
}

/// RawSnapshot - output of a parser
#[derive(Debug, Default)]
pub struct RawSnapshot {
    /// Where the rows came from (file name or label)
    pub source: String,

    /// SHA-256 of the raw bytes, hex encoded
    pub fingerprint: String,

    pub rows: Vec<RawSponsorRow>,

    /// Rows the CSV layer could not decode (always `MalformedRow`)
    pub unreadable: Vec<TrackerError>,
}

impl RawSnapshot {
    /// Snapshot built from rows already in memory (tests, other collaborators).
    pub fn from_rows(source: &str, rows: Vec<RawSponsorRow>) -> Self {
        RawSnapshot {
            source: source.to_string(),
            fingerprint: String::new(),
            rows,
            unreadable: Vec::new(),
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len() + self.unreadable.len()
    }
}

// ============================================================================
// PARSER TRAIT
// ============================================================================

/// SnapshotParser - turns a fetched file into raw rows
///
/// The fetch collaborator owns format and encoding; a new format means a new
/// implementation, nothing downstream changes.
pub trait SnapshotParser: Send + Sync {
    fn parse(&self, file_path: &Path) -> Result<RawSnapshot>;
}

// ============================================================================
// CSV PARSER
// ============================================================================

#[derive(Debug, Default, Clone)]
pub struct CsvSnapshotParser;

impl CsvSnapshotParser {
    pub fn new() -> Self {
        CsvSnapshotParser
    }

    /// Parse CSV bytes already in memory.
    pub fn parse_bytes(&self, bytes: &[u8], source: &str) -> Result<RawSnapshot> {
        let fingerprint = fingerprint(bytes);
        let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);

        let mut rdr = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::Headers)
            .from_reader(body);

        let headers = rdr.headers()?.clone();
        for expected in [COL_ORGANISATION, COL_CITY, COL_COUNTY, COL_TYPE_RATING, COL_ROUTE] {
            if !headers.iter().any(|h| h == expected) {
                warn!(column = expected, source, "snapshot is missing a column, reading it as empty");
            }
        }

        let mut rows = Vec::new();
        let mut unreadable = Vec::new();

        for result in rdr.records() {
            let record = match result {
                Ok(record) => record,
                Err(e) if e.is_io_error() => return Err(e.into()),
                Err(e) => {
                    let line = e.position().map(|p| p.line() as usize).unwrap_or(0);
                    unreadable.push(TrackerError::MalformedRow {
                        line,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            let line = record.position().map(|p| p.line() as usize).unwrap_or(0);
            match record.deserialize::<RawSponsorRow>(Some(&headers)) {
                Ok(row) => rows.push(row.at_line(line)),
                Err(e) => unreadable.push(TrackerError::MalformedRow {
                    line,
                    reason: e.to_string(),
                }),
            }
        }

        debug!(
            source,
            rows = rows.len(),
            unreadable = unreadable.len(),
            "parsed snapshot"
        );

        Ok(RawSnapshot {
            source: source.to_string(),
            fingerprint,
            rows,
            unreadable,
        })
    }
}

impl SnapshotParser for CsvSnapshotParser {
    fn parse(&self, file_path: &Path) -> Result<RawSnapshot> {
        let bytes = fs::read(file_path)?;
        let source = file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| file_path.display().to_string());
        self.parse_bytes(&bytes, &source)
    }
}

// ============================================================================
// HELPERS
// ============================================================================

/// Hex SHA-256 of the raw snapshot bytes.
pub fn fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Extract the publication date from a file name such as
/// `2026-01-15_-_Worker_and_Temporary_Worker.csv`.
pub fn run_date_from_filename(file_path: &Path) -> Option<NaiveDate> {
    let name = file_path.file_name()?.to_str()?;
    let prefix = name.get(..10)?;
    NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok()
}

// ============================================================================
// TESTS
// ============================================================================
