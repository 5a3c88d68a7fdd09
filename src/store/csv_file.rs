// 📄 Flat-file master register
//
// Columns: Organisation Name, Town/City, County, Type & Rating, Route,
// first_seen, last_updated, removed_date. Dates are ISO; an empty removed_date
// means active. Unknown extra columns are ignored on load.

use super::{MasterStore, StagedFile};
use crate::error::{Result, TrackerError};
use crate::normalize::{IdentityKey, SponsorAttributes};
use crate::register::{MasterRegister, SponsorRecord};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const MASTER_HEADERS: [&str; 8] = [
    "Organisation Name",
    "Town/City",
    "County",
    "Type & Rating",
    "Route",
    "first_seen",
    "last_updated",
    "removed_date",
];

/// One line of the master file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct MasterRow {
    #[serde(rename = "Organisation Name")]
    organisation_name: String,

    #[serde(rename = "Town/City", default)]
    city: String,

    #[serde(rename = "County", default)]
    county: String,

    #[serde(rename = "Type & Rating", default)]
    type_and_rating: String,

    #[serde(rename = "Route", default)]
    route: String,

    first_seen: NaiveDate,
    last_updated: NaiveDate,

    #[serde(default)]
    removed_date: Option<NaiveDate>,
}

impl From<&SponsorRecord> for MasterRow {
    fn from(record: &SponsorRecord) -> Self {
        MasterRow {
            organisation_name: record.key.organisation.clone(),
            city: record.key.city.clone(),
            county: record.attributes.county.clone(),
            type_and_rating: record.attributes.type_and_rating.clone(),
            route: record.attributes.route.clone(),
            first_seen: record.first_seen,
            last_updated: record.last_updated,
            removed_date: record.removed_date,
        }
    }
}

impl MasterRow {
    fn into_record(self) -> SponsorRecord {
        SponsorRecord {
            key: IdentityKey::normalized(&self.organisation_name, &self.city),
            attributes: SponsorAttributes::new(&self.county, &self.type_and_rating, &self.route),
            first_seen: self.first_seen,
            last_updated: self.last_updated,
            removed_date: self.removed_date,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CsvMasterStore {
    path: PathBuf,
}

impl CsvMasterStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        CsvMasterStore { path: path.into() }
    }

    /// Parse master CSV bytes. Any defect is `CorruptMasterStore`: a
    /// register that cannot be trusted must not be reconciled against.
    pub fn parse_bytes(&self, bytes: &[u8]) -> Result<MasterRegister> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::Headers)
            .from_reader(bytes);

        let mut records = Vec::new();
        for (idx, result) in reader.deserialize::<MasterRow>().enumerate() {
            let row = result.map_err(|e| TrackerError::corrupt_master(&self.path, e.to_string()))?;
            let record = row.into_record();
            if record.key.organisation.is_empty() {
                return Err(TrackerError::corrupt_master(
                    &self.path,
                    format!("record {} has an empty organisation name", idx + 1),
                ));
            }
            records.push(record);
        }

        MasterRegister::from_records(records)
            .map_err(|reason| TrackerError::corrupt_master(&self.path, reason))
    }

    /// Render the register as master CSV, header first even when empty.
    pub fn to_bytes(register: &MasterRegister) -> Result<Vec<u8>> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());
        writer.write_record(MASTER_HEADERS)?;
        for record in register.records() {
            writer.serialize(MasterRow::from(record))?;
        }
        writer.into_inner().map_err(|e| TrackerError::Io(e.into_error()))
    }
}

impl MasterStore for CsvMasterStore {
    fn load(&self) -> Result<MasterRegister> {
        if !self.path.exists() {
            info!(path = %self.path.display(), "no master register yet, starting empty");
            return Ok(MasterRegister::new());
        }

        let bytes = fs::read(&self.path)?;
        let register = self.parse_bytes(&bytes)?;
        debug!(
            records = register.len(),
            active = register.active_count(),
            "master register loaded"
        );
        Ok(register)
    }

    fn persist(&mut self, register: &MasterRegister) -> Result<()> {
        let bytes = Self::to_bytes(register)?;
        StagedFile::write(&self.path, &bytes)?.commit()
    }

    fn location(&self) -> &Path {
        &self.path
    }
}

// ============================================================================
// TESTS
// ============================================================================
