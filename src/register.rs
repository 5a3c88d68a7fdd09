// 🗂️ Master Register - every sponsor ever observed
//
// Identity is the normalized (organisation, city) key; values (county, rating,
// route) drift over time; lifecycle dates record when we first saw, last saw,
// and lost an entity. Records are never deleted, only marked removed.

use crate::normalize::{IdentityKey, SponsorAttributes};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// SPONSOR RECORD
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SponsorRecord {
    pub key: IdentityKey,
    pub attributes: SponsorAttributes,

    /// Run date this logical instance was first observed
    pub first_seen: NaiveDate,

    /// Last run date this instance was present in the snapshot
    pub last_updated: NaiveDate,

    /// Run date it disappeared (None = still active)
    pub removed_date: Option<NaiveDate>,
}

impl SponsorRecord {
    /// New instance observed for the first time on `run_date`.
    pub fn observed(key: IdentityKey, attributes: SponsorAttributes, run_date: NaiveDate) -> Self {
        SponsorRecord {
            key,
            attributes,
            first_seen: run_date,
            last_updated: run_date,
            removed_date: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.removed_date.is_none()
    }

    /// Present again in today's snapshot: refresh drifting values.
    pub fn refresh(&mut self, attributes: &SponsorAttributes, run_date: NaiveDate) {
        if self.attributes != *attributes {
            self.attributes = attributes.clone();
        }
        self.last_updated = run_date;
    }

    pub fn mark_removed(&mut self, run_date: NaiveDate) {
        self.removed_date = Some(run_date);
    }

    /// Latest date recorded on this record.
    pub fn latest_date(&self) -> NaiveDate {
        let latest = self.first_seen.max(self.last_updated);
        self.removed_date.map_or(latest, |removed| latest.max(removed))
    }

    /// Check lifecycle ordering: first_seen <= last_updated, removed >= first_seen.
    pub fn lifecycle_violation(&self) -> Option<String> {
        if self.first_seen > self.last_updated {
            return Some(format!(
                "first_seen {} is after last_updated {}",
                self.first_seen, self.last_updated
            ));
        }
        if let Some(removed) = self.removed_date {
            if removed < self.first_seen {
                return Some(format!(
                    "removed_date {} is before first_seen {}",
                    removed, self.first_seen
                ));
            }
        }
        None
    }
}

// ============================================================================
// MASTER REGISTER
// ============================================================================

/// Ordered collection of all records plus an index of the latest record per key.
///
/// Invariant: at most one active record per key, and when one exists it is
/// the latest record for that key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MasterRegister {
    records: Vec<SponsorRecord>,
    latest: HashMap<IdentityKey, usize>,
}

impl MasterRegister {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from persisted records, checking the register invariants.
    pub fn from_records(records: Vec<SponsorRecord>) -> Result<Self, String> {
        let mut register = MasterRegister::new();

        for (row, record) in records.into_iter().enumerate() {
            if let Some(violation) = record.lifecycle_violation() {
                return Err(format!("record {} ({}): {}", row + 1, record.key, violation));
            }
            if let Some(previous) = register.latest_for(&record.key) {
                if previous.is_active() {
                    return Err(format!(
                        "record {} ({}): key already has an active record",
                        row + 1,
                        record.key
                    ));
                }
            }
            register.push(record);
        }

        Ok(register)
    }

    pub fn records(&self) -> &[SponsorRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<SponsorRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn active(&self) -> impl Iterator<Item = &SponsorRecord> {
        self.records.iter().filter(|r| r.is_active())
    }

    pub fn active_count(&self) -> usize {
        self.active().count()
    }

    /// Latest record (active or not) for a key.
    pub fn latest_for(&self, key: &IdentityKey) -> Option<&SponsorRecord> {
        self.latest.get(key).map(|&idx| &self.records[idx])
    }

    pub fn latest_for_mut(&mut self, key: &IdentityKey) -> Option<&mut SponsorRecord> {
        match self.latest.get(key) {
            Some(&idx) => self.records.get_mut(idx),
            None => None,
        }
    }

    /// Active record for a key, if any.
    pub fn get_active(&self, key: &IdentityKey) -> Option<&SponsorRecord> {
        self.latest_for(key).filter(|r| r.is_active())
    }

    pub fn get_active_mut(&mut self, key: &IdentityKey) -> Option<&mut SponsorRecord> {
        self.latest_for_mut(key).filter(|r| r.is_active())
    }

    pub fn active_keys(&self) -> Vec<IdentityKey> {
        self.active().map(|r| r.key.clone()).collect()
    }

    /// Append a record; it becomes the latest for its key.
    pub fn push(&mut self, record: SponsorRecord) {
        self.latest.insert(record.key.clone(), self.records.len());
        self.records.push(record);
    }

    /// Latest lifecycle date anywhere in the register.
    pub fn latest_date(&self) -> Option<NaiveDate> {
        self.records.iter().map(|r| r.latest_date()).max()
    }
}

// ============================================================================
// TESTS
// ============================================================================
