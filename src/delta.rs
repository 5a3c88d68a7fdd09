// 📦 Delta Emitter - what changed on a run date
//
// Projection only: keys from the reconciler are resolved to their records.
// The artifact always carries both arrays, so "no change" is distinguishable
// from "no artifact".

use crate::normalize::IdentityKey;
use crate::register::{MasterRegister, SponsorRecord};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Keys added and removed by one reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delta {
    pub date: NaiveDate,
    pub added: BTreeSet<IdentityKey>,
    pub removed: BTreeSet<IdentityKey>,
}

impl Delta {
    pub fn empty(date: NaiveDate) -> Self {
        Delta {
            date,
            added: BTreeSet::new(),
            removed: BTreeSet::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// One entry of the daily delta artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaRecord {
    pub organisation_name: String,
    pub city: String,
    pub county: String,
    pub type_and_rating: String,
    pub licence_type: String,
    pub rating: String,
    pub route: String,
    pub first_seen: NaiveDate,
    pub last_updated: NaiveDate,
    pub removed_date: Option<NaiveDate>,
}

impl From<&SponsorRecord> for DeltaRecord {
    fn from(record: &SponsorRecord) -> Self {
        let attrs = &record.attributes;
        DeltaRecord {
            organisation_name: record.key.organisation.clone(),
            city: record.key.city.clone(),
            county: attrs.county.clone(),
            type_and_rating: attrs.type_and_rating.clone(),
            licence_type: attrs.licence_type.clone(),
            rating: attrs.rating.clone(),
            route: attrs.route.clone(),
            first_seen: record.first_seen,
            last_updated: record.last_updated,
            removed_date: record.removed_date,
        }
    }
}

/// The `daily_delta` artifact: `{date, added: [...], removed: [...]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyDelta {
    pub date: NaiveDate,
    pub added: Vec<DeltaRecord>,
    pub removed: Vec<DeltaRecord>,
}

impl DailyDelta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

pub struct DeltaEmitter;

impl DeltaEmitter {
    /// Resolve a reconciler delta against the post-reconciliation register.
    ///
    /// Keys come out in identity-key order.
    pub fn emit(delta: &Delta, register: &MasterRegister) -> DailyDelta {
        let resolve = |keys: &BTreeSet<IdentityKey>| -> Vec<DeltaRecord> {
            keys.iter()
                .filter_map(|key| register.latest_for(key))
                .map(DeltaRecord::from)
                .collect()
        };

        DailyDelta {
            date: delta.date,
            added: resolve(&delta.added),
            removed: resolve(&delta.removed),
        }
    }

    /// Rebuild the delta for `date` from lifecycle dates alone.
    ///
    /// Works for past dates too: each logical instance is reported as it is
    /// recorded now. Under the reactivate policy a reactivated record keeps
    /// its old first_seen and so does not appear as added.
    pub fn from_register(register: &MasterRegister, date: NaiveDate) -> DailyDelta {
        let mut added: Vec<&SponsorRecord> = register
            .records()
            .iter()
            .filter(|r| r.first_seen == date)
            .collect();
        let mut removed: Vec<&SponsorRecord> = register
            .records()
            .iter()
            .filter(|r| r.removed_date == Some(date))
            .collect();
        added.sort_by(|a, b| a.key.cmp(&b.key));
        removed.sort_by(|a, b| a.key.cmp(&b.key));

        DailyDelta {
            date,
            added: added.into_iter().map(DeltaRecord::from).collect(),
            removed: removed.into_iter().map(DeltaRecord::from).collect(),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
