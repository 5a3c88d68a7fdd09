// ⚖️ Reconciliation Engine - diff today's snapshot against the master register
//
// For every identity key:
//   in snapshot, not active in master  → added   (new record, or reactivated)
//   active in master, not in snapshot  → removed (removed_date = run date)
//   in both                            → refreshed (attributes, last_updated)
//
// Conservation: |added| - |removed| = active(after) - active(before).
// Running twice with the same (snapshot, run date) yields the same register and
// an empty second delta.

use crate::deduplication::{DeduplicationEngine, DuplicateMatch};
use crate::delta::Delta;
use crate::error::{Result, TrackerError};
use crate::normalize::{IdentityKey, NormalizedSnapshot};
use crate::register::{MasterRegister, SponsorRecord};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info};

// ============================================================================
// REAPPEARANCE POLICY
// ============================================================================

/// What to do when a previously removed key shows up again.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReappearancePolicy {
    /// Append a fresh record with a new first_seen; the old one stays removed.
    #[default]
    NewInstance,

    /// Clear removed_date on the latest record for the key and keep its first_seen.
    Reactivate,
}

// ============================================================================
// RECONCILIATION OUTCOME
// ============================================================================

#[derive(Debug, Clone)]
pub struct ReconciliationOutcome {
    /// Register after applying the snapshot
    pub register: MasterRegister,

    pub delta: Delta,

    /// Keys present in both that were refreshed
    pub unchanged_count: usize,

    /// Snapshot rows folded into an earlier row with the same key
    pub duplicates: Vec<DuplicateMatch>,

    /// Keys added by reactivating an old record (Reactivate policy only)
    pub reactivated: Vec<IdentityKey>,
}

impl ReconciliationOutcome {
    pub fn summary(&self) -> String {
        format!(
            "Reconciliation for {}: +{} added, -{} removed, {} unchanged, {} duplicate rows, {} active",
            self.delta.date,
            self.delta.added.len(),
            self.delta.removed.len(),
            self.unchanged_count,
            self.duplicates.len(),
            self.register.active_count()
        )
    }
}

// ============================================================================
// RECONCILIATION ENGINE
// ============================================================================

pub struct ReconciliationEngine {
    pub policy: ReappearancePolicy,
    dedup: DeduplicationEngine,
}

impl ReconciliationEngine {
    pub fn new() -> Self {
        Self::with_policy(ReappearancePolicy::default())
    }

    pub fn with_policy(policy: ReappearancePolicy) -> Self {
        ReconciliationEngine {
            policy,
            dedup: DeduplicationEngine::new(),
        }
    }

    /// Apply a normalized snapshot to a copy of `prior`.
    ///
    /// `prior` is never mutated, so a failure anywhere after this call leaves
    /// the caller's register intact.
    pub fn reconcile(
        &self,
        prior: &MasterRegister,
        snapshot: &NormalizedSnapshot,
        run_date: NaiveDate,
    ) -> Result<ReconciliationOutcome> {
        // Step 1: one row per identity key, first occurrence wins
        let deduped = self.dedup.dedupe(&snapshot.rows);
        if deduped.unique.is_empty() {
            return Err(TrackerError::EmptySnapshot {
                dropped: snapshot.dropped_count(),
            });
        }

        if let Some(latest) = prior.latest_date() {
            if run_date < latest {
                return Err(TrackerError::StaleRunDate { run_date, latest });
            }
        }

        let mut register = prior.clone();
        let mut delta = Delta::empty(run_date);
        let mut unchanged_count = 0;
        let mut reactivated = Vec::new();

        let present: HashSet<&IdentityKey> = deduped.unique.iter().map(|row| &row.key).collect();

        // Steps 2 and 4: walk the snapshot
        for row in &deduped.unique {
            if let Some(record) = register.get_active_mut(&row.key) {
                record.refresh(&row.attributes, run_date);
                unchanged_count += 1;
                continue;
            }

            let reactivate = self.policy == ReappearancePolicy::Reactivate
                && register.latest_for(&row.key).is_some();

            if reactivate {
                if let Some(record) = register.latest_for_mut(&row.key) {
                    record.removed_date = None;
                    record.refresh(&row.attributes, run_date);
                }
                debug!(key = %row.key, "reactivated");
                reactivated.push(row.key.clone());
            } else {
                register.push(SponsorRecord::observed(
                    row.key.clone(),
                    row.attributes.clone(),
                    run_date,
                ));
            }
            delta.added.insert(row.key.clone());
        }

        // Step 3: active keys missing from the snapshot
        for key in prior.active_keys() {
            if present.contains(&key) {
                continue;
            }
            if let Some(record) = register.get_active_mut(&key) {
                record.mark_removed(run_date);
                delta.removed.insert(key);
            }
        }

        let outcome = ReconciliationOutcome {
            register,
            delta,
            unchanged_count,
            duplicates: deduped.duplicates,
            reactivated,
        };

        info!("{}", outcome.summary());
        Ok(outcome)
    }
}

impl Default for ReconciliationEngine {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================
