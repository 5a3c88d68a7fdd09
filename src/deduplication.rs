// 🔍 Deduplication Engine - one row per identity key
//
// The published register regularly repeats rows. Two strategies are reported:
//   - ExactMatch:    same key, same attributes (pure repetition)
//   - KeyCollision:  same key, different attributes (e.g. one organisation
//                    listed under two routes in the same town)
// Either way the first occurrence wins.

use crate::normalize::{IdentityKey, SponsorRow};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

// ============================================================================
// MATCH STRATEGY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchStrategy {
    /// Same key and identical attributes
    ExactMatch,

    /// Same key, attributes differ; later attributes are discarded
    KeyCollision,
}

// ============================================================================
// DUPLICATE MATCH RESULT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateMatch {
    pub key: IdentityKey,

    /// Source line of the kept (first) row
    pub kept_line: usize,

    /// Source line of the discarded row
    pub dropped_line: usize,

    pub strategy: MatchStrategy,
}

/// Unique rows in first-occurrence order plus every duplicate found.
#[derive(Debug, Clone, Default)]
pub struct DedupOutcome {
    pub unique: Vec<SponsorRow>,
    pub duplicates: Vec<DuplicateMatch>,
}

impl DedupOutcome {
    pub fn collision_count(&self) -> usize {
        self.duplicates
            .iter()
            .filter(|d| d.strategy == MatchStrategy::KeyCollision)
            .count()
    }
}

// ============================================================================
// DEDUPLICATION ENGINE
// ============================================================================

#[derive(Debug, Default, Clone)]
pub struct DeduplicationEngine;

impl DeduplicationEngine {
    pub fn new() -> Self {
        DeduplicationEngine
    }

    /// Keep the first row per identity key.
    pub fn dedupe(&self, rows: &[SponsorRow]) -> DedupOutcome {
        let mut outcome = DedupOutcome::default();
        let mut seen: HashMap<&IdentityKey, usize> = HashMap::new();

        for row in rows {
            match seen.get(&row.key) {
                Some(&kept_idx) => {
                    let kept: &SponsorRow = &outcome.unique[kept_idx];
                    let strategy = if kept.attributes == row.attributes {
                        MatchStrategy::ExactMatch
                    } else {
                        MatchStrategy::KeyCollision
                    };
                    debug!(key = %row.key, line = row.line_number, ?strategy, "duplicate row");
                    outcome.duplicates.push(DuplicateMatch {
                        key: row.key.clone(),
                        kept_line: kept.line_number,
                        dropped_line: row.line_number,
                        strategy,
                    });
                }
                None => {
                    seen.insert(&row.key, outcome.unique.len());
                    outcome.unique.push(row.clone());
                }
            }
        }

        outcome
    }
}

// ============================================================================
// TESTS
// ============================================================================
