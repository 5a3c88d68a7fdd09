// 📈 History - one point per run date, strictly increasing
//
// Re-running a date overwrites that date's point in place. A date earlier than
// the last point that has no point of its own is refused.

use crate::delta::Delta;
use crate::error::{Result, TrackerError};
use crate::register::MasterRegister;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub date: NaiveDate,

    #[serde(alias = "added")]
    pub added_count: usize,

    #[serde(alias = "removed")]
    pub removed_count: usize,

    #[serde(alias = "total")]
    pub total_active_count: usize,
}

impl HistoryPoint {
    pub fn from_delta(delta: &Delta, total_active_count: usize) -> Self {
        HistoryPoint {
            date: delta.date,
            added_count: delta.added.len(),
            removed_count: delta.removed.len(),
            total_active_count,
        }
    }
}

/// Ordered time series; serializes as a bare JSON array.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct History {
    points: Vec<HistoryPoint>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from persisted points, refusing anything not strictly increasing.
    pub fn from_points(points: Vec<HistoryPoint>) -> std::result::Result<Self, String> {
        for pair in points.windows(2) {
            if pair[0].date >= pair[1].date {
                return Err(format!(
                    "dates not strictly increasing: {} then {}",
                    pair[0].date, pair[1].date
                ));
            }
        }
        Ok(History { points })
    }

    /// Parse a history artifact. `path` is only used for error reporting.
    pub fn from_json(json: &str, path: &Path) -> Result<Self> {
        let points: Vec<HistoryPoint> =
            serde_json::from_str(json).map_err(|e| TrackerError::CorruptArtifact {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        History::from_points(points).map_err(|reason| TrackerError::CorruptArtifact {
            path: path.to_path_buf(),
            reason,
        })
    }

    pub fn points(&self) -> &[HistoryPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn last(&self) -> Option<&HistoryPoint> {
        self.points.last()
    }

    pub fn get(&self, date: NaiveDate) -> Option<&HistoryPoint> {
        self.points
            .binary_search_by(|p| p.date.cmp(&date))
            .ok()
            .map(|idx| &self.points[idx])
    }

    /// Record the point for its date: replace in place, append, or refuse.
    pub fn record(&mut self, point: HistoryPoint) -> Result<()> {
        match self.points.binary_search_by(|p| p.date.cmp(&point.date)) {
            Ok(idx) => {
                self.points[idx] = point;
                Ok(())
            }
            Err(idx) if idx == self.points.len() => {
                self.points.push(point);
                Ok(())
            }
            Err(_) => Err(TrackerError::OutOfOrderHistory {
                run_date: point.date,
                // a non-terminal insertion point implies a last element
                last_date: self.points.last().map(|p| p.date).unwrap_or(point.date),
            }),
        }
    }

    /// Rebuild the whole series from lifecycle dates.
    ///
    /// One point per date on which anything was first seen, refreshed or
    /// removed. Counts are per logical instance.
    pub fn rebuild(register: &MasterRegister) -> Self {
        let mut dates = BTreeSet::new();
        for record in register.records() {
            dates.insert(record.first_seen);
            dates.insert(record.last_updated);
            if let Some(removed) = record.removed_date {
                dates.insert(removed);
            }
        }

        let points = dates
            .into_iter()
            .map(|date| {
                let mut point = HistoryPoint {
                    date,
                    added_count: 0,
                    removed_count: 0,
                    total_active_count: 0,
                };
                for record in register.records() {
                    if record.first_seen == date {
                        point.added_count += 1;
                    }
                    if record.removed_date == Some(date) {
                        point.removed_count += 1;
                    }
                    let alive = record.first_seen <= date
                        && record.removed_date.map_or(true, |removed| removed > date);
                    if alive {
                        point.total_active_count += 1;
                    }
                }
                point
            })
            .collect();

        History { points }
    }

    /// Overlay `rebuilt` onto this series. Rebuilt points win on their dates;
    /// persisted points on dates the register leaves no trace of (no-change
    /// days) are kept.
    pub fn merge_rebuilt(self, rebuilt: History) -> Self {
        let mut by_date: BTreeMap<NaiveDate, HistoryPoint> =
            self.points.into_iter().map(|p| (p.date, p)).collect();
        for point in rebuilt.points {
            by_date.insert(point.date, point);
        }
        History {
            points: by_date.into_values().collect(),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
