// 📊 Aggregator - point-in-time statistics over active sponsors
//
// Pure function of (register, run date, settings); on a run the daily counts
// come from the reconciler delta instead. The only wall-clock value,
// `generated_at`, is stamped by the caller.

use crate::delta::Delta;
use crate::register::{MasterRegister, SponsorRecord};
use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// ============================================================================
// SETTINGS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsSettings {
    /// Entries per ranking
    pub top_n: usize,

    /// Window (days) for the recently-added list
    pub added_window_days: i64,

    /// Window (days) for the recently-removed list
    pub removed_window_days: i64,

    /// Cap on the recently-added list
    pub recent_added_cap: usize,

    /// Suppress the added list when added_today exceeds this share of active
    pub bulk_import_ratio: f64,
}

impl Default for StatsSettings {
    fn default() -> Self {
        StatsSettings {
            top_n: 5,
            added_window_days: 7,
            removed_window_days: 14,
            recent_added_cap: 1000,
            bulk_import_ratio: 0.9,
        }
    }
}

// ============================================================================
// STATS SNAPSHOT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<DateTime<Utc>>,
    pub run_date: NaiveDate,
    pub daily_metrics: DailyMetrics,
    pub categorical_totals: CategoricalTotals,
    pub counts: GroupCounts,
    pub rankings: Rankings,
    pub recency: Recency,
}

impl StatsSnapshot {
    pub fn with_generated_at(mut self, at: DateTime<Utc>) -> Self {
        self.generated_at = Some(at);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyMetrics {
    pub added_today: usize,
    pub removed_today: usize,
    pub total_active_sponsors: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoricalTotals {
    pub unique_organisations: usize,
    pub unique_cities: usize,
    pub unique_routes: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupCounts {
    pub by_route: BTreeMap<String, usize>,
    pub by_city: BTreeMap<String, usize>,
    pub by_rating: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedCount {
    pub value: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rankings {
    pub top_routes: Vec<RankedCount>,
    pub top_cities: Vec<RankedCount>,
    pub top_ratings: Vec<RankedCount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentAddition {
    pub organisation_name: String,
    pub city: String,
    pub route: String,
    pub first_seen: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentRemoval {
    pub organisation_name: String,
    pub city: String,
    pub route: String,
    pub removed_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recency {
    pub added_last_7_days: Vec<RecentAddition>,
    pub removed_last_14_days: Vec<RecentRemoval>,

    /// True when the added list was emptied by bulk-import suppression
    #[serde(default)]
    pub added_list_suppressed: bool,
}

// ============================================================================
// AGGREGATOR
// ============================================================================

pub struct Aggregator {
    settings: StatsSettings,
}

impl Aggregator {
    pub fn new(settings: StatsSettings) -> Self {
        Aggregator { settings }
    }

    /// Stats with daily counts read off lifecycle dates. Used where no
    /// reconciler delta exists (regeneration).
    pub fn compute(&self, register: &MasterRegister, run_date: NaiveDate) -> StatsSnapshot {
        let added_today = register
            .records()
            .iter()
            .filter(|r| r.first_seen == run_date && r.is_active())
            .count();
        let removed_today = register
            .records()
            .iter()
            .filter(|r| r.removed_date == Some(run_date))
            .count();
        self.compute_with_counts(register, run_date, added_today, removed_today)
    }

    /// Stats for a run: daily counts come from the run's delta, so they agree
    /// with the published delta and history point.
    pub fn compute_for_run(&self, register: &MasterRegister, delta: &Delta) -> StatsSnapshot {
        self.compute_with_counts(register, delta.date, delta.added.len(), delta.removed.len())
    }

    fn compute_with_counts(
        &self,
        register: &MasterRegister,
        run_date: NaiveDate,
        added_today: usize,
        removed_today: usize,
    ) -> StatsSnapshot {
        let active: Vec<&SponsorRecord> = register.active().collect();

        let by_route = count_by(&active, |r| r.attributes.route.as_str());
        let by_city = count_by(&active, |r| r.key.city.as_str());
        let by_rating = count_by(&active, |r| r.attributes.rating.as_str());

        let unique_organisations = active
            .iter()
            .map(|r| r.key.organisation.as_str())
            .collect::<BTreeSet<_>>()
            .len();

        let rankings = Rankings {
            top_routes: top_n(&by_route, self.settings.top_n),
            top_cities: top_n(&by_city, self.settings.top_n),
            top_ratings: top_n(&by_rating, self.settings.top_n),
        };

        let suppressed = is_bulk_import(added_today, active.len(), self.settings.bulk_import_ratio);
        let added_last_7_days = if suppressed {
            Vec::new()
        } else {
            self.recent_additions(&active, run_date)
        };

        StatsSnapshot {
            generated_at: None,
            run_date,
            daily_metrics: DailyMetrics {
                added_today,
                removed_today,
                total_active_sponsors: active.len(),
            },
            categorical_totals: CategoricalTotals {
                unique_organisations,
                unique_cities: by_city.len(),
                unique_routes: by_route.len(),
            },
            counts: GroupCounts {
                by_route,
                by_city,
                by_rating,
            },
            rankings,
            recency: Recency {
                added_last_7_days,
                removed_last_14_days: self.recent_removals(register, run_date),
                added_list_suppressed: suppressed,
            },
        }
    }

    /// Active records with first_seen in [run_date - window, run_date].
    fn recent_additions(&self, active: &[&SponsorRecord], run_date: NaiveDate) -> Vec<RecentAddition> {
        let from = window_start(run_date, self.settings.added_window_days);
        let mut recent: Vec<&SponsorRecord> = active
            .iter()
            .copied()
            .filter(|r| within(r.first_seen, from, run_date))
            .collect();
        recent.sort_by(|a, b| b.first_seen.cmp(&a.first_seen).then_with(|| a.key.cmp(&b.key)));

        recent
            .into_iter()
            .take(self.settings.recent_added_cap)
            .map(|r| RecentAddition {
                organisation_name: r.key.organisation.clone(),
                city: r.key.city.clone(),
                route: r.attributes.route.clone(),
                first_seen: r.first_seen,
            })
            .collect()
    }

    /// Records with removed_date in [run_date - window, run_date].
    fn recent_removals(&self, register: &MasterRegister, run_date: NaiveDate) -> Vec<RecentRemoval> {
        let from = window_start(run_date, self.settings.removed_window_days);
        let mut recent: Vec<(NaiveDate, &SponsorRecord)> = register
            .records()
            .iter()
            .filter_map(|r| r.removed_date.map(|d| (d, r)))
            .filter(|(d, _)| within(*d, from, run_date))
            .collect();
        recent.sort_by(|(da, a), (db, b)| db.cmp(da).then_with(|| a.key.cmp(&b.key)));

        recent
            .into_iter()
            .map(|(removed_date, r)| RecentRemoval {
                organisation_name: r.key.organisation.clone(),
                city: r.key.city.clone(),
                route: r.attributes.route.clone(),
                removed_date,
            })
            .collect()
    }
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new(StatsSettings::default())
    }
}

// ============================================================================
// HELPERS
// ============================================================================

/// First day of a window ending on `run_date`; saturates at the earliest date.
fn window_start(run_date: NaiveDate, days: i64) -> NaiveDate {
    run_date
        .checked_sub_days(Days::new(days.max(0) as u64))
        .unwrap_or(NaiveDate::MIN)
}

fn within(date: NaiveDate, from: NaiveDate, to: NaiveDate) -> bool {
    from <= date && date <= to
}

fn is_bulk_import(added_today: usize, active: usize, ratio: f64) -> bool {
    active > 0 && added_today as f64 > active as f64 * ratio
}

fn count_by<'a, F>(records: &[&'a SponsorRecord], field: F) -> BTreeMap<String, usize>
where
    F: Fn(&'a SponsorRecord) -> &'a str,
{
    let mut counts = BTreeMap::new();
    for record in records {
        *counts.entry(field(*record).to_string()).or_insert(0) += 1;
    }
    counts
}

/// Highest counts first; equal counts ordered by value ascending.
fn top_n(counts: &BTreeMap<String, usize>, n: usize) -> Vec<RankedCount> {
    let mut ranked: Vec<(&String, &usize)> = counts.iter().collect();
    ranked.sort_by(|(va, ca), (vb, cb)| cb.cmp(ca).then_with(|| va.cmp(vb)));
    ranked
        .into_iter()
        .take(n)
        .map(|(value, count)| RankedCount {
            value: value.clone(),
            count: *count,
        })
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================
