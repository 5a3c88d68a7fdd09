// 🚀 Tracker pipeline - one run, end to end
//
// load -> normalize -> reconcile -> aggregate / delta / history -> stage -> commit
//
// Everything is computed in memory and staged next to its target before the
// master store is touched. A failure before the commit step leaves every
// published file as it was.

use crate::aggregate::{Aggregator, StatsSnapshot};
use crate::config::TrackerConfig;
use crate::delta::{DailyDelta, DeltaEmitter};
use crate::error::{Result, TrackerError};
use crate::history::{History, HistoryPoint};
use crate::normalize::normalize_snapshot;
use crate::parser::{run_date_from_filename, CsvSnapshotParser, RawSnapshot, SnapshotParser};
use crate::reconciliation::ReconciliationEngine;
use crate::register::MasterRegister;
use crate::store::{open_store, stage_json, MasterStore, RunRecord, StoreLock};
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use std::fs;
use std::path::Path;
use tracing::{info, info_span, warn};
use uuid::Uuid;

// ============================================================================
// SUMMARIES
// ============================================================================

/// What a successful run did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub run_date: NaiveDate,
    pub snapshot: String,
    pub fingerprint: String,
    pub rows_read: usize,
    pub rows_dropped: usize,
    pub duplicate_rows: usize,
    pub added: usize,
    pub removed: usize,
    pub unchanged: usize,
    pub reactivated: usize,
    pub total_active: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegenerateSummary {
    pub run_date: NaiveDate,
    pub added: usize,
    pub removed: usize,
    pub total_active: usize,
    pub history_points: usize,
}

/// Read-only view of the current state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackerStatus {
    pub total_records: usize,
    pub active: usize,
    pub latest_date: Option<NaiveDate>,
    pub last_point: Option<HistoryPoint>,
}

// ============================================================================
// TRACKER
// ============================================================================

pub struct Tracker {
    config: TrackerConfig,
    store: Box<dyn MasterStore>,
    reconciler: ReconciliationEngine,
    aggregator: Aggregator,
}

impl Tracker {
    /// Tracker over the backend named in `config`.
    pub fn new(config: TrackerConfig) -> Result<Self> {
        let store = open_store(&config)?;
        Ok(Self::with_store(config, store))
    }

    pub fn with_store(config: TrackerConfig, store: Box<dyn MasterStore>) -> Self {
        let reconciler = ReconciliationEngine::with_policy(config.reconcile.reappearance);
        let aggregator = Aggregator::new(config.stats.clone());
        Tracker {
            config,
            store,
            reconciler,
            aggregator,
        }
    }

    /// Missing history file means no history yet; an unreadable one is fatal.
    pub fn load_history(&self) -> Result<History> {
        let path = &self.config.paths.history;
        if !path.exists() {
            return Ok(History::new());
        }
        let content = fs::read_to_string(path)?;
        History::from_json(&content, path)
    }

    /// Parse a snapshot file and run it. The run date is `run_date`, else the
    /// file name's date prefix, else today.
    pub fn run_file(&mut self, snapshot: &Path, run_date: Option<NaiveDate>) -> Result<RunSummary> {
        let run_date = resolve_run_date(run_date, snapshot, Utc::now().date_naive());
        let raw = CsvSnapshotParser::new().parse(snapshot)?;
        self.run(&raw, run_date)
    }

    /// Apply one snapshot for `run_date` and publish all outputs.
    pub fn run(&mut self, raw: &RawSnapshot, run_date: NaiveDate) -> Result<RunSummary> {
        let run_id = Uuid::new_v4();
        let span = info_span!("run", %run_id, %run_date);
        let _enter = span.enter();

        let _lock = self.lock()?;

        // Step 1: current state
        let prior = self.store.load()?;
        let mut history = self.load_history()?;

        // Step 2: normalize and reconcile on a copy
        let normalized = normalize_snapshot(raw);
        let outcome = self.reconciler.reconcile(&prior, &normalized, run_date)?;

        // Step 3: derived outputs
        let total_active = outcome.register.active_count();
        history.record(HistoryPoint::from_delta(&outcome.delta, total_active))?;
        let stats = self
            .aggregator
            .compute_for_run(&outcome.register, &outcome.delta)
            .with_generated_at(Utc::now());
        let daily = DeltaEmitter::emit(&outcome.delta, &outcome.register);

        // Step 4: stage, then commit
        self.publish(&outcome.register, &daily, &stats, &history)?;

        let summary = RunSummary {
            run_id,
            run_date,
            snapshot: raw.source.clone(),
            fingerprint: raw.fingerprint.clone(),
            rows_read: raw.row_count(),
            rows_dropped: normalized.dropped_count(),
            duplicate_rows: outcome.duplicates.len(),
            added: outcome.delta.added.len(),
            removed: outcome.delta.removed.len(),
            unchanged: outcome.unchanged_count,
            reactivated: outcome.reactivated.len(),
            total_active,
        };

        let audit = RunRecord {
            run_id,
            run_date,
            snapshot: summary.snapshot.clone(),
            fingerprint: summary.fingerprint.clone(),
            added: summary.added,
            removed: summary.removed,
            total_active,
        };
        // committed already: audit failures are logged only
        if let Err(e) = self.store.record_run(&audit) {
            warn!("failed to record run audit: {}", e);
        }

        info!(
            added = summary.added,
            removed = summary.removed,
            total_active = summary.total_active,
            "run committed"
        );
        Ok(summary)
    }

    /// Rebuild delta, stats and history from the register. History points the
    /// register can derive are replaced; the rest of the persisted series stays.
    ///
    /// `run_date` defaults to the latest date recorded in the register.
    pub fn regenerate(&mut self, run_date: Option<NaiveDate>) -> Result<RegenerateSummary> {
        let span = info_span!("regenerate");
        let _enter = span.enter();

        let _lock = self.lock()?;
        let register = self.store.load()?;

        let run_date = match run_date.or_else(|| register.latest_date()) {
            Some(date) => date,
            None => {
                return Err(TrackerError::Config(
                    "master register is empty; a date is required to regenerate".to_string(),
                ))
            }
        };

        let daily = DeltaEmitter::from_register(&register, run_date);
        let stats = self
            .aggregator
            .compute(&register, run_date)
            .with_generated_at(Utc::now());
        // lifecycle dates cannot reproduce no-change days; keep those from the persisted series
        let persisted = match self.load_history() {
            Ok(history) => history,
            Err(TrackerError::CorruptArtifact { path, reason }) => {
                warn!(path = %path.display(), %reason, "history unreadable, rebuilding from the register alone");
                History::new()
            }
            Err(e) => return Err(e),
        };
        let history = persisted.merge_rebuilt(History::rebuild(&register));

        let summary = RegenerateSummary {
            run_date,
            added: daily.added.len(),
            removed: daily.removed.len(),
            total_active: register.active_count(),
            history_points: history.len(),
        };

        let staged = [
            stage_json(&self.config.paths.delta, &daily)?,
            stage_json(&self.config.paths.stats, &stats)?,
            stage_json(&self.config.paths.history, &history)?,
        ];
        for file in staged {
            file.commit()?;
        }

        info!(%run_date, points = summary.history_points, "artifacts regenerated");
        Ok(summary)
    }

    pub fn status(&self) -> Result<TrackerStatus> {
        let register = self.store.load()?;
        let history = self.load_history()?;

        Ok(TrackerStatus {
            total_records: register.len(),
            active: register.active_count(),
            latest_date: register.latest_date(),
            last_point: history.last().copied(),
        })
    }

    fn lock(&self) -> Result<Option<StoreLock>> {
        if !self.config.storage.lock {
            return Ok(None);
        }
        StoreLock::acquire(&self.config.lock_path()).map(Some)
    }

    fn publish(
        &mut self,
        register: &MasterRegister,
        daily: &DailyDelta,
        stats: &StatsSnapshot,
        history: &History,
    ) -> Result<()> {
        let staged = [
            stage_json(&self.config.paths.delta, daily)?,
            stage_json(&self.config.paths.stats, stats)?,
            stage_json(&self.config.paths.history, history)?,
        ];

        self.store.persist(register)?;
        info!(store = %self.store.location().display(), "master register persisted");

        for file in staged {
            file.commit()?;
        }
        Ok(())
    }
}

/// Explicit date, else a `YYYY-MM-DD` file name prefix, else `today`.
pub fn resolve_run_date(explicit: Option<NaiveDate>, snapshot: &Path, today: NaiveDate) -> NaiveDate {
    explicit
        .or_else(|| run_date_from_filename(snapshot))
        .unwrap_or(today)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::RawSponsorRow;
    use crate::store::SqliteMasterStore;
    use tempfile::TempDir;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, d).unwrap()
    }

    fn config_in(dir: &TempDir) -> TrackerConfig {
        TrackerConfig::default().with_base_dir(dir.path())
    }

    fn snapshot(rows: &[(&str, &str)]) -> RawSnapshot {
        let rows = rows
            .iter()
            .enumerate()
            .map(|(idx, (org, city))| {
                RawSponsorRow::new(org, city, "Skilled Worker")
                    .with_type_and_rating("Worker (A rating)")
                    .at_line(idx + 2)
            })
            .collect();
        RawSnapshot::from_rows("test.csv", rows)
    }

    #[test]
    fn test_resolve_run_date() {
        let today = date(20);
        let named = Path::new("/data/2026-01-15_-_Worker_and_Temporary_Worker.csv");
        let plain = Path::new("/data/register.csv");

        assert_eq!(resolve_run_date(Some(date(3)), named, today), date(3));
        assert_eq!(resolve_run_date(None, named, today), date(15));
        assert_eq!(resolve_run_date(None, plain, today), today);
    }

    #[test]
    fn test_run_publishes_everything() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        let mut tracker = Tracker::new(config.clone()).unwrap();

        let summary = tracker
            .run(&snapshot(&[("Acme Ltd", "London"), ("Beta", "Leeds")]), date(15))
            .unwrap();

        assert_eq!(summary.added, 2);
        assert_eq!(summary.total_active, 2);
        assert!(config.paths.master.exists());
        assert!(config.paths.delta.exists());
        assert!(config.paths.stats.exists());
        assert!(config.paths.history.exists());
        assert!(!config.lock_path().exists());
    }

    #[test]
    fn test_lock_held_elsewhere_fails_fast() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        let _held = StoreLock::acquire(&config.lock_path()).unwrap();
        let mut tracker = Tracker::new(config.clone()).unwrap();

        let err = tracker.run(&snapshot(&[("Acme Ltd", "London")]), date(15)).unwrap_err();

        assert!(matches!(err, TrackerError::StoreLocked { .. }));
        assert!(!config.paths.master.exists());
    }

    #[test]
    fn test_lock_can_be_disabled() {
        let dir = TempDir::new().unwrap();
        let mut config = config_in(&dir);
        config.storage.lock = false;
        let _other = StoreLock::acquire(&config.lock_path()).unwrap();
        let mut tracker = Tracker::new(config).unwrap();

        assert!(tracker.run(&snapshot(&[("Acme Ltd", "London")]), date(15)).is_ok());
    }

    #[test]
    fn test_stale_run_leaves_outputs_untouched() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        let mut tracker = Tracker::new(config.clone()).unwrap();
        tracker.run(&snapshot(&[("Acme Ltd", "London")]), date(16)).unwrap();
        let before = fs::read(&config.paths.history).unwrap();

        let err = tracker.run(&snapshot(&[("Beta", "Leeds")]), date(15)).unwrap_err();

        assert!(matches!(err, TrackerError::StaleRunDate { .. }));
        assert_eq!(fs::read(&config.paths.history).unwrap(), before);
    }

    #[test]
    fn test_corrupt_history_aborts_run() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        fs::write(&config.paths.history, "not json").unwrap();
        let mut tracker = Tracker::new(config.clone()).unwrap();

        let err = tracker.run(&snapshot(&[("Acme Ltd", "London")]), date(15)).unwrap_err();

        assert!(matches!(err, TrackerError::CorruptArtifact { .. }));
        assert!(!config.paths.master.exists());
    }

    #[test]
    fn test_regenerate_matches_run_outputs() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        let mut tracker = Tracker::new(config.clone()).unwrap();
        tracker
            .run(&snapshot(&[("Acme Ltd", "London"), ("Beta", "Leeds")]), date(15))
            .unwrap();
        tracker.run(&snapshot(&[("Acme Ltd", "London")]), date(16)).unwrap();
        let history_after_runs = tracker.load_history().unwrap();

        let summary = tracker.regenerate(None).unwrap();

        assert_eq!(summary.run_date, date(16));
        assert_eq!(summary.removed, 1);
        assert_eq!(tracker.load_history().unwrap(), history_after_runs);
    }

    #[test]
    fn test_regenerate_keeps_no_change_days() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        let mut tracker = Tracker::new(config.clone()).unwrap();
        let same = snapshot(&[("Acme Ltd", "London"), ("Beta", "Leeds")]);
        for day in [15, 16, 17] {
            tracker.run(&same, date(day)).unwrap();
        }
        let history_after_runs = tracker.load_history().unwrap();

        let summary = tracker.regenerate(None).unwrap();

        let history = tracker.load_history().unwrap();
        let dates: Vec<NaiveDate> = history.points().iter().map(|p| p.date).collect();
        assert_eq!(dates, vec![date(15), date(16), date(17)]);
        assert_eq!(history, history_after_runs);
        assert_eq!(summary.history_points, 3);
    }

    #[test]
    fn test_regenerate_replaces_unreadable_history() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        let mut tracker = Tracker::new(config.clone()).unwrap();
        tracker.run(&snapshot(&[("Acme Ltd", "London")]), date(15)).unwrap();
        fs::write(&config.paths.history, "not json").unwrap();

        tracker.regenerate(None).unwrap();

        assert_eq!(tracker.load_history().unwrap().len(), 1);
    }

    #[test]
    fn test_rerun_stats_agree_with_delta_and_history() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        let mut tracker = Tracker::new(config.clone()).unwrap();
        let day = snapshot(&[("Acme Ltd", "London"), ("Beta", "Leeds")]);

        tracker.run(&day, date(15)).unwrap();
        tracker.run(&day, date(15)).unwrap();

        let stats: StatsSnapshot = serde_json::from_str(&fs::read_to_string(&config.paths.stats).unwrap()).unwrap();
        let daily: DailyDelta = serde_json::from_str(&fs::read_to_string(&config.paths.delta).unwrap()).unwrap();
        let point = *tracker.load_history().unwrap().last().unwrap();
        assert_eq!(stats.daily_metrics.added_today, daily.added.len());
        assert_eq!(stats.daily_metrics.added_today, point.added_count);
        assert_eq!(stats.daily_metrics.added_today, 0);
        assert_eq!(stats.daily_metrics.total_active_sponsors, point.total_active_count);
    }

    #[test]
    fn test_regenerate_empty_register_needs_date() {
        let dir = TempDir::new().unwrap();
        let mut tracker = Tracker::new(config_in(&dir)).unwrap();

        assert!(matches!(tracker.regenerate(None), Err(TrackerError::Config(_))));
        assert!(tracker.regenerate(Some(date(15))).is_ok());
    }

    #[test]
    fn test_sqlite_store_records_runs() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        let store = SqliteMasterStore::in_memory().unwrap();
        let mut tracker = Tracker::with_store(config, Box::new(store));

        tracker.run(&snapshot(&[("Acme Ltd", "London")]), date(15)).unwrap();
        let summary = tracker.run(&snapshot(&[("Beta", "Leeds")]), date(16)).unwrap();

        assert_eq!(summary.added, 1);
        assert_eq!(summary.removed, 1);
        assert_eq!(tracker.status().unwrap().total_records, 2);
    }
}
