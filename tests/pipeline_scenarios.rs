// End-to-end runs over real files in a temp directory.

use chrono::NaiveDate;
use sponsor_tracker::{
    CsvMasterStore, DailyDelta, History, MasterStore, ReappearancePolicy, StorageBackend,
    Tracker, TrackerConfig, TrackerError,
};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const HEADER: &str = "Organisation Name,Town/City,County,Type & Rating,Route\n";

fn date(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 1, d).unwrap()
}

fn setup() -> (TempDir, TrackerConfig) {
    let dir = TempDir::new().unwrap();
    let config = TrackerConfig::default().with_base_dir(dir.path());
    (dir, config)
}

fn write_snapshot(dir: &Path, name: &str, rows: &[&str]) -> PathBuf {
    let mut body = String::from(HEADER);
    for row in rows {
        body.push_str(row);
        body.push('\n');
    }
    let path = dir.join(name);
    fs::write(&path, body).unwrap();
    path
}

fn read_delta(config: &TrackerConfig) -> DailyDelta {
    serde_json::from_str(&fs::read_to_string(&config.paths.delta).unwrap()).unwrap()
}

fn read_history(config: &TrackerConfig) -> History {
    History::from_json(&fs::read_to_string(&config.paths.history).unwrap(), &config.paths.history).unwrap()
}

fn read_stats(config: &TrackerConfig) -> serde_json::Value {
    serde_json::from_str(&fs::read_to_string(&config.paths.stats).unwrap()).unwrap()
}

#[test]
fn test_first_run_on_empty_register() {
    let (dir, config) = setup();
    let snapshot = write_snapshot(
        dir.path(),
        "2026-01-15_-_Worker_and_Temporary_Worker.csv",
        &[
            "A,London,,Worker (A rating),Route1",
            "B,Manchester,,Worker (A rating),Route2",
        ],
    );
    let mut tracker = Tracker::new(config.clone()).unwrap();

    // run date comes from the file name
    let summary = tracker.run_file(&snapshot, None).unwrap();
    assert_eq!(summary.run_date, date(15));
    assert_eq!(summary.added, 2);
    assert_eq!(summary.removed, 0);

    let register = CsvMasterStore::new(&config.paths.master).load().unwrap();
    assert_eq!(register.active_count(), 2);
    for record in register.records() {
        assert_eq!(record.first_seen, date(15));
        assert_eq!(record.last_updated, date(15));
        assert_eq!(record.removed_date, None);
    }

    let delta = read_delta(&config);
    assert_eq!(delta.date, date(15));
    assert_eq!(delta.added.len(), 2);
    assert!(delta.removed.is_empty());

    let history = read_history(&config);
    assert_eq!(history.len(), 1);
    let point = history.points()[0];
    assert_eq!(
        (point.date, point.added_count, point.removed_count, point.total_active_count),
        (date(15), 2, 0, 2)
    );

    let stats = read_stats(&config);
    assert_eq!(stats["daily_metrics"]["added_today"], 2);
    assert_eq!(stats["daily_metrics"]["total_active_sponsors"], 2);
    assert!(stats["generated_at"].is_string());

    println!("✅ First run: 2 added, history (2026-01-15, 2, 0, 2)");
}

#[test]
fn test_second_run_removes_missing_sponsor() {
    let (dir, config) = setup();
    let mut tracker = Tracker::new(config.clone()).unwrap();
    let day1 = write_snapshot(dir.path(), "day1.csv", &["A,London,,Worker,Route1", "B,Manchester,,Worker,Route2"]);
    let day2 = write_snapshot(dir.path(), "day2.csv", &["A,London,,Worker,Route1"]);

    tracker.run_file(&day1, Some(date(15))).unwrap();
    let summary = tracker.run_file(&day2, Some(date(16))).unwrap();

    assert_eq!(summary.added, 0);
    assert_eq!(summary.removed, 1);

    let register = CsvMasterStore::new(&config.paths.master).load().unwrap();
    let a = register.records().iter().find(|r| r.key.organisation == "A").unwrap();
    let b = register.records().iter().find(|r| r.key.organisation == "B").unwrap();
    assert_eq!(a.last_updated, date(16));
    assert_eq!(a.removed_date, None);
    assert_eq!(b.removed_date, Some(date(16)));

    let delta = read_delta(&config);
    assert!(delta.added.is_empty());
    assert_eq!(delta.removed.len(), 1);
    assert_eq!(delta.removed[0].organisation_name, "B");

    let history = read_history(&config);
    let last = history.last().unwrap();
    assert_eq!(
        (last.date, last.added_count, last.removed_count, last.total_active_count),
        (date(16), 0, 1, 1)
    );
}

#[test]
fn test_duplicate_rows_are_one_sponsor() {
    let (dir, config) = setup();
    let mut tracker = Tracker::new(config.clone()).unwrap();
    let snapshot = write_snapshot(
        dir.path(),
        "dupes.csv",
        &[
            "A,London,,Worker (A rating),Route1",
            "  A ,  LONDON ,,Worker (A rating),Route1",
            "A,london,Kent,Worker (B rating),Route1",
        ],
    );

    let summary = tracker.run_file(&snapshot, Some(date(15))).unwrap();

    assert_eq!(summary.added, 1);
    assert_eq!(summary.duplicate_rows, 2);
    assert_eq!(summary.total_active, 1);
}

#[test]
fn test_empty_snapshot_changes_nothing() {
    let (dir, config) = setup();
    let mut tracker = Tracker::new(config.clone()).unwrap();
    let day1 = write_snapshot(dir.path(), "day1.csv", &["A,London,,Worker,Route1"]);
    tracker.run_file(&day1, Some(date(15))).unwrap();

    let before: Vec<Vec<u8>> = [&config.paths.master, &config.paths.delta, &config.paths.stats, &config.paths.history]
        .iter()
        .map(|p| fs::read(p).unwrap())
        .collect();

    let empty = write_snapshot(dir.path(), "empty.csv", &[]);
    let err = tracker.run_file(&empty, Some(date(16))).unwrap_err();
    assert!(matches!(err, TrackerError::EmptySnapshot { .. }));

    // only unusable rows is also empty
    let blank_names = write_snapshot(dir.path(), "blank.csv", &[" ,London,,Worker,Route1"]);
    let err = tracker.run_file(&blank_names, Some(date(16))).unwrap_err();
    assert!(matches!(err, TrackerError::EmptySnapshot { dropped: 1 }));

    let after: Vec<Vec<u8>> = [&config.paths.master, &config.paths.delta, &config.paths.stats, &config.paths.history]
        .iter()
        .map(|p| fs::read(p).unwrap())
        .collect();
    assert_eq!(before, after);
    assert!(!config.lock_path().exists());
}

#[test]
fn test_no_change_run_publishes_empty_delta() {
    let (dir, config) = setup();
    let mut tracker = Tracker::new(config.clone()).unwrap();
    let snapshot = write_snapshot(dir.path(), "day.csv", &["A,London,,Worker,Route1"]);

    tracker.run_file(&snapshot, Some(date(15))).unwrap();
    let summary = tracker.run_file(&snapshot, Some(date(16))).unwrap();

    assert_eq!((summary.added, summary.removed, summary.unchanged), (0, 0, 1));
    let delta = read_delta(&config);
    assert_eq!(delta.date, date(16));
    assert!(delta.is_empty());
    assert_eq!(read_history(&config).len(), 2);
}

#[test]
fn test_rerun_same_date_is_idempotent() {
    let (dir, config) = setup();
    let mut tracker = Tracker::new(config.clone()).unwrap();
    let snapshot = write_snapshot(dir.path(), "day.csv", &["A,London,,Worker,Route1", "B,York,,Worker,Route2"]);

    tracker.run_file(&snapshot, Some(date(15))).unwrap();
    let master_after_first = fs::read(&config.paths.master).unwrap();
    let second = tracker.run_file(&snapshot, Some(date(15))).unwrap();

    assert_eq!((second.added, second.removed), (0, 0));
    assert_eq!(fs::read(&config.paths.master).unwrap(), master_after_first);

    // the date's point is replaced in place, not appended
    let history = read_history(&config);
    assert_eq!(history.len(), 1);
    assert_eq!(history.points()[0].total_active_count, 2);
}

#[test]
fn test_reappearance_policies() {
    for (policy, expected_records) in [
        (ReappearancePolicy::NewInstance, 2),
        (ReappearancePolicy::Reactivate, 1),
    ] {
        let (dir, mut config) = setup();
        config.reconcile.reappearance = policy;
        let mut tracker = Tracker::new(config.clone()).unwrap();
        let with_a = write_snapshot(dir.path(), "a.csv", &["A,London,,Worker,Route1", "B,York,,Worker,Route1"]);
        let without_a = write_snapshot(dir.path(), "b.csv", &["B,York,,Worker,Route1"]);

        tracker.run_file(&with_a, Some(date(15))).unwrap();
        tracker.run_file(&without_a, Some(date(16))).unwrap();
        let back = tracker.run_file(&with_a, Some(date(17))).unwrap();

        assert_eq!(back.added, 1, "{:?}", policy);
        let register = CsvMasterStore::new(&config.paths.master).load().unwrap();
        let a_records = register.records().iter().filter(|r| r.key.organisation == "A").count();
        assert_eq!(a_records, expected_records, "{:?}", policy);
        assert_eq!(register.active_count(), 2);
    }
}

#[test]
fn test_sqlite_backend_end_to_end() {
    let (dir, mut config) = setup();
    config.storage.backend = StorageBackend::Sqlite;
    config.paths.master = dir.path().join("master.db");
    let day1 = write_snapshot(dir.path(), "day1.csv", &["A,London,,Worker,Route1", "B,York,,Worker,Route2"]);
    let day2 = write_snapshot(dir.path(), "day2.csv", &["A,London,,Worker,Route1"]);

    {
        let mut tracker = Tracker::new(config.clone()).unwrap();
        tracker.run_file(&day1, Some(date(15))).unwrap();
    }

    // reopen: state lives in the database
    let mut tracker = Tracker::new(config.clone()).unwrap();
    let summary = tracker.run_file(&day2, Some(date(16))).unwrap();
    assert_eq!(summary.removed, 1);

    let status = tracker.status().unwrap();
    assert_eq!(status.total_records, 2);
    assert_eq!(status.active, 1);
    assert_eq!(status.latest_date, Some(date(16)));
}

#[test]
fn test_config_file_drives_paths() {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("tracker.toml");
    fs::write(
        &config_path,
        "[paths]\nmaster = \"out/master.csv\"\nhistory = \"out/history.json\"\n\n[stats]\ntop_n = 2\n",
    )
    .unwrap();
    let config = TrackerConfig::load(&config_path).unwrap().with_base_dir(dir.path());
    let snapshot = write_snapshot(dir.path(), "day.csv", &["A,London,,Worker,Route1"]);

    Tracker::new(config).unwrap().run_file(&snapshot, Some(date(15))).unwrap();

    assert!(dir.path().join("out").join("master.csv").exists());
    assert!(dir.path().join("out").join("history.json").exists());
}

#[test]
fn test_corrupt_master_changes_nothing() {
    let (dir, config) = setup();
    let mut tracker = Tracker::new(config.clone()).unwrap();
    let day1 = write_snapshot(dir.path(), "day1.csv", &["A,London,,Worker,Route1"]);
    tracker.run_file(&day1, Some(date(15))).unwrap();

    let master = fs::read_to_string(&config.paths.master).unwrap().replace("2026-01-15", "15/01/2026");
    fs::write(&config.paths.master, master).unwrap();
    let outputs = [&config.paths.master, &config.paths.delta, &config.paths.stats, &config.paths.history];
    let before: Vec<Vec<u8>> = outputs.iter().map(|p| fs::read(p).unwrap()).collect();

    let day2 = write_snapshot(dir.path(), "day2.csv", &["B,York,,Worker,Route1"]);
    let err = tracker.run_file(&day2, Some(date(16))).unwrap_err();
    assert!(matches!(err, TrackerError::CorruptMasterStore { .. }));

    let after: Vec<Vec<u8>> = outputs.iter().map(|p| fs::read(p).unwrap()).collect();
    assert_eq!(before, after);
    assert!(!config.lock_path().exists());
}

#[test]
fn test_unnormalized_master_keys_match_snapshot() {
    let (dir, config) = setup();
    fs::write(
        &config.paths.master,
        "Organisation Name,Town/City,County,Type & Rating,Route,first_seen,last_updated,removed_date\n\
         Acme  Ltd,LONDON,,Worker (A rating),Skilled Worker,2026-01-15,2026-01-15,\n",
    )
    .unwrap();
    let mut tracker = Tracker::new(config.clone()).unwrap();
    let snapshot = write_snapshot(dir.path(), "day.csv", &["Acme Ltd,London,,Worker (A rating),Skilled Worker"]);

    let summary = tracker.run_file(&snapshot, Some(date(16))).unwrap();

    assert_eq!((summary.added, summary.removed, summary.unchanged), (0, 0, 1));
    assert!(read_delta(&config).is_empty());
    let register = CsvMasterStore::new(&config.paths.master).load().unwrap();
    assert_eq!(register.len(), 1);
    assert_eq!(register.records()[0].key.organisation, "Acme Ltd");
    assert_eq!(register.records()[0].first_seen, date(15));
}
