// ⚙️ Configuration - optional TOML file, every field defaulted
//
// Example tracker.toml:
//
//   [paths]
//   master = "data/master_register.csv"
//
//   [storage]
//   backend = "sqlite"
//
//   [reconcile]
//   reappearance = "reactivate"
//
//   [stats]
//   top_n = 10

use crate::aggregate::StatsSettings;
use crate::error::{Result, TrackerError};
use crate::reconciliation::ReappearancePolicy;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

/// Upper bound for the recency windows (ten years)
pub const MAX_WINDOW_DAYS: i64 = 3650;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub paths: PathsConfig,
    pub storage: StorageConfig,
    pub reconcile: ReconcileConfig,
    pub stats: StatsSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub master: PathBuf,
    pub delta: PathBuf,
    pub stats: PathBuf,
    pub history: PathBuf,

    /// Lock file; defaults to `<master>.lock`
    pub lock: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        PathsConfig {
            master: PathBuf::from("master_register.csv"),
            delta: PathBuf::from("daily_delta.json"),
            stats: PathBuf::from("stats.json"),
            history: PathBuf::from("history.json"),
            lock: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    Csv,
    Sqlite,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,

    /// Hold an exclusive lock file for the duration of a run
    pub lock: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            backend: StorageBackend::Csv,
            lock: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    pub reappearance: ReappearancePolicy,
}

impl TrackerConfig {
    /// Load and validate a TOML config file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            TrackerError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    /// `path` if given, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: TrackerConfig =
            toml::from_str(content).map_err(|e| TrackerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let stats = &self.stats;
        if stats.top_n == 0 {
            return Err(TrackerError::Config("stats.top_n must be at least 1".to_string()));
        }
        for (name, days) in [
            ("added_window_days", stats.added_window_days),
            ("removed_window_days", stats.removed_window_days),
        ] {
            if !(0..=MAX_WINDOW_DAYS).contains(&days) {
                return Err(TrackerError::Config(format!(
                    "stats.{} must be between 0 and {}",
                    name, MAX_WINDOW_DAYS
                )));
            }
        }
        if !(0.0..=1.0).contains(&stats.bulk_import_ratio) {
            return Err(TrackerError::Config(
                "stats.bulk_import_ratio must be between 0 and 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolve relative paths against `base`.
    pub fn with_base_dir(mut self, base: &Path) -> Self {
        let resolve = |p: &PathBuf| if p.is_absolute() { p.clone() } else { base.join(p) };
        self.paths.master = resolve(&self.paths.master);
        self.paths.delta = resolve(&self.paths.delta);
        self.paths.stats = resolve(&self.paths.stats);
        self.paths.history = resolve(&self.paths.history);
        self.paths.lock = self.paths.lock.as_ref().map(resolve);
        self
    }

    pub fn lock_path(&self) -> PathBuf {
        match &self.paths.lock {
            Some(lock) => lock.clone(),
            None => {
                let mut name: OsString = self.paths.master.as_os_str().to_owned();
                name.push(".lock");
                PathBuf::from(name)
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
