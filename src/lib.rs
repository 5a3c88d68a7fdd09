// Sponsor Tracker - Core Library
// Daily reconciliation of the licensed worker sponsor register

pub mod error;
pub mod parser;
pub mod normalize;
pub mod register;
pub mod deduplication;
pub mod reconciliation;
pub mod delta;
pub mod aggregate;
pub mod history;
pub mod store;
pub mod config;
pub mod logging;
pub mod pipeline;

// Re-export commonly used types
pub use error::{Result, TrackerError};
pub use parser::{
    CsvSnapshotParser, RawSnapshot, RawSponsorRow, SnapshotParser,
    run_date_from_filename,
};
pub use normalize::{
    IdentityKey, Licence, NormalizedSnapshot, SponsorAttributes, SponsorRow,
    normalize_city, normalize_row, normalize_snapshot, split_type_and_rating,
};
pub use register::{MasterRegister, SponsorRecord};
pub use deduplication::{DedupOutcome, DeduplicationEngine, DuplicateMatch, MatchStrategy};
pub use reconciliation::{ReappearancePolicy, ReconciliationEngine, ReconciliationOutcome};
pub use delta::{DailyDelta, Delta, DeltaEmitter, DeltaRecord};
pub use aggregate::{Aggregator, StatsSettings, StatsSnapshot};
pub use history::{History, HistoryPoint};
pub use store::{CsvMasterStore, MasterStore, RunRecord, SqliteMasterStore, StoreLock};
pub use config::{StorageBackend, TrackerConfig};
pub use pipeline::{RegenerateSummary, RunSummary, Tracker, TrackerStatus};

/// Version of the tracker library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
