use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use sponsor_tracker::logging::init_logging;
use sponsor_tracker::{Tracker, TrackerConfig};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "sponsor-tracker")]
#[command(about = "Tracks additions and removals in the register of licensed worker sponsors")]
#[command(version)]
struct Cli {
    /// TOML config file; relative paths inside it resolve against its directory
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile one snapshot against the master register and publish outputs
    Run {
        /// Snapshot CSV as downloaded
        #[arg(long)]
        snapshot: PathBuf,

        /// Run date (YYYY-MM-DD); defaults to the file name's date prefix, then today
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Rebuild delta, stats and history from the master register
    Regenerate {
        /// Date for the delta and stats; defaults to the latest date in the register
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Print the current register and history state
    Summary,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    let config = load_config(cli.config.as_deref())?;
    let mut tracker = Tracker::new(config).context("Failed to open master store")?;

    match cli.command {
        Commands::Run { snapshot, date } => {
            let summary = tracker
                .run_file(&snapshot, date)
                .with_context(|| format!("Run failed for {}", snapshot.display()))?;

            println!("📥 Snapshot: {} ({} rows)", summary.snapshot, summary.rows_read);
            println!("   Run date: {}", summary.run_date);
            println!("   Run id: {}", summary.run_id);
            println!("   Fingerprint: {}", summary.fingerprint);
            println!("   Dropped rows: {}", summary.rows_dropped);
            println!("   Duplicate rows: {}", summary.duplicate_rows);
            println!("\n📊 Changes:");
            println!("   ➕ Added: {}", summary.added);
            println!("   ➖ Removed: {}", summary.removed);
            println!("   🔁 Unchanged: {}", summary.unchanged);
            if summary.reactivated > 0 {
                println!("   ♻️  Reactivated: {}", summary.reactivated);
            }
            println!("   ✓ Active sponsors: {}", summary.total_active);
        }
        Commands::Regenerate { date } => {
            let summary = tracker.regenerate(date).context("Regenerate failed")?;

            println!("🔧 Regenerated artifacts for {}", summary.run_date);
            println!("   ➕ Added: {}", summary.added);
            println!("   ➖ Removed: {}", summary.removed);
            println!("   ✓ Active sponsors: {}", summary.total_active);
            println!("   📈 History points: {}", summary.history_points);
        }
        Commands::Summary => {
            let status = tracker.status().context("Failed to read tracker state")?;

            println!("🗂️  Master register");
            println!("   Records: {}", status.total_records);
            println!("   Active: {}", status.active);
            match status.latest_date {
                Some(date) => println!("   Latest date: {}", date),
                None => println!("   Latest date: (no runs yet)"),
            }
            if let Some(point) = status.last_point {
                println!(
                    "   Last run: {} (+{} / -{}, {} active)",
                    point.date, point.added_count, point.removed_count, point.total_active_count
                );
            }
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<TrackerConfig> {
    let config = TrackerConfig::load_or_default(path).context("Failed to load config")?;
    match path.and_then(Path::parent) {
        Some(base) if !base.as_os_str().is_empty() => Ok(config.with_base_dir(base)),
        _ => Ok(config),
    }
}
