// 📝 Logging - tracing subscriber with env filter, plain or JSON lines
//
// RUST_LOG wins over the default directive. JSON output suits cron logs.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_DIRECTIVE: &str = "sponsor_tracker=info";

/// Initializes the global subscriber. `RUST_LOG` overrides the default
/// filter; `json` switches console output to one JSON object per event.
///
/// Calling this twice is harmless, the second call is ignored.
pub fn init_logging(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));

    let registry = tracing_subscriber::registry().with(filter);

    let _ = if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
    };
}

// ============================================================================
// TESTS
// ============================================================================
