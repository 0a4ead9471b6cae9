//! Log output
//!
//! Results from the default reporter and per-phase diagnostics go through
//! `tracing`. [`init_logging`] installs a formatting subscriber; applications
//! with their own subscriber can skip it.

use tracing_subscriber::EnvFilter;

/// Filter used when neither `RUST_LOG` nor configuration sets one
pub const DEFAULT_FILTER: &str = "flexbench=info";

/// Install a `fmt` subscriber filtered by `RUST_LOG`, falling back to
/// `filter` (or [`DEFAULT_FILTER`]). Returns `false` when a global subscriber
/// was already installed.
pub fn init_logging(filter: Option<&str>) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter.unwrap_or(DEFAULT_FILTER)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .is_ok()
}
