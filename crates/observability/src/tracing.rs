//! Tracing/logging initialization.
//!
//! JSON lines on stdout, filtered by `RUST_LOG` when set.

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is absent or unparsable. sqlx logs every
/// statement at `info`, so it is held back to `warn`.
pub const DEFAULT_DIRECTIVE: &str = "info,sqlx=warn";

/// Install the global subscriber, falling back to `default_directive`.
///
/// Returns `false` when a subscriber was already installed.
pub fn init(default_directive: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init()
        .is_ok()
}
