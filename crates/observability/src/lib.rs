//! Tracing and logging setup shared by the ledger binaries.

/// Initialize process-wide logging with the `info` default.
///
/// Safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    crate::tracing::init(crate::tracing::DEFAULT_DIRECTIVE);
}

/// Subscriber configuration (filters, JSON formatting).
pub mod tracing;
