//! Tracing and logging setup shared by everything that hosts the directory.

/// Initialize process-wide tracing with the default `info` level.
///
/// Safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init(tracing::DEFAULT_DIRECTIVE);
}

/// Subscriber configuration (filters, JSON formatting).
pub mod tracing;
