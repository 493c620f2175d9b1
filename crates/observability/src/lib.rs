//! Logging setup shared by every binary and test harness.

/// Initialize process-wide logging (JSON lines, `RUST_LOG` filter, default `info`).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init();
}

/// Initialize human-readable logging captured by the test harness.
///
/// Safe to call from every test.
pub fn init_for_tests() {
    tracing::init_for_tests();
}

/// Subscriber configuration (filters, formatting).
pub mod tracing;
