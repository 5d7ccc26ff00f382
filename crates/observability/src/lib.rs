//! Tracing setup shared by binaries and tests.

/// Subscriber construction (filters, formats).
pub mod subscriber;

pub use subscriber::LogFormat;

/// Initialize process-wide logging: JSON lines filtered by `RUST_LOG`
/// (default `info`).
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    subscriber::init(LogFormat::Json, subscriber::DEFAULT_FILTER);
}

/// Human-readable output captured by the test harness, `debug` unless
/// `RUST_LOG` says otherwise.
pub fn init_for_tests() {
    subscriber::init(LogFormat::Test, "debug");
}
