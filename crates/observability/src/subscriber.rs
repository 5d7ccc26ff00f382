//! `tracing-subscriber` installation.

use std::sync::OnceLock;

use tracing_subscriber::EnvFilter;

pub const DEFAULT_FILTER: &str = "info";

static INSTALLED: OnceLock<LogFormat> = OnceLock::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line, with timestamps.
    Json,
    /// Compact text through the test writer so `cargo test` captures it.
    Test,
}

/// Install the global subscriber once. Later calls return the format that won.
pub fn init(format: LogFormat, default_filter: &str) -> LogFormat {
    *INSTALLED.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
        let installed = match format {
            LogFormat::Json => tracing_subscriber::fmt()
                .with_env_filter(filter)
                .json()
                .with_timer(tracing_subscriber::fmt::time::SystemTime)
                .with_target(false)
                .try_init(),
            LogFormat::Test => tracing_subscriber::fmt()
                .with_env_filter(filter)
                .compact()
                .with_test_writer()
                .try_init(),
        };
        // Another subscriber may already own the global slot.
        if installed.is_err() {
            tracing::debug!(?format, "global subscriber already set");
        }
        format
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_init_keeps_first_format() {
        let first = init(LogFormat::Test, "debug");
        assert_eq!(init(LogFormat::Json, DEFAULT_FILTER), first);
        tracing::info!("subscriber installed");
    }
}
