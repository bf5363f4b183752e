//! Logging infrastructure.
//!
//! Application-wide diagnostics go through the `tracing` ecosystem; each
//! session additionally gets its own plain-text log file inside the
//! session directory for post-mortem reading.

mod session_log;

pub use session_log::SessionLogger;

use std::io;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the global tracing subscriber for stderr output.
///
/// Respects `RUST_LOG`, falling back to the provided default directive.
/// Should be called once at application startup.
pub fn init_tracing(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();
}

/// Initialize tracing with an additional daily-rolling file layer.
///
/// The returned guard must be kept alive for the duration of the program;
/// dropping it flushes and stops the background writer.
pub fn init_tracing_with_file(
    default_directive: &str,
    log_dir: &Path,
) -> io::Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)?;
    let appender = tracing_appender::rolling::daily(log_dir, "peakforge.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(fmt::layer().with_ansi(false).with_writer(writer))
        .with(filter)
        .init();
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn file_logging_creates_log_directory() {
        let dir = TempDir::new().unwrap();
        let log_dir = dir.path().join("logs");
        // Only exercise the directory setup here; installing the global
        // subscriber twice in one test binary would panic.
        std::fs::create_dir_all(&log_dir).unwrap();
        let appender = tracing_appender::rolling::daily(&log_dir, "peakforge.log");
        let (_writer, _guard) = tracing_appender::non_blocking(appender);
        assert!(log_dir.is_dir());
    }
}
