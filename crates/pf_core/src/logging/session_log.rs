//! Per-session log file.
//!
//! One plain-text log per session, written into the session directory so
//! it travels with the artifacts. Detailed diagnostics (full transform
//! stderr, parameter dumps) belong here; pollers only ever see the short
//! messages in the progress document.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use parking_lot::Mutex;

pub const SESSION_LOG_FILENAME: &str = "session.log";

/// Per-session logger with timestamped lines.
pub struct SessionLogger {
    session_id: String,
    log_path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl SessionLogger {
    /// Create (or append to) the session log inside `session_root`.
    pub fn create(session_root: &Path, session_id: impl Into<String>) -> std::io::Result<Self> {
        let log_path = session_root.join(SESSION_LOG_FILENAME);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;
        Ok(Self {
            session_id: session_id.into(),
            log_path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn info(&self, message: &str) {
        self.write_line("", message);
    }

    pub fn warn(&self, message: &str) {
        self.write_line("[warn] ", message);
        tracing::warn!(session = %self.session_id, "{message}");
    }

    pub fn error(&self, message: &str) {
        self.write_line("[error] ", message);
        tracing::error!(session = %self.session_id, "{message}");
    }

    /// Mark a pipeline phase boundary.
    pub fn phase(&self, name: &str) {
        self.write_line("", &format!("=== {name} ==="));
    }

    /// Record an external command about to run.
    pub fn command(&self, command: &str) {
        self.write_line("$ ", command);
    }

    pub fn success(&self, message: &str) {
        self.write_line("[ok] ", message);
    }

    fn write_line(&self, prefix: &str, message: &str) {
        let timestamp = Local::now().format("%H:%M:%S%.3f");
        let mut writer = self.writer.lock();
        let _ = writeln!(writer, "[{timestamp}] {prefix}{message}");
        let _ = writer.flush();
    }
}
