//! Atomic, mergeable progress journal.
//!
//! Single writer (the orchestrator), many readers (pollers). Persistence
//! is temp-file + rename in the same directory, so a reader always sees
//! either the fully-old or the fully-new document, never a torn one.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;

use super::state::{Phase, ProgressState};

/// Nested keys that merge recursively; everything else overwrites.
const MERGE_KEYS: &[&str] = &["metrics", "downloads", "timeline", "advisor"];

/// Errors from journal operations.
#[derive(Error, Debug)]
pub enum JournalError {
    #[error("progress document not found at {0}")]
    Missing(PathBuf),

    #[error("I/O error in {operation}: {source}")]
    Io {
        operation: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse progress document: {0}")]
    Parse(#[from] serde_json::Error),
}

impl JournalError {
    fn io(operation: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }
}

pub type JournalResult<T> = Result<T, JournalError>;

/// Handle on one session's progress document.
#[derive(Debug, Clone)]
pub struct ProgressJournal {
    path: PathBuf,
}

impl ProgressJournal {
    /// Journal for the given session root.
    pub fn new(session_root: &Path) -> Self {
        Self {
            path: session_root.join("progress.json"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Write the baseline document. Called synchronously before the
    /// background task starts so an immediate poll never finds a missing
    /// document.
    pub fn init(&self) -> JournalResult<()> {
        let value = serde_json::to_value(ProgressState::baseline())?;
        self.write_atomic(&value)
    }

    /// Read the document verbatim.
    pub fn read_value(&self) -> JournalResult<Value> {
        if !self.path.exists() {
            return Err(JournalError::Missing(self.path.clone()));
        }
        let content = fs::read_to_string(&self.path)
            .map_err(|e| JournalError::io("read progress document", e))?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Read the document as typed state.
    pub fn read(&self) -> JournalResult<ProgressState> {
        Ok(serde_json::from_value(self.read_value()?)?)
    }

    /// Merge a patch into the document and persist atomically.
    ///
    /// Nested `metrics`/`downloads`/`timeline`/`advisor` objects merge
    /// recursively; scalar fields overwrite. `percent` never decreases,
    /// `percent >= 100` implies `done`, and once the terminal error state
    /// has been written every further update is ignored.
    pub fn update(&self, patch: Value) -> JournalResult<()> {
        let mut doc = self.read_value()?;
        if doc["phase"] == "error" {
            tracing::debug!(path = %self.path.display(), "journal is terminal, update dropped");
            return Ok(());
        }

        let previous_percent = doc["percent"].as_f64().unwrap_or(0.0);
        if let (Some(dst), Some(src)) = (doc.as_object_mut(), patch.as_object()) {
            for (key, value) in src {
                if MERGE_KEYS.contains(&key.as_str()) {
                    merge_value(dst.entry(key.clone()).or_insert(Value::Null), value);
                } else {
                    dst.insert(key.clone(), value.clone());
                }
            }
        }

        apply_invariants(&mut doc, previous_percent);
        self.write_atomic(&doc)
    }

    /// Convenience scalar update at a stage boundary.
    pub fn advance(&self, phase: Phase, percent: f64, message: &str) -> JournalResult<()> {
        self.update(serde_json::json!({
            "phase": phase,
            "percent": percent,
            "message": message,
        }))
    }

    /// Transition to the terminal error state.
    ///
    /// Best-effort: this runs after a stage has already failed, so a
    /// write error here is logged rather than propagated.
    pub fn fail(&self, stage: &str, message: &str) {
        let patch = serde_json::json!({
            "phase": Phase::Error,
            "percent": 100.0,
            "message": format!("{stage} failed"),
            "error": message,
            "done": true,
        });
        let result = match self.read_value() {
            Ok(mut doc) => {
                if doc["phase"] == "error" {
                    return;
                }
                let previous_percent = doc["percent"].as_f64().unwrap_or(0.0);
                if let (Some(dst), Some(src)) = (doc.as_object_mut(), patch.as_object()) {
                    for (key, value) in src {
                        dst.insert(key.clone(), value.clone());
                    }
                }
                apply_invariants(&mut doc, previous_percent);
                self.write_atomic(&doc)
            }
            // Journal unreadable or missing: still publish a terminal doc.
            Err(_) => self.write_atomic(&patch),
        };
        if let Err(e) = result {
            tracing::error!(path = %self.path.display(), error = %e, "failed to write error state");
        }
    }

    fn write_atomic(&self, value: &Value) -> JournalResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| JournalError::io("create session directory", e))?;
        }
        let json = serde_json::to_string_pretty(value)?;
        let tmp = self.path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp)
                .map_err(|e| JournalError::io("create temp progress file", e))?;
            file.write_all(json.as_bytes())
                .map_err(|e| JournalError::io("write temp progress file", e))?;
        }
        fs::rename(&tmp, &self.path)
            .map_err(|e| JournalError::io("publish progress document", e))?;
        Ok(())
    }
}

/// Recursive merge: objects merge key-by-key, everything else overwrites.
fn merge_value(dst: &mut Value, src: &Value) {
    match (dst, src) {
        (Value::Object(dst_map), Value::Object(src_map)) => {
            for (key, value) in src_map {
                merge_value(dst_map.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
        (dst_slot, src_value) => *dst_slot = src_value.clone(),
    }
}

/// Monotonic percent, done derivation, error terminality.
fn apply_invariants(doc: &mut Value, previous_percent: f64) {
    let Some(map) = doc.as_object_mut() else {
        return;
    };
    let requested = map
        .get("percent")
        .and_then(Value::as_f64)
        .unwrap_or(previous_percent);
    let percent = requested.max(previous_percent).clamp(0.0, 100.0);
    map.insert("percent".to_string(), json_number(percent));

    if percent >= 100.0 {
        map.insert("done".to_string(), Value::Bool(true));
    }
    let has_error = map.get("error").map(|e| !e.is_null()).unwrap_or(false);
    if has_error {
        map.insert("phase".to_string(), Value::String("error".to_string()));
        map.insert("done".to_string(), Value::Bool(true));
    }
}

fn json_number(value: f64) -> Value {
    serde_json::Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn journal() -> (TempDir, ProgressJournal) {
        let dir = TempDir::new().unwrap();
        let journal = ProgressJournal::new(dir.path());
        journal.init().unwrap();
        (dir, journal)
    }

    #[test]
    fn init_writes_baseline() {
        let (_dir, journal) = journal();
        let state = journal.read().unwrap();
        assert_eq!(state.phase, Phase::Starting);
        assert_eq!(state.percent, 0.0);
        assert!(state.downloads.contains_key("bundle"));
    }

    #[test]
    fn percent_never_decreases() {
        let (_dir, journal) = journal();
        journal.advance(Phase::Club, 45.0, "Rendering Club…").unwrap();
        journal
            .advance(Phase::Analyzing, 5.0, "late update")
            .unwrap();
        let state = journal.read().unwrap();
        assert_eq!(state.percent, 45.0);
    }

    #[test]
    fn full_percent_implies_done() {
        let (_dir, journal) = journal();
        journal.advance(Phase::Done, 100.0, "Ready").unwrap();
        let state = journal.read().unwrap();
        assert!(state.done);
        assert_eq!(state.percent, 100.0);
    }

    #[test]
    fn nested_fields_merge_instead_of_overwrite() {
        let (_dir, journal) = journal();
        journal
            .update(json!({"downloads": {"club": "club_master.wav"}}))
            .unwrap();
        journal
            .update(json!({"downloads": {"streaming": "streaming_master.wav"}}))
            .unwrap();
        let state = journal.read().unwrap();
        assert_eq!(
            state.downloads["club"].as_deref(),
            Some("club_master.wav")
        );
        assert_eq!(
            state.downloads["streaming"].as_deref(),
            Some("streaming_master.wav")
        );
    }

    #[test]
    fn metrics_merge_deeply() {
        let (_dir, journal) = journal();
        journal
            .update(json!({"metrics": {"club": {"input": {"I": -14.0}}}}))
            .unwrap();
        journal
            .update(json!({"metrics": {"club": {"output": {"I": -7.2}}}}))
            .unwrap();
        let value = journal.read_value().unwrap();
        assert_eq!(value["metrics"]["club"]["input"]["I"], -14.0);
        assert_eq!(value["metrics"]["club"]["output"]["I"], -7.2);
    }

    #[test]
    fn error_state_is_terminal() {
        let (_dir, journal) = journal();
        journal.fail("analyzing", "no parseable loudness report");
        let state = journal.read().unwrap();
        assert_eq!(state.phase, Phase::Error);
        assert!(state.done);
        assert!(state.error.is_some());

        // Further updates are dropped.
        journal.advance(Phase::Done, 100.0, "Ready").unwrap();
        let state = journal.read().unwrap();
        assert_eq!(state.phase, Phase::Error);
        assert_eq!(state.message, "analyzing failed");
    }

    #[test]
    fn fail_without_existing_document_still_writes() {
        let dir = TempDir::new().unwrap();
        let journal = ProgressJournal::new(dir.path());
        journal.fail("starting", "could not seed journal");
        let value = journal.read_value().unwrap();
        assert_eq!(value["phase"], "error");
        assert_eq!(value["done"], true);
    }

    #[test]
    fn missing_document_reports_missing() {
        let dir = TempDir::new().unwrap();
        let journal = ProgressJournal::new(dir.path());
        assert!(matches!(journal.read(), Err(JournalError::Missing(_))));
    }
}
