//! Machine-readable session descriptor.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::{json, Value};

use crate::models::{RenderedOutput, Session};

use super::manifest::{PackagingError, PackagingResult};

pub const DESCRIPTOR_FILENAME: &str = "session.json";

/// Build the descriptor document from the final progress state and the
/// rendered outputs.
pub fn build_descriptor(
    session: &Session,
    progress: &Value,
    outputs: &[RenderedOutput],
    params: Value,
) -> Value {
    let mut output_entries = serde_json::Map::new();
    for output in outputs {
        output_entries.insert(
            output.target.clone(),
            json!({
                "file": output.filename,
                "sha256": output.sha256,
                "size": output.size,
                "sr": output.output.sample_rate,
                "bits": output.output.bit_depth,
                "verification": output.verification,
            }),
        );
    }

    json!({
        "version": 1,
        "session": session.id,
        "time_utc": chrono::Utc::now().to_rfc3339(),
        "input": {
            "filename": session.input.filename,
            "sha256": session.input.sha256,
            "size": session.input.size,
            "duration_secs": session.input.duration_secs,
        },
        "targets_used": outputs.iter().map(|o| o.target.clone()).collect::<Vec<_>>(),
        "params": params,
        "metrics": progress.get("metrics").cloned().unwrap_or(Value::Null),
        "timeline": progress.get("timeline").cloned().unwrap_or(Value::Null),
        "advisor": progress.get("advisor").cloned().unwrap_or(Value::Null),
        "outputs": Value::Object(output_entries),
    })
}

/// Write the descriptor atomically under the session root.
pub fn write_descriptor(session_root: &Path, descriptor: &Value) -> PackagingResult<PathBuf> {
    let path = session_root.join(DESCRIPTOR_FILENAME);
    let content = serde_json::to_string_pretty(descriptor)?;
    let tmp = path.with_extension("json.tmp");
    {
        let mut file =
            fs::File::create(&tmp).map_err(|e| PackagingError::io("create descriptor temp", e))?;
        file.write_all(content.as_bytes())
            .map_err(|e| PackagingError::io("write descriptor temp", e))?;
    }
    fs::rename(&tmp, &path).map_err(|e| PackagingError::io("publish descriptor", e))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{InputDescriptor, LoudnessMetrics, VerifyOutcome};
    use tempfile::TempDir;

    fn session(root: &Path) -> Session {
        Session {
            id: "s1".to_string(),
            root: root.to_path_buf(),
            input: InputDescriptor {
                filename: "track.wav".to_string(),
                path: root.join("track.wav"),
                sha256: "f".repeat(64),
                size: 4,
                duration_secs: Some(2.0),
                channels: Some(2),
                sample_rate: Some(44100),
            },
            created_at: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    fn output(root: &Path) -> RenderedOutput {
        RenderedOutput {
            target: "club".to_string(),
            filename: "club_master.wav".to_string(),
            path: root.join("club_master.wav"),
            input: LoudnessMetrics::default(),
            output: LoudnessMetrics {
                i: Some(-7.2),
                sample_rate: Some(48000),
                bit_depth: Some(24),
                ..Default::default()
            },
            sha256: "e".repeat(64),
            size: 10,
            verification: VerifyOutcome::Ok,
        }
    }

    #[test]
    fn descriptor_carries_outputs_and_progress_sections() {
        let dir = TempDir::new().unwrap();
        let progress = serde_json::json!({
            "metrics": {"club": {"input": {}, "output": {"I": -7.2}}},
            "timeline": {"sec": [0.0], "short_term": [-20.0], "tp_flags": [0]},
            "advisor": {"fingerprint": "abc-0"},
        });
        let descriptor = build_descriptor(
            &session(dir.path()),
            &progress,
            &[output(dir.path())],
            serde_json::json!({"club": {"I": -7.2}}),
        );

        assert_eq!(descriptor["version"], 1);
        assert_eq!(descriptor["targets_used"][0], "club");
        assert_eq!(descriptor["outputs"]["club"]["file"], "club_master.wav");
        assert_eq!(descriptor["outputs"]["club"]["verification"], "ok");
        assert_eq!(descriptor["advisor"]["fingerprint"], "abc-0");
        assert_eq!(descriptor["metrics"]["club"]["output"]["I"], -7.2);
    }

    #[test]
    fn descriptor_writes_atomically() {
        let dir = TempDir::new().unwrap();
        let descriptor = serde_json::json!({"version": 1});
        let path = write_descriptor(dir.path(), &descriptor).unwrap();
        assert!(path.ends_with(DESCRIPTOR_FILENAME));
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("\"version\": 1"));
        assert!(!dir.path().join("session.json.tmp").exists());
    }
}
