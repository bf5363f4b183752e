//! Session identity and input description.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Description of the uploaded input file.
///
/// Probe-derived fields are optional: an upload the external transform
/// cannot parse is still accepted and fails later inside the pipeline,
/// where the failure is recorded in the Progress Journal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputDescriptor {
    /// Original (sanitized) upload filename.
    pub filename: String,
    /// Absolute path of the stored input inside the session directory.
    pub path: PathBuf,
    /// Content checksum of the stored bytes.
    pub sha256: String,
    /// Size in bytes.
    pub size: u64,
    /// Probed duration, if the input was parseable at upload time.
    pub duration_secs: Option<f64>,
    /// Probed channel count.
    pub channels: Option<u32>,
    /// Probed sample rate.
    pub sample_rate: Option<u32>,
}

/// One mastering session: a directory holding the input, rendered outputs,
/// and state documents. Immutable once created except for lifecycle status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Session id: random hex prefix plus a content-checksum suffix.
    pub id: String,
    /// Session root directory.
    pub root: PathBuf,
    /// The uploaded input.
    pub input: InputDescriptor,
    /// Creation timestamp (RFC 3339).
    pub created_at: String,
}

impl Session {
    /// Path of the progress document.
    pub fn progress_path(&self) -> PathBuf {
        self.root.join("progress.json")
    }

    /// Path of the manifest document.
    pub fn manifest_path(&self) -> PathBuf {
        self.root.join("manifest.json")
    }

    /// Path for an output file with the given name.
    pub fn output_path(&self, filename: &str) -> PathBuf {
        self.root.join(filename)
    }
}
