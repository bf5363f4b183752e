//! Loudness metrics and rendered-output records.
//!
//! Field names mirror the wire format of the progress document, so the
//! structs serialize straight into the journal without translation.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Loudness measurements for one file, input or output side.
///
/// Every field is optional: the baseline progress document starts each
/// metrics object empty and stages fill in what they measure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoudnessMetrics {
    /// Integrated loudness (LUFS).
    #[serde(rename = "I", skip_serializing_if = "Option::is_none")]
    pub i: Option<f64>,
    /// True peak (dBTP).
    #[serde(rename = "TP", skip_serializing_if = "Option::is_none")]
    pub tp: Option<f64>,
    /// Loudness range (LU).
    #[serde(rename = "LRA", skip_serializing_if = "Option::is_none")]
    pub lra: Option<f64>,
    /// Gating threshold reported by the measurement pass.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    /// Sample peak (dBFS), used by the premaster target.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peak_dbfs: Option<f64>,
    /// Sample rate of the file.
    #[serde(rename = "sr", skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,
    /// Bit depth of the file.
    #[serde(rename = "bits", skip_serializing_if = "Option::is_none")]
    pub bit_depth: Option<u16>,
}

/// Input/output metric pair for one target.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetMetrics {
    #[serde(default)]
    pub input: LoudnessMetrics,
    #[serde(default)]
    pub output: LoudnessMetrics,
    /// Verification outcome; null until the target has been verified.
    #[serde(default)]
    pub verification: Option<VerifyOutcome>,
}

/// Coarse per-window loudness timeline. Diagnostic only; never feeds back
/// into rendering decisions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    /// Window start times in seconds.
    pub sec: Vec<f64>,
    /// Short-term loudness per window (dB RMS).
    pub short_term: Vec<f64>,
    /// 1 where the window peak came near full scale.
    pub tp_flags: Vec<u8>,
}

impl Timeline {
    pub fn is_empty(&self) -> bool {
        self.sec.is_empty()
    }
}

/// Verification outcome for a rendered target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerifyOutcome {
    /// Output landed within tolerance of its target.
    Ok,
    /// Output missed the target beyond tolerance after the bounded retry.
    /// The file is kept and surfaced, never hidden.
    Failed,
}

impl VerifyOutcome {
    pub fn is_ok(self) -> bool {
        self == VerifyOutcome::Ok
    }
}

/// A completed render of one target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderedOutput {
    /// Target name / download key.
    pub target: String,
    /// Canonical output filename.
    pub filename: String,
    /// Absolute path on disk.
    pub path: PathBuf,
    /// Metrics of the input measurement pass.
    pub input: LoudnessMetrics,
    /// Metrics re-measured from the rendered file.
    pub output: LoudnessMetrics,
    /// Content checksum of the rendered file.
    pub sha256: String,
    /// Size in bytes.
    pub size: u64,
    /// Whether the render verified within tolerance.
    pub verification: VerifyOutcome,
}
