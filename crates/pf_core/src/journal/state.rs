//! The progress document and its baseline shape.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::{TargetMetrics, Timeline};

/// Pipeline phase as observed by pollers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Starting,
    Analyzing,
    Reference,
    Club,
    Streaming,
    Premaster,
    Custom,
    Packaging,
    Done,
    Error,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Starting => "starting",
            Phase::Analyzing => "analyzing",
            Phase::Reference => "reference",
            Phase::Club => "club",
            Phase::Streaming => "streaming",
            Phase::Premaster => "premaster",
            Phase::Custom => "custom",
            Phase::Packaging => "packaging",
            Phase::Done => "done",
            Phase::Error => "error",
        }
    }
}

/// Bounded per-target corrections applied by the advisor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Adjustment {
    #[serde(rename = "dI")]
    pub d_i: f64,
    #[serde(rename = "dTP")]
    pub d_tp: f64,
    #[serde(rename = "dLRA")]
    pub d_lra: f64,
}

/// Advisor snapshot published to pollers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdvisorSnapshot {
    /// Content fingerprint keying the persisted adjustment model.
    #[serde(default)]
    pub fingerprint: String,
    #[serde(rename = "input_I", default)]
    pub input_i: Option<f64>,
    #[serde(rename = "input_TP", default)]
    pub input_tp: Option<f64>,
    #[serde(rename = "input_LRA", default)]
    pub input_lra: Option<f64>,
    /// Applied deltas per target.
    #[serde(default)]
    pub adjustments: BTreeMap<String, Adjustment>,
}

/// The full progress document.
///
/// Every key is pre-populated by [`ProgressState::baseline`], so readers
/// never need to guard against absent fields. Within a session `percent`
/// is non-decreasing, `percent == 100` implies `done`, and the error state
/// is terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressState {
    pub percent: f64,
    pub phase: Phase,
    pub message: String,
    pub done: bool,
    pub error: Option<String>,
    pub downloads: BTreeMap<String, Option<String>>,
    pub metrics: BTreeMap<String, TargetMetrics>,
    pub advisor: AdvisorSnapshot,
    pub timeline: Timeline,
}

/// Download keys every session document carries, present from the start.
pub const DOWNLOAD_KEYS: &[&str] = &[
    "club",
    "club_report",
    "streaming",
    "streaming_report",
    "premaster",
    "premaster_report",
    "custom",
    "custom_report",
    "session",
    "bundle",
];

/// Metric keys every session document carries.
pub const METRIC_KEYS: &[&str] = &["club", "streaming", "premaster", "custom"];

impl ProgressState {
    /// Baseline document written when a session starts.
    pub fn baseline() -> Self {
        let downloads = DOWNLOAD_KEYS
            .iter()
            .map(|key| (key.to_string(), None))
            .collect();
        let metrics = METRIC_KEYS
            .iter()
            .map(|key| (key.to_string(), TargetMetrics::default()))
            .collect();
        Self {
            percent: 0.0,
            phase: Phase::Starting,
            message: "Starting…".to_string(),
            done: false,
            error: None,
            downloads,
            metrics,
            advisor: AdvisorSnapshot::default(),
            timeline: Timeline::default(),
        }
    }
}
