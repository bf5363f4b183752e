//! Tiny online linear model predicting bounded per-target corrections.
//!
//! Six outputs (dI/dTP/dLRA for the club and streaming targets) over a
//! five-element feature vector. Predictions are clamped to fixed safety
//! bounds; the true-peak delta can only tighten the ceiling, never relax
//! it upward.

use serde::{Deserialize, Serialize};

use crate::analysis::LoudnessReport;
use crate::journal::Adjustment;

/// Feature count: I, TP, LRA, crest proxy, flatness proxy.
pub const FEATURE_COUNT: usize = 5;

/// Output count: (dI, dTP, dLRA) x (club, streaming).
pub const OUTPUT_COUNT: usize = 6;

/// Safety bound for loudness and loudness-range deltas, LU.
pub const MAX_GAIN_DELTA: f64 = 0.8;

/// Safety bound for the true-peak delta, dB. Applied as [-MAX, 0].
pub const MAX_TP_DELTA: f64 = 0.2;

/// Duration bucket width for fingerprints, seconds.
const DURATION_BUCKET_SECS: f64 = 30.0;

/// Checksum prefix length used in fingerprints.
const FINGERPRINT_CHECKSUM_CHARS: usize = 16;

/// Feature vector derived from a pass-1 measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector {
    pub values: [f64; FEATURE_COUNT],
}

impl FeatureVector {
    /// Cheap derived quantities only: crest-factor proxy and a
    /// loudness-range-derived flatness proxy alongside the raw measures.
    pub fn from_report(report: &LoudnessReport) -> Self {
        let i = report.input_i;
        let tp = report.input_tp;
        let lra = report.input_lra;
        let crest = (-tp - i).max(0.0);
        let flatness = 1.0 / lra.max(1.0);
        Self {
            values: [i, tp, lra, crest, flatness],
        }
    }
}

/// Per-target predicted corrections.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TargetAdjustments {
    pub club: Adjustment,
    pub streaming: Adjustment,
}

/// Persisted regression parameters for one fingerprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdjustmentModel {
    pub version: u32,
    /// OUTPUT_COUNT rows of FEATURE_COUNT weights.
    pub weights: Vec<Vec<f64>>,
    pub bias: Vec<f64>,
    pub learning_rate: f64,
    /// Number of learning steps applied so far.
    pub updates: u64,
}

impl AdjustmentModel {
    /// Near-identity model used for unseen fingerprints: all-zero weights
    /// predict zero deltas until the first learning step.
    pub fn near_identity(learning_rate: f64) -> Self {
        Self {
            version: 1,
            weights: vec![vec![0.0; FEATURE_COUNT]; OUTPUT_COUNT],
            bias: vec![0.0; OUTPUT_COUNT],
            learning_rate,
            updates: 0,
        }
    }

    /// Whether the parameter shape matches the current feature layout.
    pub fn shape_valid(&self) -> bool {
        self.weights.len() == OUTPUT_COUNT
            && self.bias.len() == OUTPUT_COUNT
            && self.weights.iter().all(|row| row.len() == FEATURE_COUNT)
    }

    fn raw_output(&self, output: usize, features: &FeatureVector) -> f64 {
        let mut value = self.bias[output];
        for (weight, feature) in self.weights[output].iter().zip(features.values.iter()) {
            value += weight * feature;
        }
        value
    }

    /// Predict clamped per-target corrections.
    pub fn predict(&self, features: &FeatureVector) -> TargetAdjustments {
        let raw: Vec<f64> = (0..OUTPUT_COUNT)
            .map(|output| self.raw_output(output, features))
            .collect();
        TargetAdjustments {
            club: clamp_adjustment(raw[0], raw[1], raw[2]),
            streaming: clamp_adjustment(raw[3], raw[4], raw[5]),
        }
    }

    /// One online-learning step from realized error
    /// (`target - measured output` per learned quantity).
    ///
    /// The step mutates only the persisted parameters, so it affects
    /// future sessions sharing the fingerprint, never the render that
    /// produced the training signal.
    pub fn learn(&mut self, features: &FeatureVector, errors: &[f64; OUTPUT_COUNT]) {
        for (output, error) in errors.iter().enumerate() {
            if !error.is_finite() {
                continue;
            }
            for (weight, feature) in self.weights[output]
                .iter_mut()
                .zip(features.values.iter())
            {
                *weight += self.learning_rate * error * feature;
            }
            self.bias[output] += self.learning_rate * error;
        }
        self.updates += 1;
    }
}

/// Clamp raw predictions to the safety bounds.
pub fn clamp_adjustment(d_i: f64, d_tp: f64, d_lra: f64) -> Adjustment {
    Adjustment {
        d_i: finite_or_zero(d_i).clamp(-MAX_GAIN_DELTA, MAX_GAIN_DELTA),
        d_tp: finite_or_zero(d_tp).clamp(-MAX_TP_DELTA, 0.0),
        d_lra: finite_or_zero(d_lra).clamp(-MAX_GAIN_DELTA, MAX_GAIN_DELTA),
    }
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// Fingerprint keying the persisted model: content checksum prefix plus a
/// coarse duration bucket.
pub fn fingerprint(checksum: &str, duration_secs: f64) -> String {
    let prefix_len = FINGERPRINT_CHECKSUM_CHARS.min(checksum.len());
    let bucket = (duration_secs.max(0.0) / DURATION_BUCKET_SECS).floor() as u64;
    format!("{}-{}", &checksum[..prefix_len], bucket)
}
