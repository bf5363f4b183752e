//! Post-render verification against the target.

use std::path::Path;

use crate::analysis::{AnalysisResult, Analyzer};

/// Tolerance on integrated loudness, LU.
pub const I_TOLERANCE_LU: f64 = 0.3;

/// Tolerance above the true-peak ceiling, dB.
pub const TP_TOLERANCE_DB: f64 = 0.2;

/// Result of re-measuring a rendered file.
#[derive(Debug, Clone, Copy)]
pub struct Verification {
    pub ok: bool,
    pub measured_i: f64,
    pub measured_tp: f64,
    pub measured_lra: f64,
    pub threshold: f64,
}

/// Tolerance check shared by the verifier and its tests.
pub fn within_tolerance(measured_i: f64, measured_tp: f64, target_i: f64, target_tp: f64) -> bool {
    measured_tp <= target_tp + TP_TOLERANCE_DB && (measured_i - target_i).abs() <= I_TOLERANCE_LU
}

/// Re-measures renders and judges them against their targets.
#[derive(Debug, Clone)]
pub struct Verifier {
    analyzer: Analyzer,
}

impl Verifier {
    pub fn new(analyzer: Analyzer) -> Self {
        Self { analyzer }
    }

    /// Re-analyze `path` and compare against the target values.
    pub fn verify(
        &self,
        path: &Path,
        target_i: f64,
        target_tp: f64,
    ) -> AnalysisResult<Verification> {
        let report = self.analyzer.scan(path)?;
        Ok(Verification {
            ok: within_tolerance(report.input_i, report.input_tp, target_i, target_tp),
            measured_i: report.input_i,
            measured_tp: report.input_tp,
            measured_lra: report.input_lra,
            threshold: report.input_thresh,
        })
    }
}
