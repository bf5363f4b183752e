//! Two-pass loudness rendering.
//!
//! Pass 1 measures the input; pass 2 hands the measured values back to
//! the transform so it applies an analytically-derived linear gain (its
//! own two-pass filter design) instead of re-measuring blind. Resampling
//! and bit-depth conversion happen in the same invocation. Output is
//! written to a `.part` path and published by rename, so no
//! partially-written media file is ever visible.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;

use crate::advisor::clamp_adjustment;
use crate::analysis::{run_with_timeout, AnalysisError, Analyzer, LoudnessReport, ToolError};
use crate::journal::Adjustment;
use crate::models::TargetSpec;

/// Errors from rendering operations.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error("transform produced no output at {path}")]
    EmptyOutput { path: String },

    #[error("I/O error in {operation}: {source}")]
    Io {
        operation: String,
        #[source]
        source: io::Error,
    },
}

impl RenderError {
    fn io(operation: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }
}

pub type RenderResult<T> = Result<T, RenderError>;

/// Targets actually handed to the transform after advisor correction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectiveTargets {
    pub i: f64,
    pub tp: f64,
    pub lra: f64,
}

/// Apply a (re-clamped) advisor correction to a nominal spec.
///
/// The true-peak ceiling can only move down: `min(tp, tp + d_tp)` with
/// `d_tp` already clamped non-positive keeps the nominal ceiling as a
/// hard upper bound.
pub fn effective_targets(spec: &TargetSpec, adjustment: &Adjustment) -> EffectiveTargets {
    let clamped = clamp_adjustment(adjustment.d_i, adjustment.d_tp, adjustment.d_lra);
    EffectiveTargets {
        i: spec.i + clamped.d_i,
        tp: spec.tp.min(spec.tp + clamped.d_tp),
        lra: spec.lra + clamped.d_lra,
    }
}

/// Result of one completed render pass.
#[derive(Debug, Clone)]
pub struct MasterRender {
    /// Pass-1 measurement the gain was derived from.
    pub measured: LoudnessReport,
    /// Targets handed to the transform.
    pub effective: EffectiveTargets,
}

/// Wrapper around the external rendering transform.
#[derive(Debug, Clone)]
pub struct Renderer {
    analyzer: Analyzer,
}

impl Renderer {
    pub fn new(analyzer: Analyzer) -> Self {
        Self { analyzer }
    }

    pub fn analyzer(&self) -> &Analyzer {
        &self.analyzer
    }

    /// Render one loudness-normalized master.
    pub fn render_master(
        &self,
        input: &Path,
        out_path: &Path,
        spec: &TargetSpec,
        adjustment: &Adjustment,
    ) -> RenderResult<MasterRender> {
        let measured = self
            .analyzer
            .scan_with_targets(input, spec.i, spec.tp, spec.lra)?;
        let effective = effective_targets(spec, adjustment);
        self.render_pass(input, out_path, spec, &effective, &measured)?;
        Ok(MasterRender {
            measured,
            effective,
        })
    }

    /// Closed-loop correction: re-render using a fresh pass-1 measurement
    /// taken from the first-pass output.
    pub fn correct_master(
        &self,
        first_pass_output: &Path,
        spec: &TargetSpec,
        effective: &EffectiveTargets,
    ) -> RenderResult<LoudnessReport> {
        let measured =
            self.analyzer
                .scan_with_targets(first_pass_output, effective.i, effective.tp, effective.lra)?;
        // Render to a sibling path, then replace the first-pass output.
        let corrected = first_pass_output.with_extension("correct.wav");
        self.render_pass(first_pass_output, &corrected, spec, effective, &measured)?;
        fs::rename(&corrected, first_pass_output)
            .map_err(|e| RenderError::io("replace corrected output", e))?;
        Ok(measured)
    }

    fn render_pass(
        &self,
        input: &Path,
        out_path: &Path,
        spec: &TargetSpec,
        effective: &EffectiveTargets,
        measured: &LoudnessReport,
    ) -> RenderResult<()> {
        let filter = format!(
            "{},aresample=resampler=soxr",
            loudnorm_filter(effective, measured)
        );
        let part = part_path(out_path);

        let mut cmd = Command::new(self.analyzer.ffmpeg_bin());
        cmd.arg("-y")
            .arg("-nostats")
            .arg("-hide_banner")
            .arg("-i")
            .arg(input)
            .arg("-filter:a")
            .arg(&filter)
            .arg("-ar")
            .arg(spec.sample_rate.to_string())
            .arg("-c:a")
            .arg(codec_for_bit_depth(spec.bit_depth))
            .arg(&part);

        let result = run_with_timeout(&mut cmd, "ffmpeg", self.analyzer.timeout());
        if let Err(e) = result {
            let _ = fs::remove_file(&part);
            return Err(e.into());
        }

        publish(&part, out_path)
    }
}

/// Build the second-pass filter from the pass-1 measurement.
fn loudnorm_filter(effective: &EffectiveTargets, measured: &LoudnessReport) -> String {
    format!(
        "loudnorm=I={i:.2}:TP={tp:.2}:LRA={lra:.2}:\
         measured_I={mi:.2}:measured_TP={mtp:.2}:measured_LRA={mlra:.2}:\
         measured_thresh={mth:.2}:offset={off:.2}:\
         linear=true:dual_mono=true:print_format=json",
        i = effective.i,
        tp = effective.tp,
        lra = effective.lra,
        mi = measured.input_i,
        mtp = measured.input_tp,
        mlra = measured.input_lra,
        mth = measured.input_thresh,
        off = measured.target_offset,
    )
}

pub(crate) fn codec_for_bit_depth(bit_depth: u16) -> &'static str {
    match bit_depth {
        16 => "pcm_s16le",
        _ => "pcm_s24le",
    }
}

pub(crate) fn part_path(out_path: &Path) -> PathBuf {
    let mut name = out_path.as_os_str().to_os_string();
    name.push(".part");
    PathBuf::from(name)
}

/// Check the temp output and atomically publish it.
pub(crate) fn publish(part: &Path, out_path: &Path) -> RenderResult<()> {
    let size = fs::metadata(part)
        .map_err(|e| RenderError::io("stat rendered output", e))?
        .len();
    if size == 0 {
        let _ = fs::remove_file(part);
        return Err(RenderError::EmptyOutput {
            path: out_path.display().to_string(),
        });
    }
    fs::rename(part, out_path).map_err(|e| RenderError::io("publish rendered output", e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> TargetSpec {
        TargetSpec::club(-7.2, -0.8, 7.0, 48000, 24)
    }

    fn report() -> LoudnessReport {
        LoudnessReport {
            input_i: -20.0,
            input_tp: -6.0,
            input_lra: 0.1,
            input_thresh: -30.0,
            target_offset: 0.0,
        }
    }

    #[test]
    fn effective_tp_never_exceeds_nominal_ceiling() {
        // Positive deltas are clamped away entirely.
        let up = Adjustment {
            d_tp: 0.5,
            ..Default::default()
        };
        assert_eq!(effective_targets(&spec(), &up).tp, -0.8);

        // Negative deltas tighten the ceiling.
        let down = Adjustment {
            d_tp: -0.1,
            ..Default::default()
        };
        let effective = effective_targets(&spec(), &down);
        assert!((effective.tp - -0.9).abs() < 1e-9);
        assert!(effective.tp <= spec().tp);
    }

    #[test]
    fn effective_targets_apply_clamped_deltas() {
        let adjustment = Adjustment {
            d_i: 2.0,   // clamps to 0.8
            d_tp: 0.0,
            d_lra: -2.0, // clamps to -0.8
        };
        let effective = effective_targets(&spec(), &adjustment);
        assert!((effective.i - -6.4).abs() < 1e-9);
        assert!((effective.lra - 6.2).abs() < 1e-9);
    }

    #[test]
    fn filter_carries_measured_values_for_linear_pass() {
        let effective = effective_targets(&spec(), &Adjustment::default());
        let filter = loudnorm_filter(&effective, &report());
        assert!(filter.contains("I=-7.20"));
        assert!(filter.contains("TP=-0.80"));
        assert!(filter.contains("measured_I=-20.00"));
        assert!(filter.contains("measured_TP=-6.00"));
        assert!(filter.contains("linear=true"));
        assert!(filter.contains("print_format=json"));
    }

    #[test]
    fn codec_follows_bit_depth() {
        assert_eq!(codec_for_bit_depth(24), "pcm_s24le");
        assert_eq!(codec_for_bit_depth(16), "pcm_s16le");
    }

    #[test]
    fn part_path_appends_suffix() {
        let part = part_path(Path::new("/x/club_master.wav"));
        assert_eq!(part, Path::new("/x/club_master.wav.part"));
    }

    #[test]
    fn publish_rejects_empty_output() {
        let dir = tempfile::TempDir::new().unwrap();
        let out = dir.path().join("out.wav");
        let part = part_path(&out);
        fs::write(&part, b"").unwrap();
        let err = publish(&part, &out).unwrap_err();
        assert!(matches!(err, RenderError::EmptyOutput { .. }));
        assert!(!out.exists());
        assert!(!part.exists());
    }

    #[test]
    fn publish_renames_nonempty_output() {
        let dir = tempfile::TempDir::new().unwrap();
        let out = dir.path().join("out.wav");
        let part = part_path(&out);
        fs::write(&part, b"RIFF....").unwrap();
        publish(&part, &out).unwrap();
        assert!(out.exists());
        assert!(!part.exists());
    }
}
