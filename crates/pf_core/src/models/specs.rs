//! Target specifications for the rendered masters.

use serde::{Deserialize, Serialize};

/// A loudness-normalization target: integrated loudness, true-peak ceiling,
/// loudness range, and output format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetSpec {
    /// Target name, also used as the download/metrics key.
    pub name: String,
    /// Integrated loudness target in LUFS.
    pub i: f64,
    /// True-peak ceiling in dBTP.
    pub tp: f64,
    /// Loudness-range target in LU.
    pub lra: f64,
    /// Output sample rate in Hz.
    pub sample_rate: u32,
    /// Output bit depth (16 or 24).
    pub bit_depth: u16,
}

impl TargetSpec {
    /// Built-in club master target: loud, 48 kHz / 24-bit.
    pub fn club(i: f64, tp: f64, lra: f64, sample_rate: u32, bit_depth: u16) -> Self {
        Self {
            name: "club".to_string(),
            i,
            tp,
            lra,
            sample_rate,
            bit_depth,
        }
    }

    /// Built-in streaming master target. The true-peak ceiling is a
    /// configuration parameter (platforms disagree between -1.0 and -1.5).
    pub fn streaming(i: f64, tp: f64, lra: f64, sample_rate: u32, bit_depth: u16) -> Self {
        Self {
            name: "streaming".to_string(),
            i,
            tp,
            lra,
            sample_rate,
            bit_depth,
        }
    }

    /// Canonical output filename for this target.
    pub fn output_filename(&self) -> String {
        format!("{}_master.wav", self.name)
    }

    /// One-line description used in the per-target report.
    pub fn spec_line(&self) -> String {
        format!(
            "{} — {} kHz, {}-bit WAV, target {:.1} LUFS-I, TP ≤ {:.1} dBTP",
            capitalize(&self.name),
            self.sample_rate as f64 / 1000.0,
            self.bit_depth,
            self.i,
            self.tp
        )
    }
}

/// The peak-only "unlimited" premaster: one static gain lands the sample
/// peak at a fixed ceiling. No loudness target and, deliberately, no
/// limiting stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PremasterSpec {
    /// Sample-peak ceiling in dBFS.
    pub ceiling_dbfs: f64,
    /// Output sample rate in Hz.
    pub sample_rate: u32,
    /// Output bit depth.
    pub bit_depth: u16,
}

impl PremasterSpec {
    pub const KEY: &'static str = "premaster";

    pub fn output_filename(&self) -> String {
        "premaster_unlimited.wav".to_string()
    }

    pub fn spec_line(&self) -> String {
        format!(
            "Unlimited Premaster — {} kHz, {}-bit WAV, limiter OFF, peaks ≈ {:.1} dBFS (sample peak)",
            self.sample_rate as f64 / 1000.0,
            self.bit_depth,
            self.ceiling_dbfs
        )
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn club_filename_is_canonical() {
        let spec = TargetSpec::club(-7.2, -0.8, 7.0, 48000, 24);
        assert_eq!(spec.output_filename(), "club_master.wav");
    }

    #[test]
    fn spec_line_mentions_format() {
        let spec = TargetSpec::streaming(-9.5, -1.0, 9.0, 44100, 24);
        let line = spec.spec_line();
        assert!(line.contains("44.1 kHz"));
        assert!(line.contains("24-bit"));
        assert!(line.contains("-1.0 dBTP"));
    }

    #[test]
    fn premaster_spec_line_disclaims_limiter() {
        let spec = PremasterSpec {
            ceiling_dbfs: -6.0,
            sample_rate: 48000,
            bit_depth: 24,
        };
        assert!(spec.spec_line().contains("limiter OFF"));
    }
}
