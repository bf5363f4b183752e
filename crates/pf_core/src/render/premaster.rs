//! Peak-matched unlimited premaster.
//!
//! Measures the input sample peak and applies one static gain so the
//! output peak lands at a fixed ceiling. There is deliberately no
//! limiting or clipping stage: this is a headroom-preserving master for
//! further processing, not an omission.

use std::fs;
use std::path::Path;
use std::process::Command;

use crate::analysis::run_with_timeout;
use crate::models::PremasterSpec;

use super::renderer::{codec_for_bit_depth, part_path, publish, RenderError, RenderResult, Renderer};

/// Static gain that moves `input_peak_dbfs` to `ceiling_dbfs`.
pub fn premaster_gain_db(input_peak_dbfs: f64, ceiling_dbfs: f64) -> f64 {
    ceiling_dbfs - input_peak_dbfs
}

/// Result of a premaster render.
#[derive(Debug, Clone, Copy)]
pub struct PremasterRender {
    /// Sample peak of the input, dBFS.
    pub input_peak_dbfs: f64,
    /// Static gain applied, dB.
    pub gain_db: f64,
    /// Sample peak re-measured from the output, dBFS.
    pub output_peak_dbfs: f64,
}

impl Renderer {
    /// Render the unlimited premaster.
    pub fn render_premaster(
        &self,
        input: &Path,
        out_path: &Path,
        spec: &PremasterSpec,
    ) -> RenderResult<PremasterRender> {
        let input_peak_dbfs = self.analyzer().sample_peak(input)?;
        let gain_db = premaster_gain_db(input_peak_dbfs, spec.ceiling_dbfs);
        let filter = format!("volume={gain_db:.3}dB,aresample=resampler=soxr");
        let part = part_path(out_path);

        let mut cmd = Command::new(self.analyzer().ffmpeg_bin());
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

        let result = run_with_timeout(&mut cmd, "ffmpeg", self.analyzer().timeout());
        if let Err(e) = result {
            let _ = fs::remove_file(&part);
            return Err(RenderError::from(e));
        }
        publish(&part, out_path)?;

        let output_peak_dbfs = self.analyzer().sample_peak(out_path)?;
        Ok(PremasterRender {
            input_peak_dbfs,
            gain_db,
            output_peak_dbfs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gain_moves_peak_to_ceiling() {
        // -20 dBFS input, -6 dBFS ceiling: +14 dB of gain.
        assert!((premaster_gain_db(-20.0, -6.0) - 14.0).abs() < 1e-12);
        // Hot input gets attenuated.
        assert!((premaster_gain_db(-1.0, -6.0) - -5.0).abs() < 1e-12);
        // Input already at the ceiling: unity.
        assert_eq!(premaster_gain_db(-6.0, -6.0), 0.0);
    }

    #[test]
    fn gain_plus_peak_equals_ceiling_exactly() {
        for peak in [-30.0, -12.3, -6.05, -0.1] {
            let gain = premaster_gain_db(peak, -6.0);
            assert!((peak + gain - -6.0).abs() < 0.05);
        }
    }
}
