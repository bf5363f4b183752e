//! Premaster step - the peak-matched unlimited rendition.

use serde_json::json;

use crate::journal::Phase;
use crate::models::{LoudnessMetrics, RenderedOutput, VerifyOutcome};
use crate::orchestrator::errors::{StepError, StepResult};
use crate::orchestrator::step::PipelineStep;
use crate::orchestrator::types::{Context, JobState, StepOutcome};
use crate::packaging::sha256_file;

/// Acceptable distance between the output sample peak and the ceiling.
/// No retry exists for the premaster; a larger miss is only flagged.
pub const PEAK_TOLERANCE_DB: f64 = 0.25;

pub struct PremasterStep;

impl PremasterStep {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PremasterStep {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStep for PremasterStep {
    fn name(&self) -> &str {
        "Premaster"
    }

    fn phase(&self) -> Phase {
        Phase::Premaster
    }

    fn enter_percent(&self) -> f64 {
        85.0
    }

    fn enter_message(&self) -> &str {
        "Preparing Unlimited Premaster…"
    }

    fn validate_input(&self, ctx: &Context) -> StepResult<()> {
        if !ctx.session.input.path.is_file() {
            return Err(StepError::invalid_input("input file is missing"));
        }
        Ok(())
    }

    fn execute(&self, ctx: &Context, state: &mut JobState) -> StepResult<StepOutcome> {
        let spec = ctx.settings.targets.premaster_spec();
        let renderer = ctx.renderer();
        let filename = spec.output_filename();
        let out_path = ctx.session.output_path(&filename);

        let render = renderer.render_premaster(&ctx.session.input.path, &out_path, &spec)?;
        ctx.logger.info(&format!(
            "premaster: peak {:.2} dBFS -> {:.2} dBFS ({:+.2} dB gain)",
            render.input_peak_dbfs, render.output_peak_dbfs, render.gain_db
        ));

        // Loudness figures on the premaster are informational only.
        let loudness = ctx.analyzer().scan(&out_path).ok();

        let outcome = if (render.output_peak_dbfs - spec.ceiling_dbfs).abs() <= PEAK_TOLERANCE_DB
        {
            VerifyOutcome::Ok
        } else {
            ctx.logger.warn(&format!(
                "premaster peak landed at {:.2} dBFS (ceiling {:.2}), flagged failed",
                render.output_peak_dbfs, spec.ceiling_dbfs
            ));
            VerifyOutcome::Failed
        };

        let sha256 =
            sha256_file(&out_path).map_err(|e| StepError::io("hash rendered output", e))?;
        let size = std::fs::metadata(&out_path)
            .map_err(|e| StepError::io("stat rendered output", e))?
            .len();

        let output = RenderedOutput {
            target: "premaster".to_string(),
            filename: filename.clone(),
            path: out_path,
            input: LoudnessMetrics {
                peak_dbfs: Some(render.input_peak_dbfs),
                ..Default::default()
            },
            output: LoudnessMetrics {
                peak_dbfs: Some(render.output_peak_dbfs),
                i: loudness.map(|report| report.input_i),
                tp: loudness.map(|report| report.input_tp),
                lra: loudness.map(|report| report.input_lra),
                sample_rate: Some(spec.sample_rate),
                bit_depth: Some(spec.bit_depth),
                ..Default::default()
            },
            sha256,
            size,
            verification: outcome,
        };

        ctx.journal.update(json!({
            "downloads": { "premaster": filename },
            "metrics": {
                "premaster": {
                    "input": &output.input,
                    "output": &output.output,
                    "verification": outcome,
                }
            },
        }))?;

        state.outputs.push(output);
        Ok(StepOutcome::Success)
    }

    fn validate_output(&self, ctx: &Context, state: &JobState) -> StepResult<()> {
        let Some(output) = state.output("premaster") else {
            return Err(StepError::invalid_output("premaster output not recorded"));
        };
        if !ctx.session.output_path(&output.filename).is_file() {
            return Err(StepError::invalid_output("premaster output file missing"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_metadata_matches_ladder() {
        let step = PremasterStep::new();
        assert_eq!(step.name(), "Premaster");
        assert_eq!(step.phase(), Phase::Premaster);
        assert_eq!(step.enter_percent(), 85.0);
    }

    #[test]
    fn peak_tolerance_is_tight() {
        assert!(PEAK_TOLERANCE_DB < 0.5);
    }
}
