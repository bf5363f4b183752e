//! Render step for the loudness-normalized targets.
//!
//! One parameterized step instance per target (club, streaming, custom).
//! Each runs the two-pass renderer, verifies the result, applies at most
//! one closed-loop corrective re-render, and records the outcome.
//! A verification miss after the retry is non-fatal: the output is kept,
//! flagged `failed`, and the pipeline continues to the next target.

use serde_json::json;

use crate::journal::{Adjustment, Phase};
use crate::models::{LoudnessMetrics, RenderedOutput, TargetSpec, VerifyOutcome};
use crate::orchestrator::errors::{StepError, StepResult};
use crate::orchestrator::step::PipelineStep;
use crate::orchestrator::types::{Context, JobState, StepOutcome};
use crate::packaging::sha256_file;
use crate::render::Verification;

/// Which built-in loudness target this step renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MasterTarget {
    Club,
    Streaming,
    Custom,
}

impl MasterTarget {
    fn key(self) -> &'static str {
        match self {
            MasterTarget::Club => "club",
            MasterTarget::Streaming => "streaming",
            MasterTarget::Custom => "custom",
        }
    }
}

pub struct MasterStep {
    target: MasterTarget,
}

impl MasterStep {
    pub fn new(target: MasterTarget) -> Self {
        Self { target }
    }

    fn spec(&self, ctx: &Context) -> Option<TargetSpec> {
        match self.target {
            MasterTarget::Club => Some(ctx.settings.targets.club_spec()),
            MasterTarget::Streaming => Some(ctx.settings.targets.streaming_spec()),
            MasterTarget::Custom => ctx.settings.targets.custom_spec(),
        }
    }

    fn adjustment(&self, state: &JobState) -> Adjustment {
        let adjustments = state.adjustments.unwrap_or_default();
        match self.target {
            MasterTarget::Club => adjustments.club,
            MasterTarget::Streaming => adjustments.streaming,
            // The advisor only learns the built-in targets.
            MasterTarget::Custom => Adjustment::default(),
        }
    }
}

impl PipelineStep for MasterStep {
    fn name(&self) -> &str {
        match self.target {
            MasterTarget::Club => "Club",
            MasterTarget::Streaming => "Streaming",
            MasterTarget::Custom => "Custom",
        }
    }

    fn phase(&self) -> Phase {
        match self.target {
            MasterTarget::Club => Phase::Club,
            MasterTarget::Streaming => Phase::Streaming,
            MasterTarget::Custom => Phase::Custom,
        }
    }

    fn enter_percent(&self) -> f64 {
        match self.target {
            MasterTarget::Club => 45.0,
            MasterTarget::Streaming => 70.0,
            MasterTarget::Custom => 90.0,
        }
    }

    fn enter_message(&self) -> &str {
        match self.target {
            MasterTarget::Club => "Rendering Club…",
            MasterTarget::Streaming => "Rendering Streaming…",
            MasterTarget::Custom => "Rendering Custom…",
        }
    }

    fn validate_input(&self, ctx: &Context) -> StepResult<()> {
        if !ctx.session.input.path.is_file() {
            return Err(StepError::invalid_input("input file is missing"));
        }
        Ok(())
    }

    fn execute(&self, ctx: &Context, state: &mut JobState) -> StepResult<StepOutcome> {
        let Some(spec) = self.spec(ctx) else {
            return Ok(StepOutcome::Skipped("no custom preset configured".to_string()));
        };
        if !state.has_analysis() {
            return Err(StepError::precondition("analysis must run before rendering"));
        }

        let renderer = ctx.renderer();
        let verifier = ctx.verifier();
        let adjustment = self.adjustment(state);
        let filename = spec.output_filename();
        let out_path = ctx.session.output_path(&filename);

        let render = renderer.render_master(&ctx.session.input.path, &out_path, &spec, &adjustment)?;
        ctx.logger.info(&format!(
            "{}: effective I={:.2} TP={:.2} LRA={:.2}",
            self.name(),
            render.effective.i,
            render.effective.tp,
            render.effective.lra
        ));

        // Verify against the loudness actually aimed for; the true-peak
        // check uses the nominal spec ceiling, which is the hard bound.
        let mut verification = verifier.verify(&out_path, render.effective.i, spec.tp)?;
        if !verification.ok {
            ctx.logger.warn(&format!(
                "{} missed target (I={:.2}, TP={:.2}), applying one corrective render",
                self.name(),
                verification.measured_i,
                verification.measured_tp
            ));
            renderer.correct_master(&out_path, &spec, &render.effective)?;
            verification = verifier.verify(&out_path, render.effective.i, spec.tp)?;
        }

        let outcome = if verification.ok {
            VerifyOutcome::Ok
        } else {
            ctx.logger.warn(&format!(
                "{} still out of tolerance after retry, flagged failed",
                self.name()
            ));
            VerifyOutcome::Failed
        };

        let output = build_output(
            self.target.key(),
            &filename,
            &out_path,
            &spec,
            &report_metrics(&render.measured),
            &verification,
            outcome,
        )?;

        let key = self.target.key();
        ctx.journal.update(json!({
            "downloads": { key: filename },
            "metrics": {
                key: {
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
        let key = self.target.key();
        let Some(output) = state.output(key) else {
            return Err(StepError::invalid_output(format!("{key} output not recorded")));
        };
        if !ctx.session.output_path(&output.filename).is_file() {
            return Err(StepError::invalid_output(format!(
                "{key} output file missing"
            )));
        }
        Ok(())
    }
}

fn report_metrics(report: &crate::analysis::LoudnessReport) -> LoudnessMetrics {
    LoudnessMetrics {
        i: Some(report.input_i),
        tp: Some(report.input_tp),
        lra: Some(report.input_lra),
        threshold: Some(report.input_thresh),
        ..Default::default()
    }
}

fn build_output(
    key: &str,
    filename: &str,
    out_path: &std::path::Path,
    spec: &TargetSpec,
    input_metrics: &LoudnessMetrics,
    verification: &Verification,
    outcome: VerifyOutcome,
) -> StepResult<RenderedOutput> {
    let sha256 = sha256_file(out_path).map_err(|e| StepError::io("hash rendered output", e))?;
    let size = std::fs::metadata(out_path)
        .map_err(|e| StepError::io("stat rendered output", e))?
        .len();
    Ok(RenderedOutput {
        target: key.to_string(),
        filename: filename.to_string(),
        path: out_path.to_path_buf(),
        input: input_metrics.clone(),
        output: LoudnessMetrics {
            i: Some(verification.measured_i),
            tp: Some(verification.measured_tp),
            lra: Some(verification.measured_lra),
            threshold: Some(verification.threshold),
            sample_rate: Some(spec.sample_rate),
            bit_depth: Some(spec.bit_depth),
            ..Default::default()
        },
        sha256,
        size,
        verification: outcome,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_and_phases_line_up() {
        let club = MasterStep::new(MasterTarget::Club);
        assert_eq!(club.name(), "Club");
        assert_eq!(club.phase(), Phase::Club);
        assert_eq!(club.enter_percent(), 45.0);

        let streaming = MasterStep::new(MasterTarget::Streaming);
        assert_eq!(streaming.phase(), Phase::Streaming);
        assert_eq!(streaming.enter_percent(), 70.0);

        let custom = MasterStep::new(MasterTarget::Custom);
        assert_eq!(custom.enter_percent(), 90.0);
        assert_eq!(MasterTarget::Custom.key(), "custom");
    }

    #[test]
    fn custom_target_uses_no_adjustment() {
        let step = MasterStep::new(MasterTarget::Custom);
        let mut state = JobState::new();
        state.adjustments = Some(crate::advisor::TargetAdjustments {
            club: Adjustment {
                d_i: 0.5,
                d_tp: -0.1,
                d_lra: 0.2,
            },
            streaming: Adjustment::default(),
        });
        assert_eq!(step.adjustment(&state), Adjustment::default());

        let club = MasterStep::new(MasterTarget::Club);
        assert_eq!(club.adjustment(&state).d_i, 0.5);
    }
}
