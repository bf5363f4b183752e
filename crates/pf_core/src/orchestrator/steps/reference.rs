//! Reference step - fingerprints the content and asks the advisor for
//! bounded per-target corrections.

use serde_json::json;

use crate::advisor::{fingerprint, FeatureVector, TargetAdjustments};
use crate::journal::Phase;
use crate::orchestrator::errors::{StepError, StepResult};
use crate::orchestrator::step::PipelineStep;
use crate::orchestrator::types::{Context, JobState, StepOutcome};

pub struct ReferenceStep;

impl ReferenceStep {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ReferenceStep {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStep for ReferenceStep {
    fn name(&self) -> &str {
        "Reference"
    }

    fn phase(&self) -> Phase {
        Phase::Reference
    }

    fn enter_percent(&self) -> f64 {
        15.0
    }

    fn enter_message(&self) -> &str {
        "Dialing in reference curve…"
    }

    fn validate_input(&self, _ctx: &Context) -> StepResult<()> {
        Ok(())
    }

    fn execute(&self, ctx: &Context, state: &mut JobState) -> StepResult<StepOutcome> {
        let report = state
            .report
            .as_ref()
            .ok_or_else(|| StepError::precondition("analysis must run before reference"))?;

        let duration = ctx
            .session
            .input
            .duration_secs
            .or_else(|| {
                state
                    .timeline
                    .as_ref()
                    .and_then(|timeline| timeline.sec.last().copied())
            })
            .unwrap_or(0.0);
        let key = fingerprint(&ctx.session.input.sha256, duration);
        let features = FeatureVector::from_report(report);

        state.fingerprint = Some(key.clone());
        state.features = Some(features);

        if !ctx.settings.advisor.enabled {
            state.adjustments = Some(TargetAdjustments::default());
            ctx.journal
                .update(json!({"advisor": {"fingerprint": key}}))?;
            return Ok(StepOutcome::Skipped("advisor disabled".to_string()));
        }

        let adjustments = ctx.advisor.predict(&key, &features)?;
        ctx.logger.info(&format!(
            "advisor {key}: club dI={:+.2} dTP={:+.2}, streaming dI={:+.2} dTP={:+.2}",
            adjustments.club.d_i,
            adjustments.club.d_tp,
            adjustments.streaming.d_i,
            adjustments.streaming.d_tp
        ));

        ctx.journal.update(json!({
            "advisor": {
                "fingerprint": key,
                "adjustments": {
                    "club": adjustments.club,
                    "streaming": adjustments.streaming,
                },
            }
        }))?;

        state.adjustments = Some(adjustments);
        Ok(StepOutcome::Success)
    }

    fn validate_output(&self, _ctx: &Context, state: &JobState) -> StepResult<()> {
        if state.adjustments.is_none() {
            return Err(StepError::invalid_output("adjustments not recorded"));
        }
        Ok(())
    }
}
