//! Analyze step - measures the input and builds the timeline.
//!
//! Also the last line of defense for uploads the probe could not judge at
//! upload time: a file that turns out to be over the duration bound, have
//! an unsupported channel layout, or contain no measurable audio fails
//! the session here, into the journal's terminal error state.

use serde_json::json;

use crate::journal::Phase;
use crate::orchestrator::errors::{StepError, StepResult};
use crate::orchestrator::step::PipelineStep;
use crate::orchestrator::types::{Context, JobState, StepOutcome};

pub struct AnalyzeStep;

impl AnalyzeStep {
    pub fn new() -> Self {
        Self
    }
}

impl Default for AnalyzeStep {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStep for AnalyzeStep {
    fn name(&self) -> &str {
        "Analyze"
    }

    fn phase(&self) -> Phase {
        Phase::Analyzing
    }

    fn enter_percent(&self) -> f64 {
        5.0
    }

    fn enter_message(&self) -> &str {
        "Analyzing input…"
    }

    fn validate_input(&self, ctx: &Context) -> StepResult<()> {
        let input = &ctx.session.input.path;
        if !input.is_file() {
            return Err(StepError::invalid_input("input file is missing"));
        }
        let size = std::fs::metadata(input)
            .map_err(|e| StepError::io("stat input file", e))?
            .len();
        if size == 0 {
            return Err(StepError::invalid_input("input file is empty"));
        }
        Ok(())
    }

    fn execute(&self, ctx: &Context, state: &mut JobState) -> StepResult<StepOutcome> {
        let analyzer = ctx.analyzer();
        let input = &ctx.session.input.path;

        // Deep validation deferred from upload time.
        match analyzer.probe(input) {
            Ok(info) => {
                if let Some(duration) = info.duration_secs {
                    let limit = ctx.settings.upload.max_duration_secs;
                    if duration > limit {
                        return Err(StepError::invalid_input(format!(
                            "duration exceeds {:.0} minutes limit",
                            limit / 60.0
                        )));
                    }
                }
                if let Some(channels) = info.channels {
                    if channels == 0 || channels > ctx.settings.upload.max_channels {
                        return Err(StepError::invalid_input("unsupported channel layout"));
                    }
                }
            }
            Err(e) => {
                // Leave the verdict to the measurement pass below.
                ctx.logger.warn(&format!("probe failed: {e}"));
            }
        }

        let report = analyzer.scan(input)?;
        ctx.logger.info(&format!(
            "input: I={:.2} LUFS, TP={:.2} dBTP, LRA={:.2} LU",
            report.input_i, report.input_tp, report.input_lra
        ));

        let timeline = analyzer.timeline(input)?;
        ctx.logger
            .info(&format!("timeline: {} windows", timeline.sec.len()));

        ctx.journal.update(json!({
            "advisor": {
                "input_I": report.input_i,
                "input_TP": report.input_tp,
                "input_LRA": report.input_lra,
            },
            "timeline": &timeline,
        }))?;

        state.report = Some(report);
        state.timeline = Some(timeline);
        Ok(StepOutcome::Success)
    }

    fn validate_output(&self, _ctx: &Context, state: &JobState) -> StepResult<()> {
        if !state.has_analysis() {
            return Err(StepError::invalid_output("analysis not recorded"));
        }
        Ok(())
    }
}
