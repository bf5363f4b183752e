//! Package step - advisor feedback, checksums, manifest, reports,
//! descriptor, and the bundle archive.

use serde_json::json;

use crate::advisor::OUTPUT_COUNT;
use crate::journal::Phase;
use crate::models::RenderedOutput;
use crate::orchestrator::errors::{StepError, StepResult};
use crate::orchestrator::step::PipelineStep;
use crate::orchestrator::types::{Context, JobState, StepOutcome};
use crate::packaging::{
    build_descriptor, fmt_measure, write_bundle, write_descriptor, write_report, Manifest,
    BUNDLE_FILENAME, DESCRIPTOR_FILENAME,
};

pub struct PackageStep;

impl PackageStep {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PackageStep {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStep for PackageStep {
    fn name(&self) -> &str {
        "Package"
    }

    fn phase(&self) -> Phase {
        Phase::Packaging
    }

    fn enter_percent(&self) -> f64 {
        95.0
    }

    fn enter_message(&self) -> &str {
        "Packaging downloads…"
    }

    fn validate_input(&self, _ctx: &Context) -> StepResult<()> {
        Ok(())
    }

    fn execute(&self, ctx: &Context, state: &mut JobState) -> StepResult<StepOutcome> {
        if state.outputs.is_empty() {
            return Err(StepError::precondition("no rendered outputs to package"));
        }

        // Advisor feedback first: realized error per learned target. The
        // updated parameters only affect future sessions sharing the
        // fingerprint, so a store hiccup must not sink the packaging.
        self.feed_advisor(ctx, state);

        let mut manifest = Manifest::new();
        let mut bundle_members: Vec<String> = Vec::new();
        let mut download_patch = serde_json::Map::new();

        for output in &state.outputs {
            manifest.insert_file(&output.target, &output.path)?;
            bundle_members.push(output.filename.clone());

            let report_path = write_report(
                &output.path,
                &self.spec_line(ctx, output),
                &report_lines(output),
            )
            .map_err(|e| StepError::io("write target report", e))?;
            let report_key = format!("{}_report", output.target);
            manifest.insert_file(&report_key, &report_path)?;
            let report_name = report_path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            bundle_members.push(report_name.clone());
            download_patch.insert(report_key, json!(report_name));
        }

        // Machine-readable descriptor from the journal's current view.
        let progress = ctx.journal.read_value()?;
        let descriptor = build_descriptor(
            &ctx.session,
            &progress,
            &state.outputs,
            self.params(ctx, state),
        );
        let descriptor_path = write_descriptor(&ctx.session.root, &descriptor)?;
        manifest.insert_file("session", &descriptor_path)?;
        bundle_members.push(DESCRIPTOR_FILENAME.to_string());
        download_patch.insert("session".to_string(), json!(DESCRIPTOR_FILENAME));

        let bundle_path = write_bundle(&ctx.session.root, &bundle_members)?;
        manifest.insert_file("bundle", &bundle_path)?;
        download_patch.insert("bundle".to_string(), json!(BUNDLE_FILENAME));

        manifest.write(&ctx.session.root)?;
        ctx.logger
            .info(&format!("manifest: {} entries", manifest.len()));

        ctx.journal
            .update(json!({ "downloads": download_patch }))?;
        Ok(StepOutcome::Success)
    }

    fn validate_output(&self, ctx: &Context, _state: &JobState) -> StepResult<()> {
        if !ctx.session.manifest_path().is_file() {
            return Err(StepError::invalid_output("manifest not written"));
        }
        if !ctx.session.root.join(BUNDLE_FILENAME).is_file() {
            return Err(StepError::invalid_output("bundle not written"));
        }
        Ok(())
    }
}

impl PackageStep {
    fn spec_line(&self, ctx: &Context, output: &RenderedOutput) -> String {
        let targets = &ctx.settings.targets;
        match output.target.as_str() {
            "club" => targets.club_spec().spec_line(),
            "streaming" => targets.streaming_spec().spec_line(),
            "custom" => targets
                .custom_spec()
                .map(|spec| spec.spec_line())
                .unwrap_or_default(),
            "premaster" => targets.premaster_spec().spec_line(),
            _ => String::new(),
        }
    }

    fn params(&self, ctx: &Context, state: &JobState) -> serde_json::Value {
        let targets = &ctx.settings.targets;
        let mut params = serde_json::Map::new();
        for output in &state.outputs {
            let value = match output.target.as_str() {
                "club" => serde_json::to_value(targets.club_spec()).ok(),
                "streaming" => serde_json::to_value(targets.streaming_spec()).ok(),
                "custom" => targets
                    .custom_spec()
                    .and_then(|spec| serde_json::to_value(spec).ok()),
                "premaster" => serde_json::to_value(targets.premaster_spec()).ok(),
                _ => None,
            };
            if let Some(value) = value {
                params.insert(output.target.clone(), value);
            }
        }
        serde_json::Value::Object(params)
    }

    fn feed_advisor(&self, ctx: &Context, state: &JobState) {
        if !ctx.settings.advisor.enabled {
            return;
        }
        let (Some(fingerprint), Some(features)) = (&state.fingerprint, &state.features) else {
            return;
        };

        let targets = &ctx.settings.targets;
        let mut errors = [0.0; OUTPUT_COUNT];
        if let Some(club) = state.output("club") {
            errors[0] = realized_error(targets.club_i, club.output.i);
            errors[1] = realized_error(targets.club_tp, club.output.tp);
            errors[2] = realized_error(targets.club_lra, club.output.lra);
        }
        if let Some(streaming) = state.output("streaming") {
            errors[3] = realized_error(targets.streaming_i, streaming.output.i);
            errors[4] = realized_error(targets.streaming_tp, streaming.output.tp);
            errors[5] = realized_error(targets.streaming_lra, streaming.output.lra);
        }

        if let Err(e) = ctx.advisor.learn(fingerprint, features, &errors) {
            ctx.logger.warn(&format!("advisor update failed: {e}"));
        }
    }
}

/// `target - measured`; zero when the measurement is missing.
fn realized_error(target: f64, measured: Option<f64>) -> f64 {
    measured.map(|value| target - value).unwrap_or(0.0)
}

fn report_lines(output: &RenderedOutput) -> Vec<String> {
    let metrics = &output.output;
    let mut lines = Vec::new();
    if output.target == "premaster" {
        lines.push(format!(
            "Sample Peak (dBFS): {}",
            fmt_measure(metrics.peak_dbfs)
        ));
    }
    lines.push(format!(
        "Integrated Loudness (LUFS-I): {}",
        fmt_measure(metrics.i)
    ));
    lines.push(format!("True Peak (dBTP): {}", fmt_measure(metrics.tp)));
    lines.push(format!("Loudness Range (LRA): {}", fmt_measure(metrics.lra)));
    lines.push(format!(
        "Verification: {}",
        match output.verification {
            crate::models::VerifyOutcome::Ok => "ok",
            crate::models::VerifyOutcome::Failed => "failed",
        }
    ));
    lines
}
