//! Pipeline runner that executes steps strictly in sequence.

use super::errors::{PipelineError, PipelineResult, StepError};
use super::step::PipelineStep;
use super::types::{Context, JobState, StepOutcome};
use crate::journal::Phase;

/// Pipeline that runs a sequence of steps.
///
/// Stages execute strictly in sequence - later stages need complete
/// results from earlier ones and the external transform is itself a
/// single CPU/IO-bound job per invocation. A journal update is written at
/// every stage boundary, so pollers observe a monotonic, forward-only
/// percent sequence.
pub struct Pipeline {
    steps: Vec<Box<dyn PipelineStep>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    /// Add a step to the pipeline.
    pub fn add_step<S: PipelineStep + 'static>(&mut self, step: S) -> &mut Self {
        self.steps.push(Box::new(step));
        self
    }

    /// Add a step (builder pattern).
    pub fn with_step<S: PipelineStep + 'static>(mut self, step: S) -> Self {
        self.add_step(step);
        self
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|step| step.name()).collect()
    }

    /// Run all steps against the context and state.
    ///
    /// Any step error aborts the run; the caller transitions the journal
    /// to its terminal error state. Artifacts already on disk are left in
    /// place for diagnostics, not rolled back.
    pub fn run(&self, ctx: &Context, state: &mut JobState) -> PipelineResult<PipelineRunResult> {
        let mut result = PipelineRunResult {
            steps_completed: Vec::new(),
            steps_skipped: Vec::new(),
        };

        for step in &self.steps {
            let step_name = step.name();
            ctx.logger.phase(step_name);

            ctx.journal
                .advance(step.phase(), step.enter_percent(), step.enter_message())
                .map_err(|e| {
                    PipelineError::step_failed(&ctx.session.id, step_name, StepError::from(e))
                })?;

            if let Err(e) = step.validate_input(ctx) {
                ctx.logger.error(&format!("input validation failed: {e}"));
                return Err(PipelineError::step_failed(&ctx.session.id, step_name, e));
            }

            let outcome = step.execute(ctx, state).map_err(|e| {
                ctx.logger.error(&format!("execution failed: {e}"));
                PipelineError::step_failed(&ctx.session.id, step_name, e)
            })?;

            match outcome {
                StepOutcome::Success => {
                    if let Err(e) = step.validate_output(ctx, state) {
                        ctx.logger.error(&format!("output validation failed: {e}"));
                        return Err(PipelineError::step_failed(&ctx.session.id, step_name, e));
                    }
                    ctx.logger.success(&format!("{step_name} completed"));
                    result.steps_completed.push(step_name.to_string());
                }
                StepOutcome::Skipped(reason) => {
                    ctx.logger.info(&format!("{step_name} skipped: {reason}"));
                    result.steps_skipped.push(step_name.to_string());
                }
            }
        }

        ctx.journal
            .advance(Phase::Done, 100.0, "Ready")
            .map_err(|e| {
                PipelineError::step_failed(&ctx.session.id, "done", StepError::from(e))
            })?;
        ctx.logger.success("pipeline completed");
        Ok(result)
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of a pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineRunResult {
    pub steps_completed: Vec<String>,
    pub steps_skipped: Vec<String>,
}

impl PipelineRunResult {
    pub fn all_completed(&self) -> bool {
        self.steps_skipped.is_empty()
    }

    pub fn total_steps(&self) -> usize {
        self.steps_completed.len() + self.steps_skipped.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advisor::AdvisorStore;
    use crate::config::Settings;
    use crate::logging::SessionLogger;
    use crate::models::{InputDescriptor, Session};
    use crate::orchestrator::errors::StepResult;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    struct CountingStep {
        name: &'static str,
        percent: f64,
        executions: Arc<AtomicUsize>,
        fail: bool,
        skip: bool,
    }

    impl PipelineStep for CountingStep {
        fn name(&self) -> &str {
            self.name
        }

        fn phase(&self) -> Phase {
            Phase::Analyzing
        }

        fn enter_percent(&self) -> f64 {
            self.percent
        }

        fn enter_message(&self) -> &str {
            "working…"
        }

        fn validate_input(&self, _ctx: &Context) -> StepResult<()> {
            Ok(())
        }

        fn execute(&self, _ctx: &Context, _state: &mut JobState) -> StepResult<StepOutcome> {
            self.executions.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(StepError::precondition("forced failure"));
            }
            if self.skip {
                return Ok(StepOutcome::Skipped("nothing to do".to_string()));
            }
            Ok(StepOutcome::Success)
        }

        fn validate_output(&self, _ctx: &Context, _state: &JobState) -> StepResult<()> {
            Ok(())
        }
    }

    fn test_context(dir: &TempDir) -> Context {
        let root = dir.path().to_path_buf();
        let session = Session {
            id: "s-test".to_string(),
            root: root.clone(),
            input: InputDescriptor {
                filename: "in.wav".to_string(),
                path: root.join("in.wav"),
                sha256: "0".repeat(64),
                size: 4,
                duration_secs: Some(1.0),
                channels: Some(1),
                sample_rate: Some(48000),
            },
            created_at: "2026-01-01T00:00:00Z".to_string(),
        };
        let advisor = Arc::new(AdvisorStore::open(root.join("models"), 0.01).unwrap());
        let logger = Arc::new(SessionLogger::create(&root, "s-test").unwrap());
        let ctx = Context::new(session, Settings::default(), advisor, logger);
        ctx.journal.init().unwrap();
        ctx
    }

    fn step(name: &'static str, percent: f64) -> (CountingStep, Arc<AtomicUsize>) {
        let executions = Arc::new(AtomicUsize::new(0));
        (
            CountingStep {
                name,
                percent,
                executions: Arc::clone(&executions),
                fail: false,
                skip: false,
            },
            executions,
        )
    }

    #[test]
    fn run_executes_steps_in_order_and_finishes_at_100() {
        let dir = TempDir::new().unwrap();
        let ctx = test_context(&dir);
        let (first, first_count) = step("First", 5.0);
        let (second, second_count) = step("Second", 45.0);
        let pipeline = Pipeline::new().with_step(first).with_step(second);

        let mut state = JobState::new();
        let result = pipeline.run(&ctx, &mut state).unwrap();

        assert_eq!(first_count.load(Ordering::SeqCst), 1);
        assert_eq!(second_count.load(Ordering::SeqCst), 1);
        assert_eq!(result.steps_completed, vec!["First", "Second"]);
        assert!(result.all_completed());

        let progress = ctx.journal.read().unwrap();
        assert_eq!(progress.percent, 100.0);
        assert!(progress.done);
        assert_eq!(progress.phase, Phase::Done);
    }

    #[test]
    fn failure_stops_the_pipeline() {
        let dir = TempDir::new().unwrap();
        let ctx = test_context(&dir);
        let (later, later_count) = step("Later", 70.0);
        let pipeline = Pipeline::new()
            .with_step(CountingStep {
                name: "Broken",
                percent: 45.0,
                executions: Arc::new(AtomicUsize::new(0)),
                fail: true,
                skip: false,
            })
            .with_step(later);

        let mut state = JobState::new();
        let err = pipeline.run(&ctx, &mut state).unwrap_err();
        assert_eq!(err.stage_name(), "Broken");
        assert_eq!(later_count.load(Ordering::SeqCst), 0);

        // The journal is not terminal yet; the caller writes the error.
        let progress = ctx.journal.read().unwrap();
        assert_eq!(progress.percent, 45.0);
    }

    #[test]
    fn skipped_steps_are_reported_separately() {
        let dir = TempDir::new().unwrap();
        let ctx = test_context(&dir);
        let pipeline = Pipeline::new().with_step(CountingStep {
            name: "Optional",
            percent: 90.0,
            executions: Arc::new(AtomicUsize::new(0)),
            fail: false,
            skip: true,
        });

        let mut state = JobState::new();
        let result = pipeline.run(&ctx, &mut state).unwrap();
        assert_eq!(result.steps_skipped, vec!["Optional"]);
        assert!(!result.all_completed());
        assert_eq!(result.total_steps(), 1);
    }
}
