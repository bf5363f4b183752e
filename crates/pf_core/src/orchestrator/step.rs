//! Pipeline step trait definition.

use crate::journal::Phase;

use super::errors::StepResult;
use super::types::{Context, JobState, StepOutcome};

/// Trait for pipeline steps.
///
/// The pipeline runner calls these methods in order:
///
/// 1. `validate_input` - check preconditions before execution
/// 2. `execute` - perform the step's work
/// 3. `validate_output` - verify the step produced valid output
///
/// Each step also advertises the phase, percent and message the journal
/// shows while it runs, producing the forward-only percent ladder
/// observable by pollers.
pub trait PipelineStep: Send + Sync {
    /// Step name for logging and error context.
    fn name(&self) -> &str;

    /// Journal phase shown while this step runs.
    fn phase(&self) -> Phase;

    /// Journal percent at step entry.
    fn enter_percent(&self) -> f64;

    /// Journal message at step entry.
    fn enter_message(&self) -> &str;

    /// Validate inputs before execution.
    fn validate_input(&self, ctx: &Context) -> StepResult<()>;

    /// Execute the step's main work, recording results in `state`.
    fn execute(&self, ctx: &Context, state: &mut JobState) -> StepResult<StepOutcome>;

    /// Validate outputs after a successful execution.
    fn validate_output(&self, ctx: &Context, state: &JobState) -> StepResult<()>;
}
