//! Data model types shared across the mastering pipeline.

mod metrics;
mod session;
mod specs;

pub use metrics::{LoudnessMetrics, RenderedOutput, TargetMetrics, Timeline, VerifyOutcome};
pub use session::{InputDescriptor, Session};
pub use specs::{PremasterSpec, TargetSpec};
