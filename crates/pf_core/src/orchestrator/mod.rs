//! Session orchestration: a sequential state machine driving
//! analyze → reference → render → verify → package per session, with a
//! journal update at every transition.
//!
//! # Architecture
//!
//! ```text
//! Pipeline
//!     ├── Step: Analyze     (measure input, build timeline)
//!     ├── Step: Reference   (fingerprint, advisor corrections)
//!     ├── Step: Club        (two-pass render + verify)
//!     ├── Step: Streaming   (two-pass render + verify)
//!     ├── Step: Premaster   (peak-matched, unlimited)
//!     ├── Step: Custom      (optional preset)
//!     └── Step: Package     (checksums, manifest, reports, bundle)
//! ```
//!
//! Sessions run on a bounded worker pool; exactly one pipeline instance
//! ever touches a given session directory.

mod errors;
mod pipeline;
mod step;
pub mod steps;
mod types;
mod workers;

pub use errors::{PipelineError, PipelineResult, StepError, StepResult};
pub use pipeline::{Pipeline, PipelineRunResult};
pub use step::PipelineStep;
pub use steps::{AnalyzeStep, MasterStep, MasterTarget, PackageStep, PremasterStep, ReferenceStep};
pub use types::{Context, JobState, StepOutcome};
pub use workers::{create_standard_pipeline, process_session, SessionWorkers, SubmitError};
