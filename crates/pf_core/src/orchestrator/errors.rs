//! Error types for the orchestrator pipeline.
//!
//! Errors carry context that chains through layers:
//! Session → Step → Operation → Detail.
//!
//! The full chain goes to the session log and `tracing`; pollers only see
//! the short message from [`StepError::public_message`].

use std::io;

use thiserror::Error;

use crate::advisor::AdvisorError;
use crate::analysis::{AnalysisError, ToolError};
use crate::journal::JournalError;
use crate::packaging::PackagingError;
use crate::render::RenderError;

/// Top-level pipeline error with session context.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A step failed during execution.
    #[error("session '{session_id}' failed at step '{step_name}': {source}")]
    StepFailed {
        session_id: String,
        step_name: String,
        #[source]
        source: StepError,
    },

    /// Failed to set up the session (directories, logger).
    #[error("session '{session_id}' setup failed: {message}")]
    SetupFailed { session_id: String, message: String },
}

impl PipelineError {
    pub fn step_failed(
        session_id: impl Into<String>,
        step_name: impl Into<String>,
        source: StepError,
    ) -> Self {
        Self::StepFailed {
            session_id: session_id.into(),
            step_name: step_name.into(),
            source,
        }
    }

    pub fn setup_failed(session_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SetupFailed {
            session_id: session_id.into(),
            message: message.into(),
        }
    }

    /// Name of the stage that failed, for the terminal journal entry.
    pub fn stage_name(&self) -> &str {
        match self {
            Self::StepFailed { step_name, .. } => step_name,
            Self::SetupFailed { .. } => "starting",
        }
    }

    /// Short human-readable message safe to expose to pollers.
    pub fn public_message(&self) -> String {
        match self {
            Self::StepFailed { source, .. } => source.public_message(),
            Self::SetupFailed { .. } => "session setup failed".to_string(),
        }
    }
}

/// Error from a pipeline step.
#[derive(Error, Debug)]
pub enum StepError {
    /// Input validation failed.
    #[error("input validation failed: {0}")]
    InvalidInput(String),

    /// Output validation failed.
    #[error("output validation failed: {0}")]
    InvalidOutput(String),

    /// A precondition from an earlier step was not met.
    #[error("precondition not met: {0}")]
    Precondition(String),

    /// The measurement transform produced no usable result.
    #[error(transparent)]
    Measurement(#[from] AnalysisError),

    /// The rendering transform failed.
    #[error(transparent)]
    Render(#[from] RenderError),

    /// The advisor store failed.
    #[error(transparent)]
    Advisor(#[from] AdvisorError),

    /// The progress journal could not be written.
    #[error(transparent)]
    Journal(#[from] JournalError),

    /// Packaging failed.
    #[error(transparent)]
    Packaging(#[from] PackagingError),

    /// File I/O error.
    #[error("I/O error in {operation}: {source}")]
    Io {
        operation: String,
        #[source]
        source: io::Error,
    },
}

impl StepError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn invalid_output(message: impl Into<String>) -> Self {
        Self::InvalidOutput(message.into())
    }

    pub fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition(message.into())
    }

    pub fn io(operation: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }

    /// Short human-readable message safe to expose to pollers.
    ///
    /// Validation messages are crafted for users and pass through;
    /// transform failures collapse to their category so stderr dumps and
    /// paths never reach the progress document.
    pub fn public_message(&self) -> String {
        match self {
            Self::InvalidInput(message)
            | Self::InvalidOutput(message)
            | Self::Precondition(message) => message.clone(),
            Self::Measurement(error) => match error {
                AnalysisError::Tool(ToolError::Timeout { .. }) => {
                    "loudness measurement timed out".to_string()
                }
                AnalysisError::NoReport
                | AnalysisError::NoAudioStream { .. }
                | AnalysisError::NoSamples { .. } => {
                    "no audio stream could be measured".to_string()
                }
                _ => "loudness measurement failed".to_string(),
            },
            Self::Render(error) => match error {
                RenderError::Tool(ToolError::Timeout { .. }) => "rendering timed out".to_string(),
                RenderError::EmptyOutput { .. } => {
                    "rendering produced no output".to_string()
                }
                _ => "rendering failed".to_string(),
            },
            Self::Advisor(_) => "advisor model update failed".to_string(),
            Self::Journal(_) => "progress could not be persisted".to_string(),
            Self::Packaging(_) => "packaging failed".to_string(),
            Self::Io { .. } => "file system error".to_string(),
        }
    }
}

/// Result type for step operations.
pub type StepResult<T> = Result<T, StepError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;
