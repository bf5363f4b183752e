//! Core types for the orchestrator pipeline.

use std::sync::Arc;

use crate::advisor::{AdvisorStore, FeatureVector, TargetAdjustments};
use crate::analysis::{Analyzer, LoudnessReport};
use crate::config::Settings;
use crate::journal::ProgressJournal;
use crate::logging::SessionLogger;
use crate::models::{RenderedOutput, Session, Timeline};
use crate::render::{Renderer, Verifier};

/// Read-only context passed to pipeline steps.
///
/// Contains the session, configuration and shared resources that steps
/// can read but not modify. Mutable state goes in [`JobState`].
pub struct Context {
    /// The session being processed.
    pub session: Session,
    /// Application settings snapshot.
    pub settings: Settings,
    /// The session's progress journal (single writer: this pipeline).
    pub journal: ProgressJournal,
    /// Shared advisor parameter store.
    pub advisor: Arc<AdvisorStore>,
    /// Per-session logger.
    pub logger: Arc<SessionLogger>,
}

impl Context {
    pub fn new(
        session: Session,
        settings: Settings,
        advisor: Arc<AdvisorStore>,
        logger: Arc<SessionLogger>,
    ) -> Self {
        let journal = ProgressJournal::new(&session.root);
        Self {
            session,
            settings,
            journal,
            advisor,
            logger,
        }
    }

    /// Analyzer configured from the settings snapshot.
    pub fn analyzer(&self) -> Analyzer {
        Analyzer::from_settings(&self.settings.transform)
    }

    pub fn renderer(&self) -> Renderer {
        Renderer::new(self.analyzer())
    }

    pub fn verifier(&self) -> Verifier {
        Verifier::new(self.analyzer())
    }
}

/// Mutable state accumulated by pipeline steps.
///
/// Steps add new data; they do not overwrite what earlier steps recorded.
#[derive(Debug, Default)]
pub struct JobState {
    /// Input measurement (from the Analyze step).
    pub report: Option<LoudnessReport>,
    /// Input timeline (from the Analyze step).
    pub timeline: Option<Timeline>,
    /// Content fingerprint (from the Reference step).
    pub fingerprint: Option<String>,
    /// Advisor feature vector (from the Reference step).
    pub features: Option<FeatureVector>,
    /// Predicted per-target corrections (from the Reference step).
    pub adjustments: Option<TargetAdjustments>,
    /// Rendered outputs, one per completed target.
    pub outputs: Vec<RenderedOutput>,
}

impl JobState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_analysis(&self) -> bool {
        self.report.is_some()
    }

    /// Look up a completed output by target name.
    pub fn output(&self, target: &str) -> Option<&RenderedOutput> {
        self.outputs.iter().find(|output| output.target == target)
    }
}

/// Result of executing a pipeline step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Step completed successfully.
    Success,
    /// Step was skipped (not an error).
    Skipped(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LoudnessMetrics, VerifyOutcome};
    use std::path::PathBuf;

    #[test]
    fn job_state_tracks_outputs_by_target() {
        let mut state = JobState::new();
        assert!(!state.has_analysis());
        assert!(state.output("club").is_none());

        state.outputs.push(RenderedOutput {
            target: "club".to_string(),
            filename: "club_master.wav".to_string(),
            path: PathBuf::from("/x/club_master.wav"),
            input: LoudnessMetrics::default(),
            output: LoudnessMetrics::default(),
            sha256: "0".repeat(64),
            size: 1,
            verification: VerifyOutcome::Ok,
        });

        assert!(state.output("club").is_some());
        assert!(state.output("streaming").is_none());
    }
}
