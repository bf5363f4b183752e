//! Bounded worker pool for session processing.
//!
//! Sessions are fed through a bounded queue into a fixed set of worker
//! threads, so the number of concurrent sessions is capped and
//! back-pressure is explicit: a full queue rejects the submission instead
//! of spawning unboundedly.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};
use thiserror::Error;

use crate::advisor::AdvisorStore;
use crate::config::Settings;
use crate::journal::ProgressJournal;
use crate::logging::SessionLogger;
use crate::models::Session;

use super::pipeline::Pipeline;
use super::steps::{
    AnalyzeStep, MasterStep, MasterTarget, PackageStep, PremasterStep, ReferenceStep,
};
use super::types::{Context, JobState};

/// Errors from submitting work to the pool.
#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("session queue is full ({capacity} pending)")]
    QueueFull { capacity: usize },

    #[error("worker pool is shut down")]
    ShutDown,
}

/// Create the standard pipeline for the given settings.
///
/// The custom target step is only included when a custom preset is
/// configured, so pollers never see a custom phase they did not ask for.
pub fn create_standard_pipeline(settings: &Settings) -> Pipeline {
    let mut pipeline = Pipeline::new()
        .with_step(AnalyzeStep::new())
        .with_step(ReferenceStep::new())
        .with_step(MasterStep::new(MasterTarget::Club))
        .with_step(MasterStep::new(MasterTarget::Streaming))
        .with_step(PremasterStep::new());
    if settings.targets.custom.is_some() {
        pipeline.add_step(MasterStep::new(MasterTarget::Custom));
    }
    pipeline.add_step(PackageStep::new());
    pipeline
}

/// Run one session through the standard pipeline.
///
/// Any failure transitions the journal to its terminal error state with
/// the stage name and a short human-readable message; partial artifacts
/// stay on disk for diagnostics.
pub fn process_session(settings: &Settings, advisor: &Arc<AdvisorStore>, session: Session) {
    let journal = ProgressJournal::new(&session.root);
    let logger = match SessionLogger::create(&session.root, &session.id) {
        Ok(logger) => Arc::new(logger),
        Err(e) => {
            tracing::error!(session = %session.id, error = %e, "failed to open session log");
            journal.fail("starting", "session setup failed");
            return;
        }
    };

    let ctx = Context::new(
        session,
        settings.clone(),
        Arc::clone(advisor),
        Arc::clone(&logger),
    );
    let mut state = JobState::new();
    let pipeline = create_standard_pipeline(settings);

    logger.info(&format!("processing session {}", ctx.session.id));
    match pipeline.run(&ctx, &mut state) {
        Ok(result) => {
            tracing::info!(
                session = %ctx.session.id,
                completed = result.steps_completed.len(),
                skipped = result.steps_skipped.len(),
                "session finished"
            );
        }
        Err(e) => {
            logger.error(&format!("pipeline failed: {e}"));
            tracing::error!(session = %ctx.session.id, error = %e, "session failed");
            ctx.journal
                .fail(e.stage_name(), &e.public_message());
        }
    }
}

struct PoolShared {
    queue: Mutex<VecDeque<Session>>,
    capacity: usize,
    wake: Condvar,
    shutdown: AtomicBool,
    settings: Settings,
    advisor: Arc<AdvisorStore>,
}

/// Fixed-size worker pool fed by a bounded queue.
pub struct SessionWorkers {
    shared: Arc<PoolShared>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl SessionWorkers {
    /// Start `count` workers with the given queue capacity.
    pub fn new(
        settings: Settings,
        advisor: Arc<AdvisorStore>,
        count: usize,
        capacity: usize,
    ) -> Self {
        let shared = Arc::new(PoolShared {
            queue: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
            wake: Condvar::new(),
            shutdown: AtomicBool::new(false),
            settings,
            advisor,
        });

        let handles = (0..count.max(1))
            .map(|index| {
                let shared = Arc::clone(&shared);
                std::thread::Builder::new()
                    .name(format!("session-worker-{index}"))
                    .spawn(move || worker_loop(&shared))
                    .expect("failed to spawn session worker")
            })
            .collect();

        Self {
            shared,
            handles: Mutex::new(handles),
        }
    }

    /// Enqueue a session for processing.
    ///
    /// Returns a back-pressure error when the queue is at capacity.
    pub fn submit(&self, session: Session) -> Result<(), SubmitError> {
        if self.shared.shutdown.load(Ordering::SeqCst) {
            return Err(SubmitError::ShutDown);
        }
        let mut queue = self.shared.queue.lock();
        if queue.len() >= self.shared.capacity {
            return Err(SubmitError::QueueFull {
                capacity: self.shared.capacity,
            });
        }
        queue.push_back(session);
        drop(queue);
        self.shared.wake.notify_one();
        Ok(())
    }

    /// Number of sessions waiting in the queue.
    pub fn pending(&self) -> usize {
        self.shared.queue.lock().len()
    }

    /// Stop accepting work, drain the queue, and join the workers.
    pub fn shutdown(&self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        self.shared.wake.notify_all();
        let handles: Vec<_> = self.handles.lock().drain(..).collect();
        for handle in handles {
            let _ = handle.join();
        }
    }
}

impl Drop for SessionWorkers {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(shared: &PoolShared) {
    loop {
        let session = {
            let mut queue = shared.queue.lock();
            loop {
                if let Some(session) = queue.pop_front() {
                    break Some(session);
                }
                if shared.shutdown.load(Ordering::SeqCst) {
                    break None;
                }
                shared.wake.wait(&mut queue);
            }
        };
        let Some(session) = session else {
            return;
        };
        process_session(&shared.settings, &shared.advisor, session);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::InputDescriptor;
    use tempfile::TempDir;

    fn session(dir: &TempDir, id: &str) -> Session {
        let root = dir.path().join(id);
        std::fs::create_dir_all(&root).unwrap();
        Session {
            id: id.to_string(),
            root: root.clone(),
            input: InputDescriptor {
                filename: "in.wav".to_string(),
                path: root.join("in.wav"),
                sha256: "0".repeat(64),
                size: 0,
                duration_secs: None,
                channels: None,
                sample_rate: None,
            },
            created_at: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    fn pool(dir: &TempDir, workers: usize, capacity: usize) -> SessionWorkers {
        let advisor = Arc::new(AdvisorStore::open(dir.path().join("models"), 0.01).unwrap());
        SessionWorkers::new(Settings::default(), advisor, workers, capacity)
    }

    #[test]
    fn full_queue_applies_back_pressure() {
        let dir = TempDir::new().unwrap();
        let advisor = Arc::new(AdvisorStore::open(dir.path().join("models"), 0.01).unwrap());
        // Zero running workers is impossible, so saturate a tiny queue by
        // submitting faster than one worker can drain missing-input jobs.
        let pool = SessionWorkers::new(Settings::default(), advisor, 1, 1);

        let mut rejected = false;
        for i in 0..50 {
            if let Err(SubmitError::QueueFull { capacity }) =
                pool.submit(session(&dir, &format!("s{i}")))
            {
                assert_eq!(capacity, 1);
                rejected = true;
                break;
            }
        }
        assert!(rejected, "queue never reported back-pressure");
        pool.shutdown();
    }

    #[test]
    fn missing_input_session_lands_in_terminal_error() {
        let dir = TempDir::new().unwrap();
        let pool = pool(&dir, 1, 4);
        let s = session(&dir, "bad");
        let journal = ProgressJournal::new(&s.root);
        journal.init().unwrap();

        pool.submit(s).unwrap();
        pool.shutdown();

        let state = journal.read().unwrap();
        assert_eq!(state.phase, crate::journal::Phase::Error);
        assert!(state.done);
        assert!(state.error.as_deref().unwrap_or_default().len() > 0);
    }

    #[test]
    fn submit_after_shutdown_is_rejected() {
        let dir = TempDir::new().unwrap();
        let pool = pool(&dir, 1, 4);
        pool.shutdown();
        assert!(matches!(
            pool.submit(session(&dir, "late")),
            Err(SubmitError::ShutDown)
        ));
    }

    #[test]
    fn standard_pipeline_has_expected_step_order() {
        let pipeline = create_standard_pipeline(&Settings::default());
        assert_eq!(
            pipeline.step_names(),
            vec![
                "Analyze",
                "Reference",
                "Club",
                "Streaming",
                "Premaster",
                "Package"
            ]
        );
    }

    #[test]
    fn custom_preset_adds_a_pipeline_step() {
        let mut settings = Settings::default();
        settings.targets.custom = Some(crate::config::CustomTarget {
            i: -12.0,
            tp: -1.2,
            lra: 8.0,
            sample_rate: 48000,
        });
        let pipeline = create_standard_pipeline(&settings);
        assert!(pipeline.step_names().contains(&"Custom"));
        assert_eq!(pipeline.step_count(), 7);
    }
}
