//! Progress Journal: an atomically-written, mergeable state document.
//!
//! One writer per session (the orchestrator), arbitrarily many readers.
//! The journal is the only thing pollers ever see, so its invariants are
//! enforced here rather than trusted to callers: monotonic percent,
//! `percent == 100` implies `done`, and the error state is terminal.

#[allow(clippy::module_inception)]
mod journal;
mod state;

pub use journal::{JournalError, JournalResult, ProgressJournal};
pub use state::{
    Adjustment, AdvisorSnapshot, Phase, ProgressState, DOWNLOAD_KEYS, METRIC_KEYS,
};
