//! Adjustment advisor: a tiny persisted regression keyed by content
//! fingerprint.
//!
//! Predicts bounded per-target corrections before rendering and learns
//! from the realized error afterwards. Learning only ever touches the
//! persisted parameters - future sessions sharing the fingerprint benefit,
//! the session that produced the training signal does not re-render.

mod model;
mod store;

pub use model::{
    clamp_adjustment, fingerprint, AdjustmentModel, FeatureVector, TargetAdjustments,
    FEATURE_COUNT, MAX_GAIN_DELTA, MAX_TP_DELTA, OUTPUT_COUNT,
};
pub use store::{AdvisorError, AdvisorResult, AdvisorStore};
