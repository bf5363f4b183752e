//! Rendering: two-pass loudness masters, the peak-matched premaster, and
//! post-render verification.

mod premaster;
mod renderer;
mod verify;

pub use premaster::{premaster_gain_db, PremasterRender};
pub use renderer::{
    effective_targets, EffectiveTargets, MasterRender, RenderError, RenderResult, Renderer,
};
pub use verify::{within_tolerance, Verification, Verifier, I_TOLERANCE_LU, TP_TOLERANCE_DB};
