//! Loudness analysis: wraps the external measurement transform.
//!
//! The transform's filter math is a black box; this module owns the
//! narrow contract around it: invoking it with a hard timeout, parsing
//! its structured report out of diagnostic noise, and building the
//! coarse per-window timeline.

mod loudness;
mod timeline;
mod tool;

pub use loudness::{
    parse_report, AnalysisError, AnalysisResult, Analyzer, LoudnessReport, ProbeInfo,
};
pub use timeline::{compute_timeline, NEAR_FULL_SCALE, TIMELINE_SAMPLE_RATE, WINDOW_SECS};
pub use tool::{run_with_timeout, tail, ToolError, ToolOutput};
