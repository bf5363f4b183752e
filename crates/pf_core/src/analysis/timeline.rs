//! Coarse per-window loudness timeline.
//!
//! Fixed ~100 ms windows, each recording short-term loudness and whether
//! the window peak came near full scale. Diagnostic output for pollers;
//! never feeds back into rendering decisions.

use crate::models::Timeline;

/// Decode rate used for timeline analysis.
pub const TIMELINE_SAMPLE_RATE: u32 = 48000;

/// Window length in seconds.
pub const WINDOW_SECS: f64 = 0.1;

/// Linear amplitude treated as "near full scale".
pub const NEAR_FULL_SCALE: f64 = 0.95;

/// Floor to keep the log defined on silent windows.
const EPSILON: f64 = 1e-12;

/// Slice mono samples into windows and compute the timeline.
pub fn compute_timeline(samples: &[f64], sample_rate: u32) -> Timeline {
    let window = ((sample_rate as f64 * WINDOW_SECS) as usize).max(1);
    let mut timeline = Timeline::default();

    for (index, chunk) in samples.chunks(window).enumerate() {
        let mut sum_squares = 0.0;
        let mut peak = 0.0f64;
        for &sample in chunk {
            sum_squares += sample * sample;
            peak = peak.max(sample.abs());
        }
        let rms = (sum_squares / chunk.len() as f64).sqrt();

        timeline.sec.push(index as f64 * WINDOW_SECS);
        timeline.short_term.push(20.0 * (rms + EPSILON).log10());
        timeline
            .tp_flags
            .push(u8::from(peak > NEAR_FULL_SCALE));
    }

    timeline
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_yields_empty_timeline() {
        let timeline = compute_timeline(&[], 48000);
        assert!(timeline.is_empty());
    }

    #[test]
    fn windows_cover_the_whole_signal() {
        // 1.05 s of samples -> 11 windows (last one partial).
        let samples = vec![0.1; (48000.0 * 1.05) as usize];
        let timeline = compute_timeline(&samples, 48000);
        assert_eq!(timeline.sec.len(), 11);
        assert_eq!(timeline.short_term.len(), 11);
        assert_eq!(timeline.tp_flags.len(), 11);
        assert!((timeline.sec[10] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn constant_signal_has_expected_level() {
        let samples = vec![0.5; 4800];
        let timeline = compute_timeline(&samples, 48000);
        // RMS of a constant 0.5 signal is 0.5 -> about -6.02 dB.
        assert!((timeline.short_term[0] - 20.0 * 0.5f64.log10()).abs() < 1e-6);
        assert_eq!(timeline.tp_flags[0], 0);
    }

    #[test]
    fn near_full_scale_window_is_flagged() {
        let mut samples = vec![0.1; 4800];
        samples.extend(vec![0.99; 4800]);
        let timeline = compute_timeline(&samples, 48000);
        assert_eq!(timeline.tp_flags, vec![0, 1]);
    }

    #[test]
    fn silence_stays_finite() {
        let timeline = compute_timeline(&[0.0; 4800], 48000);
        assert!(timeline.short_term[0].is_finite());
        assert!(timeline.short_term[0] < -200.0);
    }
}
