//! Loudness measurement via the external transform.
//!
//! The transform prints its measurement report as a JSON object amid
//! other diagnostic noise on stderr. Parsing locates the last well-formed
//! report object; finding none is a measurement failure.

use std::path::Path;
use std::process::Command;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use super::timeline::{compute_timeline, TIMELINE_SAMPLE_RATE};
use super::tool::{run_with_timeout, ToolError};
use crate::config::TransformSettings;
use crate::models::Timeline;

/// Measurement defaults used when no target is in play yet.
const SCAN_I: f64 = -23.0;
const SCAN_TP: f64 = -2.0;
const SCAN_LRA: f64 = 7.0;

/// Errors from analysis operations.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("no parseable loudness report in transform output")]
    NoReport,

    #[error("no audio stream detected in {path}")]
    NoAudioStream { path: String },

    #[error("no audio samples decoded from {path}")]
    NoSamples { path: String },

    #[error("failed to parse {what}: {detail}")]
    Parse { what: String, detail: String },
}

pub type AnalysisResult<T> = Result<T, AnalysisError>;

/// Pass-1 measurement of a file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoudnessReport {
    /// Integrated loudness (LUFS).
    pub input_i: f64,
    /// True peak (dBTP).
    pub input_tp: f64,
    /// Loudness range (LU).
    pub input_lra: f64,
    /// Gating threshold.
    pub input_thresh: f64,
    /// Offset toward the measurement targets.
    pub target_offset: f64,
}

impl LoudnessReport {
    fn from_value(value: &Value) -> Option<Self> {
        Some(Self {
            input_i: coerce_f64(value.get("input_i")?)?,
            input_tp: coerce_f64(value.get("input_tp")?)?,
            input_lra: coerce_f64(value.get("input_lra")?)?,
            input_thresh: value.get("input_thresh").and_then(coerce_f64).unwrap_or(0.0),
            target_offset: value
                .get("target_offset")
                .and_then(coerce_f64)
                .unwrap_or(0.0),
        })
    }
}

/// Locate the last well-formed report object in noisy transform output.
///
/// Walks candidate `{` positions from the end of the text; the report
/// object is flat, so each candidate closes at the first `}` after it.
pub fn parse_report(text: &str) -> Option<LoudnessReport> {
    let mut end = text.len();
    while let Some(lb) = text[..end].rfind('{') {
        if let Some(rb) = text[lb..].find('}') {
            let candidate = &text[lb..lb + rb + 1];
            if let Ok(value) = serde_json::from_str::<Value>(candidate) {
                if let Some(report) = LoudnessReport::from_value(&value) {
                    return Some(report);
                }
            }
        }
        end = lb;
    }
    None
}

/// The transform prints numbers as JSON strings; accept both forms.
fn coerce_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Probe result for an uploaded file.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProbeInfo {
    pub duration_secs: Option<f64>,
    pub channels: Option<u32>,
    pub sample_rate: Option<u32>,
}

/// Wrapper around the external measurement transform.
#[derive(Debug, Clone)]
pub struct Analyzer {
    ffmpeg: String,
    ffprobe: String,
    timeout: Duration,
}

impl Analyzer {
    pub fn new(ffmpeg: impl Into<String>, ffprobe: impl Into<String>, timeout: Duration) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
            timeout,
        }
    }

    pub fn from_settings(settings: &TransformSettings) -> Self {
        Self::new(
            settings.ffmpeg_bin.clone(),
            settings.ffprobe_bin.clone(),
            Duration::from_secs(settings.timeout_secs),
        )
    }

    pub fn ffmpeg_bin(&self) -> &str {
        &self.ffmpeg
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Measure a file with the default scan targets.
    pub fn scan(&self, path: &Path) -> AnalysisResult<LoudnessReport> {
        self.scan_with_targets(path, SCAN_I, SCAN_TP, SCAN_LRA)
    }

    /// Measure a file against specific targets (affects `target_offset`).
    pub fn scan_with_targets(
        &self,
        path: &Path,
        i: f64,
        tp: f64,
        lra: f64,
    ) -> AnalysisResult<LoudnessReport> {
        let filter = format!(
            "loudnorm=I={i}:TP={tp}:LRA={lra}:print_format=json:dual_mono=true"
        );
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.arg("-nostats")
            .arg("-hide_banner")
            .arg("-i")
            .arg(path)
            .arg("-filter:a")
            .arg(&filter)
            .arg("-f")
            .arg("null")
            .arg("-");
        let output = run_with_timeout(&mut cmd, "ffmpeg", self.timeout)?;
        parse_report(&output.stderr).ok_or(AnalysisError::NoReport)
    }

    /// Measure the sample peak (dBFS) of a file.
    pub fn sample_peak(&self, path: &Path) -> AnalysisResult<f64> {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.arg("-nostats")
            .arg("-hide_banner")
            .arg("-i")
            .arg(path)
            .arg("-af")
            .arg("volumedetect")
            .arg("-f")
            .arg("null")
            .arg("-");
        let output = run_with_timeout(&mut cmd, "ffmpeg", self.timeout)?;
        parse_max_volume(&output.stderr).ok_or_else(|| AnalysisError::Parse {
            what: "volumedetect output".to_string(),
            detail: "no max_volume line".to_string(),
        })
    }

    /// Probe container-level facts about a file.
    pub fn probe(&self, path: &Path) -> AnalysisResult<ProbeInfo> {
        let mut cmd = Command::new(&self.ffprobe);
        cmd.arg("-v")
            .arg("error")
            .arg("-select_streams")
            .arg("a:0")
            .arg("-show_entries")
            .arg("stream=channels,sample_rate")
            .arg("-show_entries")
            .arg("format=duration")
            .arg("-of")
            .arg("json")
            .arg(path);
        let output = run_with_timeout(&mut cmd, "ffprobe", self.timeout)?;
        let text = String::from_utf8_lossy(&output.stdout);
        let value: Value =
            serde_json::from_str(text.trim()).map_err(|e| AnalysisError::Parse {
                what: "probe output".to_string(),
                detail: e.to_string(),
            })?;

        let stream = value
            .get("streams")
            .and_then(Value::as_array)
            .and_then(|streams| streams.first())
            .ok_or_else(|| AnalysisError::NoAudioStream {
                path: path.display().to_string(),
            })?;

        Ok(ProbeInfo {
            duration_secs: value
                .pointer("/format/duration")
                .and_then(coerce_f64),
            channels: stream
                .get("channels")
                .and_then(coerce_f64)
                .map(|c| c as u32),
            sample_rate: stream
                .get("sample_rate")
                .and_then(coerce_f64)
                .map(|sr| sr as u32),
        })
    }

    /// Decode a file to mono f64 samples at the given rate.
    pub fn decode_mono(&self, path: &Path, sample_rate: u32) -> AnalysisResult<Vec<f64>> {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.arg("-nostats")
            .arg("-hide_banner")
            .arg("-i")
            .arg(path)
            .arg("-vn")
            .arg("-ac")
            .arg("1")
            .arg("-ar")
            .arg(sample_rate.to_string())
            .arg("-f")
            .arg("f64le")
            .arg("-acodec")
            .arg("pcm_f64le")
            .arg("pipe:1");
        let output = run_with_timeout(&mut cmd, "ffmpeg", self.timeout)?;
        let samples = bytes_to_f64_samples(&output.stdout);
        if samples.is_empty() {
            return Err(AnalysisError::NoSamples {
                path: path.display().to_string(),
            });
        }
        Ok(samples)
    }

    /// Build the coarse short-term loudness timeline for a file.
    pub fn timeline(&self, path: &Path) -> AnalysisResult<Timeline> {
        let samples = self.decode_mono(path, TIMELINE_SAMPLE_RATE)?;
        Ok(compute_timeline(&samples, TIMELINE_SAMPLE_RATE))
    }
}

/// Parse the `max_volume: -6.0 dB` line from the peak detection filter.
fn parse_max_volume(text: &str) -> Option<f64> {
    for line in text.lines() {
        if let Some(idx) = line.find("max_volume:") {
            let rest = line[idx + "max_volume:".len()..].trim();
            let number = rest.strip_suffix("dB").unwrap_or(rest).trim();
            if let Ok(value) = number.parse() {
                return Some(value);
            }
        }
    }
    None
}

/// Convert raw little-endian bytes to f64 samples.
fn bytes_to_f64_samples(bytes: &[u8]) -> Vec<f64> {
    bytes
        .chunks_exact(8)
        .map(|chunk| {
            let arr: [u8; 8] = chunk.try_into().expect("chunks_exact yields 8 bytes");
            f64::from_le_bytes(arr)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT: &str = r#"{
        "input_i": "-19.98",
        "input_tp": "-4.23",
        "input_lra": "2.10",
        "input_thresh": "-30.11",
        "output_i": "-7.15",
        "output_tp": "-0.82",
        "output_lra": "2.00",
        "target_offset": "0.05"
    }"#;

    #[test]
    fn parse_report_reads_string_numbers() {
        let report = parse_report(REPORT).unwrap();
        assert!((report.input_i - -19.98).abs() < 1e-9);
        assert!((report.input_tp - -4.23).abs() < 1e-9);
        assert!((report.input_lra - 2.10).abs() < 1e-9);
        assert!((report.target_offset - 0.05).abs() < 1e-9);
    }

    #[test]
    fn parse_report_tolerates_surrounding_noise() {
        let noisy = format!(
            "size=N/A time=00:00:02.00 bitrate=N/A speed=401x\n\
             [Parsed_loudnorm_0 @ 0x55d] \n{REPORT}\nframe trailing junk"
        );
        assert!(parse_report(&noisy).is_some());
    }

    #[test]
    fn parse_report_picks_last_wellformed_object() {
        let text = format!("{{\"input_i\": \"-30.0\"}} junk {REPORT}");
        let report = parse_report(&text).unwrap();
        // The last complete report wins, not the first fragment.
        assert!((report.input_i - -19.98).abs() < 1e-9);
    }

    #[test]
    fn parse_report_skips_trailing_nonreport_object() {
        let text = format!("{REPORT}\n{{\"progress\": \"end\"}}");
        let report = parse_report(&text).unwrap();
        assert!((report.input_i - -19.98).abs() < 1e-9);
    }

    #[test]
    fn parse_report_fails_without_object() {
        assert!(parse_report("no json here at all").is_none());
        assert!(parse_report("{ broken json").is_none());
        assert!(parse_report("").is_none());
    }

    #[test]
    fn max_volume_line_parses() {
        let text = "[Parsed_volumedetect_0 @ 0x5] max_volume: -6.4 dB\nother";
        assert_eq!(parse_max_volume(text), Some(-6.4));
        assert_eq!(parse_max_volume("nothing"), None);
    }

    #[test]
    fn bytes_to_samples_converts_and_ignores_remainder() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0.5f64.to_le_bytes());
        bytes.extend_from_slice(&(-0.25f64).to_le_bytes());
        bytes.extend_from_slice(&[0u8; 3]);
        let samples = bytes_to_f64_samples(&bytes);
        assert_eq!(samples.len(), 2);
        assert!((samples[0] - 0.5).abs() < 1e-12);
        assert!((samples[1] + 0.25).abs() < 1e-12);
    }
}
