//! Settings struct with TOML-based sections.
//!
//! Settings are organized into logical sections that map to TOML tables.
//! Each section can be updated independently for atomic section-level
//! updates.

use serde::{Deserialize, Serialize};

use crate::models::{PremasterSpec, TargetSpec};

/// Root settings structure containing all configuration sections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Path-related settings.
    #[serde(default)]
    pub paths: PathSettings,

    /// External transform invocation settings.
    #[serde(default)]
    pub transform: TransformSettings,

    /// Mastering target parameters.
    #[serde(default)]
    pub targets: TargetSettings,

    /// Adjustment advisor settings.
    #[serde(default)]
    pub advisor: AdvisorSettings,

    /// Worker pool settings.
    #[serde(default)]
    pub workers: WorkerSettings,

    /// Upload validation settings.
    #[serde(default)]
    pub upload: UploadSettings,
}

/// Path configuration for session, model, and log storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathSettings {
    /// Root folder holding one directory per session.
    #[serde(default = "default_sessions_root")]
    pub sessions_root: String,

    /// Folder for persisted advisor models.
    #[serde(default = "default_models_dir")]
    pub models_dir: String,

    /// Folder for application log files.
    #[serde(default = "default_logs_dir")]
    pub logs_dir: String,
}

fn default_sessions_root() -> String {
    ".sessions".to_string()
}

fn default_models_dir() -> String {
    ".models".to_string()
}

fn default_logs_dir() -> String {
    ".logs".to_string()
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            sessions_root: default_sessions_root(),
            models_dir: default_models_dir(),
            logs_dir: default_logs_dir(),
        }
    }
}

/// External measurement/rendering transform settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformSettings {
    /// Rendering/measurement binary.
    #[serde(default = "default_ffmpeg_bin")]
    pub ffmpeg_bin: String,

    /// Probe binary.
    #[serde(default = "default_ffprobe_bin")]
    pub ffprobe_bin: String,

    /// Hard per-invocation timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_ffmpeg_bin() -> String {
    "ffmpeg".to_string()
}

fn default_ffprobe_bin() -> String {
    "ffprobe".to_string()
}

fn default_timeout_secs() -> u64 {
    90
}

impl Default for TransformSettings {
    fn default() -> Self {
        Self {
            ffmpeg_bin: default_ffmpeg_bin(),
            ffprobe_bin: default_ffprobe_bin(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Mastering target parameters.
///
/// The streaming true-peak ceiling is deliberately a parameter: observed
/// platform practice varies between -1.0 and -1.5 dBTP.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetSettings {
    #[serde(default = "default_club_i")]
    pub club_i: f64,
    #[serde(default = "default_club_tp")]
    pub club_tp: f64,
    #[serde(default = "default_club_lra")]
    pub club_lra: f64,
    #[serde(default = "default_club_sample_rate")]
    pub club_sample_rate: u32,

    #[serde(default = "default_streaming_i")]
    pub streaming_i: f64,
    #[serde(default = "default_streaming_tp")]
    pub streaming_tp: f64,
    #[serde(default = "default_streaming_lra")]
    pub streaming_lra: f64,
    #[serde(default = "default_streaming_sample_rate")]
    pub streaming_sample_rate: u32,

    /// Sample-peak ceiling of the unlimited premaster, dBFS.
    #[serde(default = "default_premaster_ceiling")]
    pub premaster_ceiling_dbfs: f64,
    #[serde(default = "default_premaster_sample_rate")]
    pub premaster_sample_rate: u32,

    /// Bit depth for all rendered outputs.
    #[serde(default = "default_bit_depth")]
    pub bit_depth: u16,

    /// Optional custom preset rendered after the built-ins.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom: Option<CustomTarget>,
}

fn default_club_i() -> f64 {
    -7.2
}

fn default_club_tp() -> f64 {
    -0.8
}

fn default_club_lra() -> f64 {
    7.0
}

fn default_club_sample_rate() -> u32 {
    48000
}

fn default_streaming_i() -> f64 {
    -9.5
}

fn default_streaming_tp() -> f64 {
    -1.0
}

fn default_streaming_lra() -> f64 {
    9.0
}

fn default_streaming_sample_rate() -> u32 {
    44100
}

fn default_premaster_ceiling() -> f64 {
    -6.0
}

fn default_premaster_sample_rate() -> u32 {
    48000
}

fn default_bit_depth() -> u16 {
    24
}

impl Default for TargetSettings {
    fn default() -> Self {
        Self {
            club_i: default_club_i(),
            club_tp: default_club_tp(),
            club_lra: default_club_lra(),
            club_sample_rate: default_club_sample_rate(),
            streaming_i: default_streaming_i(),
            streaming_tp: default_streaming_tp(),
            streaming_lra: default_streaming_lra(),
            streaming_sample_rate: default_streaming_sample_rate(),
            premaster_ceiling_dbfs: default_premaster_ceiling(),
            premaster_sample_rate: default_premaster_sample_rate(),
            bit_depth: default_bit_depth(),
            custom: None,
        }
    }
}

/// A user-defined loudness target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomTarget {
    pub i: f64,
    pub tp: f64,
    pub lra: f64,
    pub sample_rate: u32,
}

impl TargetSettings {
    pub fn club_spec(&self) -> TargetSpec {
        TargetSpec::club(
            self.club_i,
            self.club_tp,
            self.club_lra,
            self.club_sample_rate,
            self.bit_depth,
        )
    }

    pub fn streaming_spec(&self) -> TargetSpec {
        TargetSpec::streaming(
            self.streaming_i,
            self.streaming_tp,
            self.streaming_lra,
            self.streaming_sample_rate,
            self.bit_depth,
        )
    }

    pub fn custom_spec(&self) -> Option<TargetSpec> {
        self.custom.as_ref().map(|custom| TargetSpec {
            name: "custom".to_string(),
            i: custom.i,
            tp: custom.tp,
            lra: custom.lra,
            sample_rate: custom.sample_rate,
            bit_depth: self.bit_depth,
        })
    }

    pub fn premaster_spec(&self) -> PremasterSpec {
        PremasterSpec {
            ceiling_dbfs: self.premaster_ceiling_dbfs,
            sample_rate: self.premaster_sample_rate,
            bit_depth: self.bit_depth,
        }
    }
}

/// Adjustment advisor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvisorSettings {
    /// Whether advisor corrections are applied at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Online-learning step size.
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
}

fn default_true() -> bool {
    true
}

fn default_learning_rate() -> f64 {
    0.01
}

impl Default for AdvisorSettings {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            learning_rate: default_learning_rate(),
        }
    }
}

/// Worker pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSettings {
    /// Number of session worker threads.
    #[serde(default = "default_worker_count")]
    pub count: usize,

    /// Bounded queue capacity; submissions beyond this are rejected.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_worker_count() -> usize {
    2
}

fn default_queue_capacity() -> usize {
    8
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            count: default_worker_count(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

/// Upload validation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadSettings {
    /// Allow-listed upload extensions, lowercase, without dots.
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,

    /// Maximum accepted input duration in seconds.
    #[serde(default = "default_max_duration_secs")]
    pub max_duration_secs: f64,

    /// Maximum accepted channel count.
    #[serde(default = "default_max_channels")]
    pub max_channels: u32,
}

fn default_allowed_extensions() -> Vec<String> {
    ["wav", "wave", "aif", "aiff", "flac"]
        .iter()
        .map(|ext| ext.to_string())
        .collect()
}

fn default_max_duration_secs() -> f64 {
    20.0 * 60.0
}

fn default_max_channels() -> u32 {
    2
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            allowed_extensions: default_allowed_extensions(),
            max_duration_secs: default_max_duration_secs(),
            max_channels: default_max_channels(),
        }
    }
}

/// Sections available for atomic section-level updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSection {
    Paths,
    Transform,
    Targets,
    Advisor,
    Workers,
    Upload,
}

impl ConfigSection {
    pub fn table_name(self) -> &'static str {
        match self {
            ConfigSection::Paths => "paths",
            ConfigSection::Transform => "transform",
            ConfigSection::Targets => "targets",
            ConfigSection::Advisor => "advisor",
            ConfigSection::Workers => "workers",
            ConfigSection::Upload => "upload",
        }
    }

    pub fn all() -> &'static [ConfigSection] {
        &[
            ConfigSection::Paths,
            ConfigSection::Transform,
            ConfigSection::Targets,
            ConfigSection::Advisor,
            ConfigSection::Workers,
            ConfigSection::Upload,
        ]
    }
}
