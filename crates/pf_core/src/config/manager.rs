//! Config manager for loading, saving, and atomic updates.
//!
//! Key features:
//! - Atomic writes (write to temp file, then rename)
//! - Section-level updates (only the modified section is changed)
//! - Validation on load (out-of-range values are clamped)

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use toml_edit::{DocumentMut, Item};

use super::settings::{ConfigSection, Settings};

/// Permitted range for the streaming true-peak ceiling.
const STREAMING_TP_RANGE: (f64, f64) = (-1.5, -1.0);

/// Errors that can occur during config operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadError(#[from] io::Error),

    #[error("failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("failed to parse config for editing: {0}")]
    EditParseError(#[from] toml_edit::TomlError),

    #[error("config file not found: {0}")]
    NotFound(PathBuf),
}

/// Result type for config operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Manages application configuration.
pub struct ConfigManager {
    /// Path to the config file.
    config_path: PathBuf,
    /// Current settings loaded in memory.
    settings: Settings,
}

impl ConfigManager {
    /// Create a manager for the given config file path.
    ///
    /// Does not load the config - call `load()` or `load_or_create()` after.
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            settings: Settings::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Note: changes made here are only in memory until `save()` or
    /// `update_section()` is called.
    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    /// Load config from file. Returns an error if the file doesn't exist.
    pub fn load(&mut self) -> ConfigResult<()> {
        if !self.config_path.exists() {
            return Err(ConfigError::NotFound(self.config_path.clone()));
        }
        let content = fs::read_to_string(&self.config_path)?;
        self.settings = parse_and_validate(&content)?;
        Ok(())
    }

    /// Load config from file, creating it with defaults if missing.
    pub fn load_or_create(&mut self) -> ConfigResult<()> {
        if self.config_path.exists() {
            self.load()?;
        } else {
            if let Some(parent) = self.config_path.parent() {
                fs::create_dir_all(parent)?;
            }
            self.settings = Settings::default();
            self.save()?;
        }
        Ok(())
    }

    /// Ensure all configured directories exist.
    ///
    /// Should be called after `load_or_create()`.
    pub fn ensure_dirs_exist(&self) -> ConfigResult<()> {
        let dirs = [
            &self.settings.paths.sessions_root,
            &self.settings.paths.models_dir,
            &self.settings.paths.logs_dir,
        ];
        for dir in dirs {
            let path = PathBuf::from(dir);
            if !path.exists() {
                fs::create_dir_all(&path)?;
            }
        }
        Ok(())
    }

    /// Save the entire config atomically.
    pub fn save(&self) -> ConfigResult<()> {
        let content = toml::to_string_pretty(&self.settings)?;
        self.atomic_write(&content)?;
        Ok(())
    }

    /// Update a specific section atomically.
    ///
    /// Re-reads the file from disk, replaces only the named section, and
    /// writes back atomically so concurrent edits to other sections are
    /// not clobbered.
    pub fn update_section(&mut self, section: ConfigSection) -> ConfigResult<()> {
        let current_content = if self.config_path.exists() {
            fs::read_to_string(&self.config_path)?
        } else {
            String::new()
        };

        let mut doc: DocumentMut = if current_content.is_empty() {
            DocumentMut::new()
        } else {
            current_content.parse()?
        };

        let section_toml = match section {
            ConfigSection::Paths => toml::to_string_pretty(&self.settings.paths)?,
            ConfigSection::Transform => toml::to_string_pretty(&self.settings.transform)?,
            ConfigSection::Targets => toml::to_string_pretty(&self.settings.targets)?,
            ConfigSection::Advisor => toml::to_string_pretty(&self.settings.advisor)?,
            ConfigSection::Workers => toml::to_string_pretty(&self.settings.workers)?,
            ConfigSection::Upload => toml::to_string_pretty(&self.settings.upload)?,
        };

        let section_doc: DocumentMut = section_toml.parse()?;
        let section_table = section_doc.as_table().clone();
        doc[section.table_name()] = Item::Table(section_table);

        self.atomic_write(&doc.to_string())?;
        Ok(())
    }

    /// Write content to the config file atomically.
    fn atomic_write(&self, content: &str) -> io::Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let temp_path = self.config_path.with_extension("toml.tmp");
        {
            let mut file = fs::File::create(&temp_path)?;
            file.write_all(content.as_bytes())?;
        }
        fs::rename(&temp_path, &self.config_path)?;
        Ok(())
    }
}

/// Parse config content and clamp out-of-range values.
fn parse_and_validate(content: &str) -> ConfigResult<Settings> {
    let mut settings: Settings = toml::from_str(content)?;

    let (lo, hi) = STREAMING_TP_RANGE;
    if settings.targets.streaming_tp < lo || settings.targets.streaming_tp > hi {
        tracing::warn!(
            configured = settings.targets.streaming_tp,
            "streaming true-peak ceiling out of range, clamping"
        );
        settings.targets.streaming_tp = settings.targets.streaming_tp.clamp(lo, hi);
    }
    if settings.workers.count == 0 {
        settings.workers.count = 1;
    }
    if settings.workers.queue_capacity == 0 {
        settings.workers.queue_capacity = 1;
    }

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn load_or_create_writes_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("peakforge.toml");
        let mut manager = ConfigManager::new(&path);
        manager.load_or_create().unwrap();
        assert!(path.exists());
        assert_eq!(manager.settings().transform.timeout_secs, 90);
    }

    #[test]
    fn streaming_tp_is_clamped_on_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("peakforge.toml");
        fs::write(&path, "[targets]\nstreaming_tp = -3.0\n").unwrap();
        let mut manager = ConfigManager::new(&path);
        manager.load().unwrap();
        assert_eq!(manager.settings().targets.streaming_tp, -1.5);

        fs::write(&path, "[targets]\nstreaming_tp = -0.2\n").unwrap();
        manager.load().unwrap();
        assert_eq!(manager.settings().targets.streaming_tp, -1.0);
    }

    #[test]
    fn update_section_preserves_other_sections() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("peakforge.toml");
        fs::write(
            &path,
            "[paths]\nsessions_root = \"/data/sessions\"\n\n[workers]\ncount = 4\n",
        )
        .unwrap();

        let mut manager = ConfigManager::new(&path);
        manager.load().unwrap();
        manager.settings_mut().workers.count = 6;
        manager.update_section(ConfigSection::Workers).unwrap();

        let mut reread = ConfigManager::new(&path);
        reread.load().unwrap();
        assert_eq!(reread.settings().workers.count, 6);
        assert_eq!(reread.settings().paths.sessions_root, "/data/sessions");
    }

    #[test]
    fn zero_worker_count_is_corrected() {
        let settings = parse_and_validate("[workers]\ncount = 0\nqueue_capacity = 0\n").unwrap();
        assert_eq!(settings.workers.count, 1);
        assert_eq!(settings.workers.queue_capacity, 1);
    }
}
