//! Persisted advisor parameters as an explicit key-value store.
//!
//! One JSON parameter file per fingerprint. Every read-modify-write runs
//! under a per-fingerprint lock so two sessions sharing a fingerprint
//! cannot lose each other's updates.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

use super::model::{AdjustmentModel, FeatureVector, TargetAdjustments, OUTPUT_COUNT};

/// Errors from the advisor store.
#[derive(Error, Debug)]
pub enum AdvisorError {
    #[error("I/O error in {operation}: {source}")]
    Io {
        operation: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse advisor model: {0}")]
    Parse(#[from] serde_json::Error),
}

impl AdvisorError {
    fn io(operation: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }
}

pub type AdvisorResult<T> = Result<T, AdvisorError>;

/// Key-value store of adjustment models, keyed by fingerprint.
pub struct AdvisorStore {
    dir: PathBuf,
    learning_rate: f64,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl AdvisorStore {
    /// Open (creating if needed) the store directory.
    pub fn open(dir: impl Into<PathBuf>, learning_rate: f64) -> AdvisorResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| AdvisorError::io("create models directory", e))?;
        Ok(Self {
            dir,
            learning_rate,
            locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Predict corrections for a fingerprint, lazily initializing a
    /// near-identity model on first use.
    pub fn predict(
        &self,
        fingerprint: &str,
        features: &FeatureVector,
    ) -> AdvisorResult<TargetAdjustments> {
        let lock = self.lock_for(fingerprint);
        let _guard = lock.lock();
        let model = self.load_or_init(fingerprint)?;
        Ok(model.predict(features))
    }

    /// Apply one learning step and persist the updated parameters.
    pub fn learn(
        &self,
        fingerprint: &str,
        features: &FeatureVector,
        errors: &[f64; OUTPUT_COUNT],
    ) -> AdvisorResult<()> {
        let lock = self.lock_for(fingerprint);
        let _guard = lock.lock();
        let mut model = self.load_or_init(fingerprint)?;
        model.learn(features, errors);
        self.persist(fingerprint, &model)?;
        tracing::debug!(fingerprint, updates = model.updates, "advisor model updated");
        Ok(())
    }

    /// Number of learning steps recorded for a fingerprint (0 if unseen).
    pub fn update_count(&self, fingerprint: &str) -> AdvisorResult<u64> {
        let lock = self.lock_for(fingerprint);
        let _guard = lock.lock();
        if !self.model_path(fingerprint).exists() {
            return Ok(0);
        }
        Ok(self.load_or_init(fingerprint)?.updates)
    }

    fn lock_for(&self, fingerprint: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock();
        Arc::clone(
            locks
                .entry(fingerprint.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    fn model_path(&self, fingerprint: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize_key(fingerprint)))
    }

    /// Caller must hold the fingerprint lock.
    fn load_or_init(&self, fingerprint: &str) -> AdvisorResult<AdjustmentModel> {
        let path = self.model_path(fingerprint);
        if path.exists() {
            let content =
                fs::read_to_string(&path).map_err(|e| AdvisorError::io("read advisor model", e))?;
            let model: AdjustmentModel = serde_json::from_str(&content)?;
            if model.shape_valid() {
                return Ok(model);
            }
            tracing::warn!(fingerprint, "advisor model shape mismatch, reinitializing");
        }
        let model = AdjustmentModel::near_identity(self.learning_rate);
        self.persist(fingerprint, &model)?;
        Ok(model)
    }

    /// Caller must hold the fingerprint lock.
    fn persist(&self, fingerprint: &str, model: &AdjustmentModel) -> AdvisorResult<()> {
        let path = self.model_path(fingerprint);
        let json = serde_json::to_string_pretty(model)?;
        let tmp = path.with_extension("json.tmp");
        {
            let mut file =
                fs::File::create(&tmp).map_err(|e| AdvisorError::io("create advisor temp", e))?;
            file.write_all(json.as_bytes())
                .map_err(|e| AdvisorError::io("write advisor temp", e))?;
        }
        fs::rename(&tmp, &path).map_err(|e| AdvisorError::io("publish advisor model", e))?;
        Ok(())
    }
}

fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            _ => c,
        })
        .collect()
}
