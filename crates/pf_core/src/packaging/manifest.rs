//! Checksum-gated download manifest.
//!
//! The manifest is authoritative: a download key absent from it, or whose
//! on-disk checksum no longer matches, is rejected outright.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

pub const MANIFEST_FILENAME: &str = "manifest.json";

/// Errors from packaging operations.
#[derive(Error, Debug)]
pub enum PackagingError {
    #[error("I/O error in {operation}: {source}")]
    Io {
        operation: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse manifest: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to write archive: {0}")]
    Zip(#[from] zip::result::ZipError),
}

impl PackagingError {
    pub(crate) fn io(operation: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }
}

pub type PackagingResult<T> = Result<T, PackagingError>;

/// One downloadable artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub filename: String,
    pub sha256: String,
    pub size: u64,
    pub mime: String,
}

/// Map from download key to artifact metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    entries: BTreeMap<String, ManifestEntry>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&ManifestEntry> {
        self.entries.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Hash a file on disk and record it under `key`.
    pub fn insert_file(&mut self, key: &str, path: &Path) -> PackagingResult<&ManifestEntry> {
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let size = fs::metadata(path)
            .map_err(|e| PackagingError::io("stat manifest file", e))?
            .len();
        let sha256 =
            sha256_file(path).map_err(|e| PackagingError::io("hash manifest file", e))?;
        let entry = ManifestEntry {
            mime: mime_for(&filename).to_string(),
            filename,
            sha256,
            size,
        };
        Ok(self.entries.entry(key.to_string()).and_modify(|e| *e = entry.clone()).or_insert(entry))
    }

    /// Persist atomically as `manifest.json` under the session root.
    pub fn write(&self, session_root: &Path) -> PackagingResult<PathBuf> {
        let path = session_root.join(MANIFEST_FILENAME);
        let json = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp)
                .map_err(|e| PackagingError::io("create manifest temp", e))?;
            file.write_all(json.as_bytes())
                .map_err(|e| PackagingError::io("write manifest temp", e))?;
        }
        fs::rename(&tmp, &path).map_err(|e| PackagingError::io("publish manifest", e))?;
        Ok(path)
    }

    /// Load the manifest for a session root.
    pub fn load(session_root: &Path) -> PackagingResult<Self> {
        let path = session_root.join(MANIFEST_FILENAME);
        let content =
            fs::read_to_string(&path).map_err(|e| PackagingError::io("read manifest", e))?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Streaming sha256 of a file, hex encoded.
pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 1 << 20];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Content type by extension.
pub fn mime_for(filename: &str) -> &'static str {
    let extension = Path::new(filename)
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "wav" | "wave" => "audio/wav",
        "aif" | "aiff" => "audio/aiff",
        "flac" => "audio/flac",
        "json" => "application/json",
        "txt" => "text/plain",
        "zip" => "application/zip",
        "log" => "text/plain",
        _ => "application/octet-stream",
    }
}
