//! Session service: the narrow contract the transport layer calls.
//!
//! Upload, start, progress, download, clear, health check - all
//! transport-agnostic. The HTTP/CLI layer in front of this is an external
//! collaborator; nothing here knows about requests or responses.

mod range;

pub use range::{parse_range_header, read_file_range, ByteRange};

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::advisor::AdvisorStore;
use crate::analysis::{run_with_timeout, Analyzer};
use crate::config::Settings;
use crate::journal::{JournalError, ProgressJournal};
use crate::models::{InputDescriptor, Session};
use crate::orchestrator::{SessionWorkers, SubmitError};
use crate::packaging::{sha256_file, Manifest, ManifestEntry};

/// Timeout for the informational binary availability probe.
const HEALTH_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Length of the random session id prefix.
const SESSION_ID_RANDOM_CHARS: usize = 12;

/// Length of the checksum suffix in session ids.
const SESSION_ID_CHECKSUM_CHARS: usize = 8;

/// Errors surfaced to the transport layer.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Bad upload; no session side effects.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("session not found: {0}")]
    NotFound(String),

    /// Download key absent from the manifest.
    #[error("no download available for key '{0}'")]
    UnknownKey(String),

    /// On-disk bytes no longer match the manifest checksum.
    #[error("integrity check failed for '{key}': checksum mismatch")]
    Integrity { key: String },

    /// Worker queue is at capacity.
    #[error("session queue is full, retry later")]
    Busy,

    #[error(transparent)]
    Journal(#[from] JournalError),

    #[error(transparent)]
    Advisor(#[from] crate::advisor::AdvisorError),

    #[error("I/O error in {operation}: {source}")]
    Io {
        operation: String,
        #[source]
        source: io::Error,
    },
}

impl ServiceError {
    fn io(operation: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Availability of the external transform binaries. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct Health {
    pub ffmpeg: bool,
    pub ffprobe: bool,
}

impl Health {
    pub fn ok(&self) -> bool {
        self.ffmpeg && self.ffprobe
    }
}

/// A checksum-verified download, ready for full or ranged reads.
#[derive(Debug, Clone)]
pub struct Download {
    pub key: String,
    pub path: PathBuf,
    pub entry: ManifestEntry,
}

impl Download {
    /// Read the whole artifact.
    pub fn read_all(&self) -> ServiceResult<Vec<u8>> {
        fs::read(&self.path).map_err(|e| ServiceError::io("read download", e))
    }

    /// Resolve a range header against this artifact (full body on absent
    /// or unparseable headers).
    pub fn resolve_range(&self, header: Option<&str>) -> ByteRange {
        header
            .and_then(|header| parse_range_header(header, self.entry.size))
            .unwrap_or_else(|| ByteRange::full(self.entry.size))
    }

    /// Read the bytes covered by a resolved range.
    pub fn read_range(&self, range: &ByteRange) -> ServiceResult<Vec<u8>> {
        read_file_range(&self.path, range).map_err(|e| ServiceError::io("read download range", e))
    }
}

/// The session service facade.
pub struct SessionService {
    settings: Settings,
    workers: SessionWorkers,
}

impl SessionService {
    /// Build the service: opens the advisor store and starts the worker
    /// pool.
    pub fn new(settings: Settings) -> ServiceResult<Self> {
        fs::create_dir_all(&settings.paths.sessions_root)
            .map_err(|e| ServiceError::io("create sessions root", e))?;
        let advisor = Arc::new(AdvisorStore::open(
            &settings.paths.models_dir,
            settings.advisor.learning_rate,
        )?);
        let workers = SessionWorkers::new(
            settings.clone(),
            advisor,
            settings.workers.count,
            settings.workers.queue_capacity,
        );
        Ok(Self { settings, workers })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Sessions waiting in the worker queue.
    pub fn pending_sessions(&self) -> usize {
        self.workers.pending()
    }

    /// Accept one uploaded file and create a session for it.
    ///
    /// Shallow validation (extension allow-list, non-empty) always runs.
    /// Deep validation (duration bound, channel layout) runs only when
    /// the probe can parse the file; an unparseable file is accepted here
    /// and fails inside the pipeline, where the journal records it.
    pub fn upload(&self, source: &Path, original_filename: &str) -> ServiceResult<Session> {
        let filename = sanitize_upload_filename(original_filename)?;
        let extension = Path::new(&filename)
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if !self
            .settings
            .upload
            .allowed_extensions
            .iter()
            .any(|allowed| allowed == &extension)
        {
            return Err(ServiceError::Validation(
                "unsupported file type; use WAV/AIFF/FLAC".to_string(),
            ));
        }

        let size = fs::metadata(source)
            .map_err(|e| ServiceError::io("stat upload", e))?
            .len();
        if size == 0 {
            return Err(ServiceError::Validation("uploaded file is empty".to_string()));
        }

        let analyzer = Analyzer::from_settings(&self.settings.transform);
        let probe = match analyzer.probe(source) {
            Ok(info) => {
                if let Some(duration) = info.duration_secs {
                    let limit = self.settings.upload.max_duration_secs;
                    if duration > limit {
                        return Err(ServiceError::Validation(format!(
                            "duration exceeds {:.0} minutes limit",
                            limit / 60.0
                        )));
                    }
                }
                if let Some(channels) = info.channels {
                    if channels == 0 || channels > self.settings.upload.max_channels {
                        return Err(ServiceError::Validation(
                            "unsupported channel layout".to_string(),
                        ));
                    }
                }
                Some(info)
            }
            Err(e) => {
                tracing::debug!(error = %e, "upload probe failed, deferring to pipeline");
                None
            }
        };

        let checksum =
            sha256_file(source).map_err(|e| ServiceError::io("hash upload", e))?;
        let id = new_session_id(&checksum);
        let root = Path::new(&self.settings.paths.sessions_root).join(&id);
        fs::create_dir_all(&root).map_err(|e| ServiceError::io("create session directory", e))?;

        let stored_path = root.join(&filename);
        fs::copy(source, &stored_path).map_err(|e| ServiceError::io("store upload", e))?;

        let session = Session {
            id: id.clone(),
            root,
            input: InputDescriptor {
                filename,
                path: stored_path,
                sha256: checksum,
                size,
                duration_secs: probe.and_then(|info| info.duration_secs),
                channels: probe.and_then(|info| info.channels),
                sample_rate: probe.and_then(|info| info.sample_rate),
            },
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        tracing::info!(session = %session.id, file = %session.input.filename, size, "upload accepted");
        Ok(session)
    }

    /// Begin processing a session; returns as soon as the work is queued.
    ///
    /// The journal is seeded synchronously before the background task can
    /// possibly run, so an immediate poll never finds a missing document.
    pub fn start(&self, session: &Session) -> ServiceResult<()> {
        if !session.input.path.is_file() {
            return Err(ServiceError::Validation("no input file".to_string()));
        }
        let journal = ProgressJournal::new(&session.root);
        journal.init()?;
        self.workers.submit(session.clone()).map_err(|e| match e {
            SubmitError::QueueFull { .. } | SubmitError::ShutDown => ServiceError::Busy,
        })?;
        tracing::info!(session = %session.id, "session queued");
        Ok(())
    }

    /// The progress document, verbatim. Never cached.
    pub fn progress(&self, session_id: &str) -> ServiceResult<Value> {
        let root = self.session_root(session_id)?;
        let journal = ProgressJournal::new(&root);
        journal.read_value().map_err(|e| match e {
            JournalError::Missing(_) => ServiceError::NotFound(session_id.to_string()),
            other => ServiceError::Journal(other),
        })
    }

    /// A manifest-gated, checksum-verified download.
    pub fn download(&self, session_id: &str, key: &str) -> ServiceResult<Download> {
        let root = self.session_root(session_id)?;
        let manifest = Manifest::load(&root)
            .map_err(|_| ServiceError::UnknownKey(key.to_string()))?;
        let entry = manifest
            .get(key)
            .ok_or_else(|| ServiceError::UnknownKey(key.to_string()))?
            .clone();

        // The manifest only ever holds plain names; anything else means a
        // corrupted document and the download is refused.
        if Path::new(&entry.filename).components().count() != 1 {
            return Err(ServiceError::Integrity {
                key: key.to_string(),
            });
        }
        let path = root.join(&entry.filename);
        if !path.is_file() {
            return Err(ServiceError::Integrity {
                key: key.to_string(),
            });
        }
        let actual = sha256_file(&path).map_err(|e| ServiceError::io("hash download", e))?;
        if actual != entry.sha256 {
            tracing::warn!(session = session_id, key, "download checksum mismatch");
            return Err(ServiceError::Integrity {
                key: key.to_string(),
            });
        }

        Ok(Download {
            key: key.to_string(),
            path,
            entry,
        })
    }

    /// Delete the whole session directory tree. Idempotent.
    pub fn clear(&self, session_id: &str) -> ServiceResult<()> {
        validate_session_id(session_id)?;
        let root = Path::new(&self.settings.paths.sessions_root).join(session_id);
        match fs::remove_dir_all(&root) {
            Ok(()) => {
                tracing::info!(session = session_id, "session cleared");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ServiceError::io("clear session", e)),
        }
    }

    /// Report availability of the external transform binaries.
    pub fn health_check(&self) -> Health {
        Health {
            ffmpeg: binary_responds(&self.settings.transform.ffmpeg_bin),
            ffprobe: binary_responds(&self.settings.transform.ffprobe_bin),
        }
    }

    fn session_root(&self, session_id: &str) -> ServiceResult<PathBuf> {
        validate_session_id(session_id)?;
        let root = Path::new(&self.settings.paths.sessions_root).join(session_id);
        if !root.is_dir() {
            return Err(ServiceError::NotFound(session_id.to_string()));
        }
        Ok(root)
    }
}

fn binary_responds(bin: &str) -> bool {
    let mut cmd = Command::new(bin);
    cmd.arg("-version");
    run_with_timeout(&mut cmd, bin, HEALTH_PROBE_TIMEOUT).is_ok()
}

/// Random prefix plus content-checksum suffix; directories are
/// independent per session, so no cross-session locking is needed.
fn new_session_id(checksum: &str) -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!(
        "{}-{}",
        &random[..SESSION_ID_RANDOM_CHARS],
        &checksum[..SESSION_ID_CHECKSUM_CHARS.min(checksum.len())]
    )
}

fn validate_session_id(session_id: &str) -> ServiceResult<()> {
    let valid = !session_id.is_empty()
        && session_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-');
    if valid {
        Ok(())
    } else {
        Err(ServiceError::Validation("invalid session id".to_string()))
    }
}

/// Reduce an upload name to a plain, safe filename.
fn sanitize_upload_filename(original: &str) -> ServiceResult<String> {
    let name = Path::new(original)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    if name.is_empty() || name == "." || name == ".." {
        return Err(ServiceError::Validation("missing filename".to_string()));
    }
    Ok(name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            _ => c,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn service(dir: &TempDir) -> SessionService {
        let mut settings = Settings::default();
        settings.paths.sessions_root = dir.path().join("sessions").display().to_string();
        settings.paths.models_dir = dir.path().join("models").display().to_string();
        // Point the transform at nothing so probes fail fast and uploads
        // take the deferred-validation path.
        settings.transform.ffmpeg_bin = "peakforge-test-missing-ffmpeg".to_string();
        settings.transform.ffprobe_bin = "peakforge-test-missing-ffprobe".to_string();
        settings.workers.count = 1;
        SessionService::new(settings).unwrap()
    }

    fn write_upload(dir: &TempDir, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn upload_rejects_unsupported_extension() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);
        let upload = write_upload(&dir, "notes.txt", b"hello");
        let err = svc.upload(&upload, "notes.txt").unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[test]
    fn upload_rejects_empty_file() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);
        let upload = write_upload(&dir, "empty.wav", b"");
        let err = svc.upload(&upload, "empty.wav").unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[test]
    fn upload_accepts_unparseable_audio_extension() {
        // A non-audio file with an audio extension is accepted; the
        // pipeline fails it later into the journal's error state.
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);
        let upload = write_upload(&dir, "fake.wav", b"definitely not audio");
        let session = svc.upload(&upload, "fake.wav").unwrap();
        assert!(session.input.path.is_file());
        assert!(session.id.contains('-'));
        assert!(session.input.duration_secs.is_none());
    }

    #[test]
    fn start_seeds_journal_before_returning() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);
        let upload = write_upload(&dir, "fake.wav", b"not audio");
        let session = svc.upload(&upload, "fake.wav").unwrap();
        svc.start(&session).unwrap();

        // An immediate poll finds a document, whatever the workers are
        // doing.
        let progress = svc.progress(&session.id).unwrap();
        assert!(progress["phase"].is_string());
        assert!(progress["percent"].is_number());
    }

    #[test]
    fn fake_audio_session_ends_in_terminal_error() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);
        let upload = write_upload(&dir, "fake.wav", b"not audio");
        let session = svc.upload(&upload, "fake.wav").unwrap();
        svc.start(&session).unwrap();

        let mut saw_error = false;
        for _ in 0..100 {
            let progress = svc.progress(&session.id).unwrap();
            if progress["done"] == true && progress["phase"] == "error" {
                assert!(progress["error"].as_str().unwrap_or_default().len() > 0);
                saw_error = true;
                break;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
        assert!(saw_error, "session never reached the terminal error state");
    }

    #[test]
    fn progress_for_unknown_session_is_not_found() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);
        assert!(matches!(
            svc.progress("nope"),
            Err(ServiceError::NotFound(_))
        ));
    }

    #[test]
    fn download_requires_manifest_entry_and_matching_checksum() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);
        let upload = write_upload(&dir, "track.wav", b"payload");
        let session = svc.upload(&upload, "track.wav").unwrap();

        // No manifest yet: every key is unknown.
        assert!(matches!(
            svc.download(&session.id, "club"),
            Err(ServiceError::UnknownKey(_))
        ));

        // Manifest present: a valid entry round-trips its checksum.
        let artifact = session.root.join("club_master.wav");
        fs::write(&artifact, b"rendered").unwrap();
        let mut manifest = Manifest::new();
        manifest.insert_file("club", &artifact).unwrap();
        manifest.write(&session.root).unwrap();

        let download = svc.download(&session.id, "club").unwrap();
        let bytes = download.read_all().unwrap();
        assert_eq!(bytes, b"rendered");
        let rehashed = {
            use sha2::{Digest, Sha256};
            format!("{:x}", Sha256::digest(&bytes))
        };
        assert_eq!(rehashed, download.entry.sha256);

        // Tampering after packaging is rejected outright.
        let mut corrupted = fs::read(&artifact).unwrap();
        corrupted.extend_from_slice(b"corrupt");
        fs::write(&artifact, corrupted).unwrap();
        assert!(matches!(
            svc.download(&session.id, "club"),
            Err(ServiceError::Integrity { .. })
        ));
    }

    #[test]
    fn download_supports_byte_ranges() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);
        let upload = write_upload(&dir, "track.wav", b"payload");
        let session = svc.upload(&upload, "track.wav").unwrap();

        let artifact = session.root.join("club_master.wav");
        fs::write(&artifact, b"0123456789").unwrap();
        let mut manifest = Manifest::new();
        manifest.insert_file("club", &artifact).unwrap();
        manifest.write(&session.root).unwrap();

        let download = svc.download(&session.id, "club").unwrap();
        let range = download.resolve_range(Some("bytes=2-5"));
        assert!(!range.is_full());
        assert_eq!(download.read_range(&range).unwrap(), b"2345");
        assert_eq!(range.content_range(), "bytes 2-5/10");

        let full = download.resolve_range(None);
        assert!(full.is_full());
        assert_eq!(download.read_range(&full).unwrap().len(), 10);
    }

    #[test]
    fn clear_is_idempotent_and_forgets_the_session() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);
        let upload = write_upload(&dir, "track.wav", b"payload");
        let session = svc.upload(&upload, "track.wav").unwrap();
        assert!(session.root.is_dir());

        svc.clear(&session.id).unwrap();
        assert!(!session.root.exists());
        // Second clear never errors.
        svc.clear(&session.id).unwrap();

        assert!(matches!(
            svc.progress(&session.id),
            Err(ServiceError::NotFound(_))
        ));
    }

    #[test]
    fn malformed_session_ids_are_rejected() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);
        assert!(matches!(
            svc.progress("../../etc"),
            Err(ServiceError::Validation(_))
        ));
        assert!(matches!(svc.clear(""), Err(ServiceError::Validation(_))));
    }

    #[test]
    fn health_check_reports_missing_binaries() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);
        let health = svc.health_check();
        assert!(!health.ffmpeg);
        assert!(!health.ffprobe);
        assert!(!health.ok());
    }

    #[test]
    fn upload_filenames_are_sanitized() {
        assert_eq!(
            sanitize_upload_filename("../../evil/track.wav").unwrap(),
            "track.wav"
        );
        assert_eq!(
            sanitize_upload_filename("we\"ird:name.wav").unwrap(),
            "we_ird_name.wav"
        );
        assert!(sanitize_upload_filename("").is_err());
    }
}
