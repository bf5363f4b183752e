//! Session bundle archive.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::manifest::{PackagingError, PackagingResult};

pub const BUNDLE_FILENAME: &str = "peakforge_session.zip";

/// Bundle the named session files into one archive.
///
/// Missing members are skipped (a failed target leaves its slot empty),
/// so the bundle always reflects exactly what was produced.
pub fn write_bundle(session_root: &Path, members: &[String]) -> PackagingResult<PathBuf> {
    let path = session_root.join(BUNDLE_FILENAME);
    let file =
        fs::File::create(&path).map_err(|e| PackagingError::io("create bundle archive", e))?;
    let mut archive = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for member in members {
        let member_path = session_root.join(member);
        if !member_path.is_file() {
            tracing::debug!(member, "bundle member missing, skipped");
            continue;
        }
        archive.start_file(member.as_str(), options)?;
        let mut source = fs::File::open(&member_path)
            .map_err(|e| PackagingError::io("open bundle member", e))?;
        io::copy(&mut source, &mut archive)
            .map_err(|e| PackagingError::io("copy bundle member", e))?;
    }

    archive.finish()?;
    Ok(path)
}
