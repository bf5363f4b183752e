//! Packaging: checksums, manifest, per-target reports, session descriptor,
//! and the bundle archive.

mod archive;
mod descriptor;
mod manifest;
mod report;

pub use archive::{write_bundle, BUNDLE_FILENAME};
pub use descriptor::{build_descriptor, write_descriptor, DESCRIPTOR_FILENAME};
pub use manifest::{
    mime_for, sha256_file, Manifest, ManifestEntry, PackagingError, PackagingResult,
    MANIFEST_FILENAME,
};
pub use report::{fmt_measure, report_filename, write_report};
