//! Human-readable per-target reports.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Report filename for an output: `club_master.wav` -> `club_master_INFO.txt`.
pub fn report_filename(output_filename: &str) -> String {
    let stem = Path::new(output_filename)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| output_filename.to_string());
    format!("{stem}_INFO.txt")
}

/// Write the report next to the output file and return its path.
pub fn write_report(
    output_path: &Path,
    spec_line: &str,
    measured_lines: &[String],
) -> io::Result<PathBuf> {
    let output_name = output_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let report_path = output_path.with_file_name(report_filename(&output_name));

    let mut file = fs::File::create(&report_path)?;
    writeln!(file, "Output: {output_name}")?;
    writeln!(file, "Spec: {spec_line}")?;
    writeln!(file, "Measured (post):")?;
    for line in measured_lines {
        writeln!(file, "- {line}")?;
    }
    Ok(report_path)
}

/// Format an optional measurement for report lines.
pub fn fmt_measure(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{v:.2}"),
        None => "n/a".to_string(),
    }
}
