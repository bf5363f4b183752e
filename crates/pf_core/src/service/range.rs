//! Byte-range reads for audio preview playback.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

/// A resolved, clamped byte range within a file of `total` bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
    pub total: u64,
}

impl ByteRange {
    /// Whole-file range.
    pub fn full(total: u64) -> Self {
        Self {
            start: 0,
            end: total.saturating_sub(1),
            total,
        }
    }

    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Whether this covers the whole file (a full-body response).
    pub fn is_full(&self) -> bool {
        self.start == 0 && self.end == self.total.saturating_sub(1)
    }

    /// `bytes start-end/total` header value for partial responses.
    pub fn content_range(&self) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, self.total)
    }
}

/// Parse a `bytes=start-end` range header against a file size.
///
/// Open-ended forms (`bytes=100-`, `bytes=-500` meaning a start offset in
/// this dialect) clamp into the file like the preview player expects.
/// Returns `None` for unparseable headers; callers fall back to the full
/// body.
pub fn parse_range_header(header: &str, total: u64) -> Option<ByteRange> {
    if total == 0 {
        return None;
    }
    let (unit, spec) = header.split_once('=')?;
    if unit.trim() != "bytes" {
        return None;
    }
    let (start_text, end_text) = spec.trim().split_once('-')?;

    let start = if start_text.is_empty() {
        0
    } else {
        start_text.parse::<u64>().ok()?
    };
    let end = if end_text.is_empty() {
        total - 1
    } else {
        end_text.parse::<u64>().ok()?
    };

    let start = start.min(total - 1);
    let end = end.min(total - 1);
    if end < start {
        return None;
    }
    Some(ByteRange { start, end, total })
}

/// Read the bytes covered by a range.
pub fn read_file_range(path: &Path, range: &ByteRange) -> io::Result<Vec<u8>> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(range.start))?;
    let mut buffer = vec![0u8; range.len() as usize];
    file.read_exact(&mut buffer)?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn full_range_covers_file() {
        let range = ByteRange::full(100);
        assert_eq!(range.start, 0);
        assert_eq!(range.end, 99);
        assert_eq!(range.len(), 100);
        assert!(range.is_full());
    }

    #[test]
    fn explicit_range_parses() {
        let range = parse_range_header("bytes=10-19", 100).unwrap();
        assert_eq!((range.start, range.end), (10, 19));
        assert_eq!(range.len(), 10);
        assert!(!range.is_full());
        assert_eq!(range.content_range(), "bytes 10-19/100");
    }

    #[test]
    fn open_ended_ranges_clamp_to_file() {
        let range = parse_range_header("bytes=90-", 100).unwrap();
        assert_eq!((range.start, range.end), (90, 99));

        let range = parse_range_header("bytes=50-5000", 100).unwrap();
        assert_eq!((range.start, range.end), (50, 99));

        let range = parse_range_header("bytes=-20", 100).unwrap();
        assert_eq!((range.start, range.end), (0, 20));
    }

    #[test]
    fn junk_headers_are_rejected() {
        assert!(parse_range_header("items=0-10", 100).is_none());
        assert!(parse_range_header("bytes=abc-def", 100).is_none());
        assert!(parse_range_header("bytes=30-10", 100).is_none());
        assert!(parse_range_header("bytes=0-10", 0).is_none());
    }

    #[test]
    fn range_read_returns_exact_slice() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, b"0123456789").unwrap();

        let range = parse_range_header("bytes=3-6", 10).unwrap();
        let bytes = read_file_range(&path, &range).unwrap();
        assert_eq!(bytes, b"3456");
    }
}
