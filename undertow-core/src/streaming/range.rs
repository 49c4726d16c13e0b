//! HTTP byte-range parsing

use std::fmt;

/// Inclusive byte interval within a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Creates an inclusive range. Callers guarantee `start <= end`.
    pub fn new(start: u64, end: u64) -> Self {
        debug_assert!(start <= end, "range start {start} after end {end}");
        Self { start, end }
    }

    /// Number of bytes covered.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Inclusive ranges always cover at least one byte.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// `Content-Range` header value for a file of `file_length` bytes.
    pub fn content_range(&self, file_length: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, file_length)
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Range header rejected before any byte is served.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RangeError {
    #[error("Malformed range header: {header}")]
    Malformed { header: String },

    #[error("Range {header} not satisfiable for {file_length} bytes")]
    Unsatisfiable { header: String, file_length: u64 },
}

impl RangeError {
    fn malformed(header: &str) -> Self {
        RangeError::Malformed {
            header: header.to_string(),
        }
    }
}

/// Parses a `Range` header against a file of `file_length` bytes.
///
/// Accepts `bytes=S-E`, `bytes=S-` (end defaults to the last byte) and
/// `bytes=-N` (last N bytes). An end past the file is clamped to the last
/// byte. Multiple ranges are not supported.
///
/// # Errors
/// - `RangeError::Malformed` - Wrong unit, multiple ranges or non-numeric bounds
/// - `RangeError::Unsatisfiable` - `start > end`, `start >= file_length` or empty suffix
pub fn parse_range_header(header: &str, file_length: u64) -> Result<ByteRange, RangeError> {
    let spec = header
        .trim()
        .strip_prefix("bytes=")
        .ok_or_else(|| RangeError::malformed(header))?;

    if spec.contains(',') {
        return Err(RangeError::malformed(header));
    }

    let (start_str, end_str) = spec
        .split_once('-')
        .ok_or_else(|| RangeError::malformed(header))?;
    let (start_str, end_str) = (start_str.trim(), end_str.trim());

    let unsatisfiable = || RangeError::Unsatisfiable {
        header: header.to_string(),
        file_length,
    };

    if start_str.is_empty() {
        let suffix = parse_bound(end_str).ok_or_else(|| RangeError::malformed(header))?;
        if suffix == 0 || file_length == 0 {
            return Err(unsatisfiable());
        }
        let start = file_length.saturating_sub(suffix);
        return Ok(ByteRange::new(start, file_length - 1));
    }

    let start = parse_bound(start_str).ok_or_else(|| RangeError::malformed(header))?;
    let end = if end_str.is_empty() {
        None
    } else {
        Some(parse_bound(end_str).ok_or_else(|| RangeError::malformed(header))?)
    };

    if start >= file_length || end.is_some_and(|end| start > end) {
        return Err(unsatisfiable());
    }

    let last_byte = file_length - 1;
    let end = end.map_or(last_byte, |end| end.min(last_byte));

    Ok(ByteRange::new(start, end))
}

/// Digits only; rejects signs and whitespace that `u64::from_str` would not.
fn parse_bound(raw: &str) -> Option<u64> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok()
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_explicit_range() {
        let range = parse_range_header("bytes=0-499", 1000).unwrap();
        assert_eq!(range, ByteRange::new(0, 499));
        assert_eq!(range.len(), 500);
        assert_eq!(range.content_range(1000), "bytes 0-499/1000");
    }

    #[test]
    fn test_open_ended_range_defaults_to_last_byte() {
        let range = parse_range_header("bytes=900-", 1000).unwrap();
        assert_eq!(range, ByteRange::new(900, 999));
    }

    #[test]
    fn test_suffix_range() {
        assert_eq!(
            parse_range_header("bytes=-100", 1000).unwrap(),
            ByteRange::new(900, 999)
        );
        assert_eq!(
            parse_range_header("bytes=-5000", 1000).unwrap(),
            ByteRange::new(0, 999)
        );
    }

    #[test]
    fn test_end_past_file_is_clamped() {
        assert_eq!(
            parse_range_header("bytes=500-5000", 1000).unwrap(),
            ByteRange::new(500, 999)
        );
    }

    #[test]
    fn test_malformed_ranges() {
        for header in [
            "bytes=abc-10",
            "bytes=10-xyz",
            "items=0-10",
            "bytes=0-1,5-6",
            "bytes=",
            "bytes=-",
            "bytes=+1-5",
            "0-10",
        ] {
            assert!(
                matches!(
                    parse_range_header(header, 1000),
                    Err(RangeError::Malformed { .. })
                ),
                "{header} should be malformed"
            );
        }
    }

    #[test]
    fn test_unsatisfiable_ranges() {
        for header in ["bytes=500-100", "bytes=1000-", "bytes=1000-1200", "bytes=-0"] {
            assert!(
                matches!(
                    parse_range_header(header, 1000),
                    Err(RangeError::Unsatisfiable { .. })
                ),
                "{header} should be unsatisfiable"
            );
        }
    }

    #[test]
    fn test_empty_file_never_satisfiable() {
        assert!(parse_range_header("bytes=0-", 0).is_err());
        assert!(parse_range_header("bytes=-10", 0).is_err());
    }

    proptest! {
        #[test]
        fn valid_range_has_exact_length(length in 1u64..10_000_000, a in any::<u64>(), b in any::<u64>()) {
            let start = a % length;
            let end = start + b % (length - start);
            let range = parse_range_header(&format!("bytes={start}-{end}"), length).unwrap();
            prop_assert_eq!(range.start, start);
            prop_assert_eq!(range.end, end);
            prop_assert_eq!(range.len(), end - start + 1);
        }

        #[test]
        fn reversed_range_is_rejected(length in 2u64..10_000_000, a in any::<u64>(), b in any::<u64>()) {
            let end = a % (length - 1);
            let start = end + 1 + b % (length - end - 1).max(1);
            let header = format!("bytes={start}-{end}");
            prop_assert!(parse_range_header(&header, length).is_err());
        }

        #[test]
        fn start_past_file_is_rejected(length in 0u64..10_000_000, extra in 0u64..1_000) {
            let start = length + extra;
            let header = format!("bytes={start}-");
            prop_assert!(parse_range_header(&header, length).is_err());
        }
    }
}
