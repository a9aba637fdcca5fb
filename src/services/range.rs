//! Byte-range selection for `Range: bytes=<start>-<end>` requests.

/// Inclusive byte range `[start, end]` inside a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Number of bytes covered (never zero for a valid range).
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// `Content-Range` header value for a resource of `size` bytes.
    pub fn content_range(&self, size: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, size)
    }
}

/// What to serve for a request against a resource of known size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeSelection {
    /// No usable range header; serve everything with 200.
    Full,
    /// Serve exactly this range with 206.
    Partial(ByteRange),
    /// Range lies outside the resource; respond 416.
    Unsatisfiable,
}

/// Decide what part of a `size`-byte resource a request asks for.
///
/// Only a single `bytes=<start>-<end?>` spec is honoured; an omitted end
/// means "to the last byte". Anything else (suffix ranges, multiple ranges,
/// other units, garbage) is ignored and the full resource is served.
pub fn select_range(header: Option<&str>, size: u64) -> RangeSelection {
    let Some((start, end)) = header.and_then(parse_bytes_spec) else {
        return RangeSelection::Full;
    };

    if start >= size {
        return RangeSelection::Unsatisfiable;
    }
    let end = end.unwrap_or(size - 1);
    if end >= size || start > end {
        return RangeSelection::Unsatisfiable;
    }

    RangeSelection::Partial(ByteRange { start, end })
}

fn parse_bytes_spec(value: &str) -> Option<(u64, Option<u64>)> {
    let spec = value.trim().strip_prefix("bytes=")?;
    if spec.contains(',') {
        return None;
    }
    let (start, end) = spec.split_once('-')?;
    let start = parse_offset(start)?;
    let end = end.trim();
    let end = if end.is_empty() {
        None
    } else {
        Some(parse_offset(end)?)
    };
    Some((start, end))
}

fn parse_offset(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_byte() {
        let sel = select_range(Some("bytes=0-0"), 100);
        let RangeSelection::Partial(range) = sel else {
            panic!("expected partial, got {sel:?}");
        };
        assert_eq!(range.len(), 1);
        assert_eq!(range.content_range(100), "bytes 0-0/100");
    }

    #[test]
    fn start_at_size_is_unsatisfiable() {
        assert_eq!(
            select_range(Some("bytes=100-100"), 100),
            RangeSelection::Unsatisfiable
        );
        assert_eq!(
            select_range(Some("bytes=100-"), 100),
            RangeSelection::Unsatisfiable
        );
    }

    #[test]
    fn open_end_runs_to_last_byte() {
        assert_eq!(
            select_range(Some("bytes=40-"), 100),
            RangeSelection::Partial(ByteRange { start: 40, end: 99 })
        );
    }

    #[test]
    fn end_past_size_or_inverted_is_unsatisfiable() {
        assert_eq!(
            select_range(Some("bytes=0-100"), 100),
            RangeSelection::Unsatisfiable
        );
        assert_eq!(
            select_range(Some("bytes=50-10"), 100),
            RangeSelection::Unsatisfiable
        );
    }

    #[test]
    fn empty_resource_has_no_satisfiable_range() {
        assert_eq!(
            select_range(Some("bytes=0-"), 0),
            RangeSelection::Unsatisfiable
        );
        assert_eq!(select_range(None, 0), RangeSelection::Full);
    }

    #[test]
    fn unsupported_forms_fall_back_to_full() {
        for header in [
            "bytes=-500",
            "bytes=0-1,4-5",
            "items=0-1",
            "bytes=a-b",
            "bytes=+1-2",
            "bytes=99999999999999999999999-",
            "",
        ] {
            assert_eq!(select_range(Some(header), 100), RangeSelection::Full, "{header}");
        }
        assert_eq!(select_range(None, 100), RangeSelection::Full);
    }

    #[test]
    fn tolerates_whitespace() {
        assert_eq!(
            select_range(Some(" bytes=1 - 2 "), 10),
            RangeSelection::Partial(ByteRange { start: 1, end: 2 })
        );
    }
}
