//! `Content-Range` header parsing (C2).
//!
//! Chunked blob uploads (`PATCH .../blobs/uploads/<uuid>`) carry a `Content-Range`
//! header of the form `bytes <start>-<end>/<total>` (the `<total>` component is not
//! meaningful for resumable uploads, since the client doesn't yet know the final
//! size, but the shape is parsed so malformed headers are rejected up front).
use crate::errors::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    pub start: u64,
    pub end: u64,
}

impl ContentRange {
    /// Parse `bytes <start>-<end>/<total>`. Rejects a missing `bytes ` prefix,
    /// missing `-` or `/`, non-numeric components, and `start > end`.
    pub fn parse(s: &str) -> Result<Self, Error> {
        let s = s
            .strip_prefix("bytes ")
            .ok_or_else(|| Error::InvalidContentRange(s.to_string()))?;

        let (range, _total) = s
            .split_once('/')
            .ok_or_else(|| Error::InvalidContentRange(s.to_string()))?;

        let (start, end) = range
            .split_once('-')
            .ok_or_else(|| Error::InvalidContentRange(s.to_string()))?;

        let start: u64 = start
            .parse()
            .map_err(|_| Error::InvalidContentRange(s.to_string()))?;
        let end: u64 = end
            .parse()
            .map_err(|_| Error::InvalidContentRange(s.to_string()))?;

        if start > end {
            return Err(Error::InvalidContentRange(s.to_string()));
        }

        Ok(ContentRange { start, end })
    }
}

#[cfg(test)]
mod test {
    use rstest::*;

    use super::*;

    #[rstest]
    #[case::basic("bytes 0-4/10", Some((0, 4)))]
    #[case::second_chunk("bytes 5-9/10", Some((5, 9)))]
    #[case::unknown_total("bytes 0-99/*", Some((0, 99)))]
    #[case::missing_prefix("0-4/10", None)]
    #[case::missing_slash("bytes 0-4", None)]
    #[case::missing_dash("bytes 04/10", None)]
    #[case::non_numeric("bytes a-b/10", None)]
    #[case::swapped("bytes 9-5/10", None)]
    fn parses(#[case] input: &str, #[case] expected: Option<(u64, u64)>) {
        let actual = ContentRange::parse(input).ok().map(|r| (r.start, r.end));
        assert_eq!(actual, expected);
    }
}
