use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::TransferError;

/// A contiguous half-open byte range `[start, end)` of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Length of the range in bytes.
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    /// Returns `true` if the range covers no bytes.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Splits a file of `total_size` bytes into at most `parts` contiguous
/// ranges of `ceil(total_size / parts)` bytes each, the last possibly
/// shorter.
///
/// The emitted count may be less than `parts` for small files, but is
/// deterministic for a given `(total_size, parts)`. `parts` must be >= 1.
pub fn partition(total_size: u64, parts: usize) -> Vec<ByteRange> {
    debug_assert!(parts >= 1, "parts must be >= 1");

    let chunk_size = total_size.div_ceil(parts as u64);
    let mut ranges = Vec::new();
    let mut start = 0;
    while start < total_size {
        let end = (start + chunk_size).min(total_size);
        ranges.push(ByteRange { start, end });
        start = end;
    }
    ranges
}

/// Reads exactly the bytes covered by `range` from the file at `path`.
pub fn read_range(path: &Path, range: ByteRange) -> Result<Vec<u8>, TransferError> {
    let mut file = std::fs::File::open(path)?;
    file.seek(SeekFrom::Start(range.start))?;
    let mut buf = vec![0u8; range.len() as usize];
    file.read_exact(&mut buf)?;
    Ok(buf)
}
