//! Chunk identity: the stable key a chunk is stored and deduplicated under.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Identity of one chunk: the whole-file content hash plus the chunk's
/// position in the partition.
///
/// Rendered as `{file_hash}-{index}`, which is also the on-disk filename in
/// the chunk store. Two chunks with the same identity are byte-identical.
///
/// Ordering compares the index numerically. This matters during merge:
/// `"{hash}-10"` sorts before `"{hash}-2"` as a string, but chunk 2 must be
/// appended first.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChunkId {
    file_hash: String,
    index: u32,
}

/// Error parsing a `ChunkId` from its string form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid chunk id: {0:?}")]
pub struct ChunkIdParseError(pub String);

impl ChunkId {
    /// Creates the identity for chunk `index` of the file with `file_hash`.
    pub fn new(file_hash: impl Into<String>, index: u32) -> Self {
        Self {
            file_hash: file_hash.into(),
            index,
        }
    }

    /// The whole-file content hash this chunk belongs to.
    pub fn file_hash(&self) -> &str {
        &self.file_hash
    }

    /// The chunk's position in the file partition.
    pub fn index(&self) -> u32 {
        self.index
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.file_hash, self.index)
    }
}

impl FromStr for ChunkId {
    type Err = ChunkIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (file_hash, index) = s
            .rsplit_once('-')
            .ok_or_else(|| ChunkIdParseError(s.to_string()))?;
        if file_hash.is_empty() {
            return Err(ChunkIdParseError(s.to_string()));
        }
        let index = index
            .parse::<u32>()
            .map_err(|_| ChunkIdParseError(s.to_string()))?;
        Ok(Self {
            file_hash: file_hash.to_string(),
            index,
        })
    }
}

impl TryFrom<String> for ChunkId {
    type Error = ChunkIdParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ChunkId> for String {
    fn from(id: ChunkId) -> Self {
        id.to_string()
    }
}
