//! In-memory state of one upload session (thread-safe).

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chunkport_transfer::ByteRange;

/// Session state machine.
///
/// `Initial → Hashing → (Success | Pending)`; `Pending ⇄ Paused`;
/// `Pending → Success`. `Success` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStatus {
    Initial,
    Hashing,
    Pending,
    Paused,
    Success,
}

/// Per-chunk transfer state.
#[derive(Debug, Clone)]
pub struct ChunkState {
    pub index: u32,
    pub range: ByteRange,
    pub uploaded_percent: f64,
}

impl ChunkState {
    /// Size of the chunk in bytes.
    pub fn size(&self) -> u64 {
        self.range.len()
    }
}

/// One file's upload session. Created on file selection; a new file gets a
/// new session.
pub struct UploadSession {
    file_path: PathBuf,
    file_name: String,
    total_size: u64,
    inner: RwLock<SessionInner>,
}

struct SessionInner {
    file_hash: Option<String>,
    chunks: Vec<ChunkState>,
    status: UploadStatus,
}

impl UploadSession {
    /// Creates a fresh session in `Initial` state.
    pub fn new(file_path: PathBuf, file_name: String, total_size: u64) -> Self {
        Self {
            file_path,
            file_name,
            total_size,
            inner: RwLock::new(SessionInner {
                file_hash: None,
                chunks: Vec::new(),
                status: UploadStatus::Initial,
            }),
        }
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn status(&self) -> UploadStatus {
        self.inner.read().unwrap().status
    }

    pub(crate) fn set_status(&self, status: UploadStatus) {
        self.inner.write().unwrap().status = status;
    }

    /// Updates the status only if the current status matches `from`.
    /// Returns whether the transition happened.
    pub(crate) fn transition(&self, from: UploadStatus, to: UploadStatus) -> bool {
        let mut s = self.inner.write().unwrap();
        if s.status == from {
            s.status = to;
            true
        } else {
            false
        }
    }

    pub fn file_hash(&self) -> Option<String> {
        self.inner.read().unwrap().file_hash.clone()
    }

    pub(crate) fn set_file_hash(&self, hash: String) {
        self.inner.write().unwrap().file_hash = Some(hash);
    }

    /// Installs the chunk partition, resetting all progress.
    pub(crate) fn set_chunks(&self, ranges: &[ByteRange]) {
        let chunks = ranges
            .iter()
            .enumerate()
            .map(|(i, r)| ChunkState {
                index: i as u32,
                range: *r,
                uploaded_percent: 0.0,
            })
            .collect();
        self.inner.write().unwrap().chunks = chunks;
    }

    /// Snapshot of all chunk states.
    pub fn chunks(&self) -> Vec<ChunkState> {
        self.inner.read().unwrap().chunks.clone()
    }

    pub(crate) fn set_chunk_progress(&self, index: u32, percent: f64) {
        let mut s = self.inner.write().unwrap();
        if let Some(chunk) = s.chunks.get_mut(index as usize) {
            chunk.uploaded_percent = percent.clamp(0.0, 100.0);
        }
    }

    /// Aggregate progress: the mean of all chunks' percentages.
    pub fn aggregate_progress(&self) -> f64 {
        let s = self.inner.read().unwrap();
        if s.chunks.is_empty() {
            return 0.0;
        }
        s.chunks.iter().map(|c| c.uploaded_percent).sum::<f64>() / s.chunks.len() as f64
    }
}
