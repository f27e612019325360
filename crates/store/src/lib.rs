//! Server-side content-addressed chunk store.
//!
//! Chunks live under `root/<file_hash>/<file_hash>-<index>` until a merge
//! reassembles them, in numeric index order, into `root/<file_hash><ext>`.
//! Every write is two-phase: bytes land in `root/.tmp` first and are renamed
//! into place only once complete, so a partially-written file is never
//! visible under its final name.
//!
//! The store takes no lock against an upload racing a merge for the same
//! file hash; callers sequence merge after all uploads have acked.

mod store;

pub use store::ChunkStore;

/// Errors produced by the chunk store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid name: {0}")]
    InvalidName(String),

    #[error("no chunks stored for file hash {0}")]
    NoChunks(String),

    #[error("unexpected file in chunk directory: {0}")]
    UnexpectedChunkFile(String),
}
