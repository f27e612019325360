//! Chunk partitioning and content fingerprinting for the upload client.
//!
//! A file is split into a fixed number of contiguous byte ranges
//! ([`partition`]) and fingerprinted by streaming those ranges, in order,
//! through a single SHA-256 hasher ([`spawn_fingerprint`]). The fingerprint
//! is therefore a property of the file's bytes alone: partitioning the same
//! content into a different number of chunks yields the same hash.

mod chunker;
mod fingerprint;

pub use chunker::{partition, read_range, ByteRange};
pub use fingerprint::{fingerprint_file, spawn_fingerprint, FingerprintEvent};

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
