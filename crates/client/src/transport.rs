//! Transport seam between the controller and the server.
//!
//! A trait with boxed futures keeps the controller decoupled from the wire
//! and testable with in-memory mocks.

use std::future::Future;
use std::pin::Pin;

use chunkport_protocol::messages::{MergeRequest, VerifyRequest, VerifyResponse};
use chunkport_protocol::ChunkId;

use crate::UploadError;

/// Per-chunk upload progress callback, invoked with a percentage in
/// `[0, 100]` as bytes are handed to the transport.
pub type ProgressFn = Box<dyn Fn(f64) + Send + Sync>;

/// One chunk's worth of upload data plus the metadata the server files it
/// under.
#[derive(Debug, Clone)]
pub struct ChunkUpload {
    pub file_name: String,
    pub file_hash: String,
    pub chunk_id: ChunkId,
    pub bytes: Vec<u8>,
}

/// Request/response transport to the chunk server.
pub trait Transport: Send + Sync {
    /// Asks which chunks the server already holds.
    fn verify(
        &self,
        req: VerifyRequest,
    ) -> Pin<Box<dyn Future<Output = Result<VerifyResponse, UploadError>> + Send + '_>>;

    /// Transfers one chunk, reporting progress through `progress`.
    ///
    /// Dropping the returned future aborts the transfer; the server's
    /// two-phase write guarantees an aborted transfer leaves nothing
    /// visible.
    fn upload_chunk(
        &self,
        upload: ChunkUpload,
        progress: ProgressFn,
    ) -> Pin<Box<dyn Future<Output = Result<(), UploadError>> + Send + '_>>;

    /// Asks the server to reassemble all stored chunks.
    fn merge(
        &self,
        req: MergeRequest,
    ) -> Pin<Box<dyn Future<Output = Result<(), UploadError>> + Send + '_>>;
}
