//! HTTP front end for the chunk store.
//!
//! Three endpoints, mirroring the wire protocol in `chunkport-protocol`:
//! `POST /api/verify` (JSON), `POST /api/upload` (multipart), and
//! `POST /api/merge` (JSON). All responses allow cross-origin access so a
//! browser-hosted upload client can talk to the server directly.

mod routes;
mod server;

pub use server::{ServerConfig, UploadServer, DEFAULT_MAX_BODY_BYTES};

/// Errors produced by the server crate.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Store(#[from] chunkport_store::StoreError),
}
