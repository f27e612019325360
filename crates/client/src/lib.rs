//! Upload client: session state machine, concurrent chunk transfers, and
//! the transport seam.
//!
//! One [`UploadController`] drives one file through
//! `Initial → Hashing → (Success | Pending)`, with `Pending ⇄ Paused` under
//! user control. Selecting a new file means constructing a new controller;
//! sessions are not reused across files.
//!
//! The controller talks to the server through the [`Transport`] trait so
//! tests can substitute mocks; [`HttpTransport`] is the reqwest-backed
//! implementation of the real wire protocol.

mod controller;
mod http;
mod session;
mod transport;

pub use controller::{UploadController, UploadEvent};
pub use http::HttpTransport;
pub use session::{ChunkState, UploadSession, UploadStatus};
pub use transport::{ChunkUpload, ProgressFn, Transport};

/// Errors produced by the upload client.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Transfer(#[from] chunkport_transfer::TransferError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("fingerprinting failed: {0}")]
    Fingerprint(String),

    #[error("operation not valid in state {0:?}")]
    InvalidState(session::UploadStatus),
}
