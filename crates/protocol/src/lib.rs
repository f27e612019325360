//! Wire protocol types shared by the chunkport client and server.
//!
//! The transport is HTTP with JSON bodies for verify/merge and a multipart
//! form for chunk uploads; this crate defines the request/response shapes,
//! the chunk identity key, and the protocol constants both sides agree on.

pub mod chunk_id;
pub mod constants;
pub mod messages;

pub use chunk_id::{ChunkId, ChunkIdParseError};
