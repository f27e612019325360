//! Protocol-wide constants.

/// Number of chunks a file is partitioned into by default.
pub const DEFAULT_CHUNK_COUNT: usize = 10;

/// Route for the verify operation (JSON in, JSON out).
pub const API_VERIFY: &str = "/api/verify";

/// Route for chunk upload (multipart form in, text ack out).
pub const API_UPLOAD: &str = "/api/upload";

/// Route for the merge operation (JSON in, text ack out).
pub const API_MERGE: &str = "/api/merge";

/// Multipart field carrying the original file name.
pub const FIELD_FILE_NAME: &str = "fileName";

/// Multipart field carrying the whole-file content hash.
pub const FIELD_FILE_HASH: &str = "fileHash";

/// Multipart field carrying the chunk identity (`{fileHash}-{index}`).
pub const FIELD_CHUNK_HASH: &str = "chunkHash";

/// Multipart field carrying the chunk bytes. Must be the last field in the
/// form: the server reads the metadata fields before streaming the binary.
pub const FIELD_CHUNK: &str = "chunk";

/// Plain-text acknowledgment returned by a successful chunk upload.
pub const UPLOAD_ACK: &str = "file chunk uploaded";

/// Plain-text acknowledgment returned by a successful merge.
pub const MERGE_ACK: &str = "file chunks merged";
