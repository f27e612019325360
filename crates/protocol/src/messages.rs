//! Request and response bodies for the upload endpoints.

use serde::{Deserialize, Serialize};

/// Asks the server which chunks of a file it already holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub file_name: String,
    pub file_hash: String,
}

/// Answer to [`VerifyRequest`].
///
/// `should_upload == false` means the merged artifact already exists and no
/// bytes need to be transferred. Otherwise `uploaded_chunks` lists the chunk
/// identities already stored, which the client skips when uploading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub should_upload: bool,
    pub uploaded_chunks: Vec<String>,
}

/// Asks the server to reassemble all stored chunks into the final artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeRequest {
    pub file_name: String,
    pub file_hash: String,
}
