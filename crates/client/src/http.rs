//! reqwest-backed implementation of [`Transport`].

use std::future::Future;
use std::pin::Pin;

use chunkport_protocol::constants::{
    API_MERGE, API_UPLOAD, API_VERIFY, FIELD_CHUNK, FIELD_CHUNK_HASH, FIELD_FILE_HASH,
    FIELD_FILE_NAME,
};
use chunkport_protocol::messages::{MergeRequest, VerifyRequest, VerifyResponse};
use tracing::debug;

use crate::transport::{ChunkUpload, ProgressFn, Transport};
use crate::UploadError;

/// Size of the slices a chunk body is streamed in, which is also the
/// granularity of upload progress reports.
const BODY_SLICE_SIZE: usize = 64 * 1024;

/// HTTP transport speaking the JSON/multipart wire protocol.
pub struct HttpTransport {
    base_url: String,
    client: reqwest::Client,
}

impl HttpTransport {
    /// Creates a transport for a server at `base_url`
    /// (e.g. `http://localhost:3001`).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

impl Transport for HttpTransport {
    fn verify(
        &self,
        req: VerifyRequest,
    ) -> Pin<Box<dyn Future<Output = Result<VerifyResponse, UploadError>> + Send + '_>> {
        Box::pin(async move {
            let resp = self
                .client
                .post(self.url(API_VERIFY))
                .json(&req)
                .send()
                .await?;
            check_status(&resp)?;
            Ok(resp.json::<VerifyResponse>().await?)
        })
    }

    fn upload_chunk(
        &self,
        upload: ChunkUpload,
        progress: ProgressFn,
    ) -> Pin<Box<dyn Future<Output = Result<(), UploadError>> + Send + '_>> {
        Box::pin(async move {
            let total = upload.bytes.len();
            debug!(chunk_id = %upload.chunk_id, size = total, "uploading chunk");

            // Stream the body in slices so `progress` observes bytes as they
            // are handed to the connection rather than one 100% jump.
            let slices: Vec<Vec<u8>> = upload
                .bytes
                .chunks(BODY_SLICE_SIZE)
                .map(<[u8]>::to_vec)
                .collect();
            let mut sent = 0usize;
            let stream = futures_util::stream::iter(slices.into_iter().map(move |slice| {
                sent += slice.len();
                if total > 0 {
                    progress((sent as f64 / total as f64) * 100.0);
                }
                Ok::<_, std::io::Error>(slice)
            }));

            let part = reqwest::multipart::Part::stream_with_length(
                reqwest::Body::wrap_stream(stream),
                total as u64,
            )
            .file_name(upload.chunk_id.to_string());

            // Metadata fields must precede the binary part; the server reads
            // them before streaming the chunk.
            let form = reqwest::multipart::Form::new()
                .text(FIELD_FILE_NAME, upload.file_name)
                .text(FIELD_FILE_HASH, upload.file_hash)
                .text(FIELD_CHUNK_HASH, upload.chunk_id.to_string())
                .part(FIELD_CHUNK, part);

            let resp = self
                .client
                .post(self.url(API_UPLOAD))
                .multipart(form)
                .send()
                .await?;
            check_status(&resp)?;
            Ok(())
        })
    }

    fn merge(
        &self,
        req: MergeRequest,
    ) -> Pin<Box<dyn Future<Output = Result<(), UploadError>> + Send + '_>> {
        Box::pin(async move {
            let resp = self
                .client
                .post(self.url(API_MERGE))
                .json(&req)
                .send()
                .await?;
            check_status(&resp)?;
            Ok(())
        })
    }
}

fn check_status(resp: &reqwest::Response) -> Result<(), UploadError> {
    let status = resp.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(UploadError::Transport(format!(
            "server returned {status} for {}",
            resp.url()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_stripped() {
        let t = HttpTransport::new("http://localhost:3001/");
        assert_eq!(t.url(API_VERIFY), "http://localhost:3001/api/verify");
    }
}
