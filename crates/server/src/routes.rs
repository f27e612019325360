use std::sync::Arc;

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use chunkport_protocol::constants::{
    API_MERGE, API_UPLOAD, API_VERIFY, FIELD_CHUNK, FIELD_CHUNK_HASH, FIELD_FILE_HASH,
    FIELD_FILE_NAME, MERGE_ACK, UPLOAD_ACK,
};
use chunkport_protocol::messages::{MergeRequest, VerifyRequest, VerifyResponse};
use chunkport_protocol::ChunkId;
use chunkport_store::{ChunkStore, StoreError};
use tracing::{error, warn};

#[derive(Clone)]
pub(crate) struct AppState {
    pub store: Arc<ChunkStore>,
}

pub(crate) fn router(state: AppState) -> Router {
    Router::new()
        .route(API_VERIFY, post(verify))
        .route(API_UPLOAD, post(upload))
        .route(API_MERGE, post(merge))
        .with_state(state)
}

/// Error shape for the handlers; maps store errors onto HTTP statuses.
struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, self.1).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::InvalidName(_)
            | StoreError::NoChunks(_)
            | StoreError::UnexpectedChunkFile(_) => {
                warn!(error = %e, "rejecting request");
                ApiError(StatusCode::BAD_REQUEST, e.to_string())
            }
            StoreError::Io(_) => {
                error!(error = %e, "store I/O failure");
                ApiError(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "storage failure".to_string(),
                )
            }
        }
    }
}

fn bad_request(msg: impl Into<String>) -> ApiError {
    ApiError(StatusCode::BAD_REQUEST, msg.into())
}

/// Runs a blocking store operation off the async runtime.
async fn run_store<T, F>(store: &Arc<ChunkStore>, op: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&ChunkStore) -> Result<T, StoreError> + Send + 'static,
{
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || op(&store))
        .await
        .map_err(|e| {
            error!(error = %e, "store task panicked");
            ApiError(
                StatusCode::INTERNAL_SERVER_ERROR,
                "storage failure".to_string(),
            )
        })?
        .map_err(ApiError::from)
}

async fn verify(
    State(state): State<AppState>,
    Json(req): Json<VerifyRequest>,
) -> Result<Json<VerifyResponse>, ApiError> {
    let resp = run_store(&state.store, move |store| {
        store.verify(&req.file_name, &req.file_hash)
    })
    .await?;
    Ok(Json(resp))
}

async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<&'static str, ApiError> {
    let mut file_name: Option<String> = None;
    let mut file_hash: Option<String> = None;
    let mut chunk_hash: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("malformed multipart body: {e}")))?
    {
        match field.name() {
            Some(FIELD_FILE_NAME) => {
                file_name = Some(field.text().await.map_err(field_error)?);
            }
            Some(FIELD_FILE_HASH) => {
                file_hash = Some(field.text().await.map_err(field_error)?);
            }
            Some(FIELD_CHUNK_HASH) => {
                chunk_hash = Some(field.text().await.map_err(field_error)?);
            }
            Some(FIELD_CHUNK) => {
                // The metadata fields must have arrived before the binary.
                let file_name = file_name
                    .take()
                    .ok_or_else(|| bad_request("chunk field before fileName"))?;
                let file_hash = file_hash
                    .take()
                    .ok_or_else(|| bad_request("chunk field before fileHash"))?;
                let chunk_id: ChunkId = chunk_hash
                    .take()
                    .ok_or_else(|| bad_request("chunk field before chunkHash"))?
                    .parse()
                    .map_err(|e| bad_request(format!("{e}")))?;

                let bytes = field.bytes().await.map_err(field_error)?;
                run_store(&state.store, move |store| {
                    store.upload_chunk(&file_name, &file_hash, &chunk_id, &bytes)
                })
                .await?;
                return Ok(UPLOAD_ACK);
            }
            _ => {
                // Unknown fields are skipped, matching a tolerant parser.
            }
        }
    }

    Err(bad_request("missing chunk field"))
}

async fn merge(
    State(state): State<AppState>,
    Json(req): Json<MergeRequest>,
) -> Result<&'static str, ApiError> {
    run_store(&state.store, move |store| {
        store.merge(&req.file_name, &req.file_hash)
    })
    .await?;
    Ok(MERGE_ACK)
}

fn field_error(e: axum::extract::multipart::MultipartError) -> ApiError {
    bad_request(format!("failed to read multipart field: {e}"))
}
