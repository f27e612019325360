//! Server lifecycle: bind, serve, graceful shutdown.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use chunkport_store::ChunkStore;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::routes::{self, AppState};
use crate::ServerError;

/// Default maximum request body size: 64 MiB.
///
/// Bounds a single chunk plus multipart overhead; with the default
/// ten-way partition this allows files up to ~640 MiB without tuning.
pub const DEFAULT_MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on (port 0 = OS-assigned).
    pub bind_addr: String,
    /// Directory chunks and merged artifacts are stored under.
    pub root: PathBuf,
    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:0".to_string(),
            root: PathBuf::from("upload"),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

/// The upload HTTP server.
pub struct UploadServer {
    config: ServerConfig,
    store: Arc<ChunkStore>,
    cancel: CancellationToken,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl UploadServer {
    /// Creates a server, opening (or creating) the store root.
    pub fn new(config: ServerConfig) -> Result<Arc<Self>, ServerError> {
        let store = Arc::new(ChunkStore::new(&config.root)?);
        Ok(Arc::new(Self {
            config,
            store,
            cancel: CancellationToken::new(),
            local_addr: Mutex::new(None),
        }))
    }

    /// Returns the bound address. Only available after [`run`](Self::run)
    /// binds the socket.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().await
    }

    /// Returns the listening port (0 if not yet bound).
    pub async fn port(&self) -> u16 {
        self.local_addr.lock().await.map(|a| a.port()).unwrap_or(0)
    }

    /// Signals the server to shut down gracefully.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Binds the configured address and serves until shutdown.
    pub async fn run(self: &Arc<Self>) -> Result<(), ServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        let local_addr = listener.local_addr()?;
        *self.local_addr.lock().await = Some(local_addr);
        info!(addr = %local_addr, root = %self.config.root.display(), "upload server listening");

        // The upload client may be served from any origin.
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        let app = routes::router(AppState {
            store: Arc::clone(&self.store),
        })
        .layer(DefaultBodyLimit::max(self.config.max_body_bytes))
        .layer(cors);

        let cancel = self.cancel.clone();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                cancel.cancelled().await;
                info!("upload server shutting down");
            })
            .await?;
        Ok(())
    }
}
