use std::path::PathBuf;
use std::sync::Arc;

use chunkport_server::{ServerConfig, ServerError, UploadServer, DEFAULT_MAX_BODY_BYTES};
use clap::Parser;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "chunkport-server", about = "Resumable chunked-upload server")]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = "0.0.0.0:3001")]
    bind: String,

    /// Directory chunks and merged files are stored under.
    #[arg(long, default_value = "upload")]
    root: PathBuf,

    /// Maximum request body size in bytes.
    #[arg(long, default_value_t = DEFAULT_MAX_BODY_BYTES)]
    max_body_bytes: usize,
}

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let server = UploadServer::new(ServerConfig {
        bind_addr: args.bind,
        root: args.root,
        max_body_bytes: args.max_body_bytes,
    })?;

    let ctrl_c = Arc::clone(&server);
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for ctrl-c");
            return;
        }
        ctrl_c.shutdown();
    });

    server.run().await
}
