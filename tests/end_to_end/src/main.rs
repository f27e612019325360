fn main() {
    println!("Run `cargo test -p end-to-end` to execute the full-stack upload tests.");
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use std::time::Duration;

    use chunkport_client::{HttpTransport, Transport, UploadController, UploadEvent, UploadStatus};
    use chunkport_protocol::constants::DEFAULT_CHUNK_COUNT;
    use chunkport_server::{ServerConfig, UploadServer, DEFAULT_MAX_BODY_BYTES};
    use chunkport_transfer::{fingerprint_file, partition};

    /// Starts a server on an OS-assigned port and returns its base URL.
    async fn start_server(root: &Path) -> (Arc<UploadServer>, String) {
        let server = UploadServer::new(ServerConfig {
            bind_addr: "127.0.0.1:0".into(),
            root: root.to_path_buf(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        })
        .unwrap();

        let run = Arc::clone(&server);
        tokio::spawn(async move { run.run().await.unwrap() });

        for _ in 0..100 {
            if server.local_addr().await.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let addr = server.local_addr().await.expect("server did not bind");
        (server, format!("http://{addr}"))
    }

    /// Writes `size` deterministic bytes to `name` under `dir`.
    fn write_sample(dir: &Path, name: &str, size: usize) -> PathBuf {
        let data: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
        let path = dir.join(name);
        std::fs::write(&path, &data).unwrap();
        path
    }

    fn expected_hash(path: &Path) -> String {
        let size = std::fs::metadata(path).unwrap().len();
        fingerprint_file(path, &partition(size, DEFAULT_CHUNK_COUNT)).unwrap()
    }

    #[tokio::test]
    async fn full_round_trip_over_http() {
        let server_root = tempfile::tempdir().unwrap();
        let client_dir = tempfile::tempdir().unwrap();
        let (server, base) = start_server(server_root.path()).await;

        // 955 bytes over ten chunks: nine of 96 bytes, one of 91.
        let file = write_sample(client_dir.path(), "sample.bin", 955);
        let hash = expected_hash(&file);

        let transport = Arc::new(HttpTransport::new(&base));
        let controller = UploadController::new(transport, &file).unwrap();
        let mut events = controller.take_events().unwrap();

        controller.upload().await.unwrap();
        assert_eq!(controller.session().status(), UploadStatus::Success);

        let mut completed = false;
        while let Ok(event) = events.try_recv() {
            if matches!(event, UploadEvent::Completed) {
                completed = true;
            }
        }
        assert!(completed, "expected a Completed event");

        // The merged artifact matches the source byte for byte and the
        // staging directory for its chunks is gone.
        let artifact = server_root.path().join(format!("{hash}.bin"));
        assert_eq!(
            std::fs::read(&artifact).unwrap(),
            std::fs::read(&file).unwrap()
        );
        assert!(!server_root.path().join(&hash).exists());

        server.shutdown();
    }

    #[tokio::test]
    async fn second_upload_of_same_content_sends_no_chunks() {
        let server_root = tempfile::tempdir().unwrap();
        let client_dir = tempfile::tempdir().unwrap();
        let (server, base) = start_server(server_root.path()).await;

        let first = write_sample(client_dir.path(), "original.bin", 4096);
        let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(&base));
        UploadController::new(Arc::clone(&transport), &first)
            .unwrap()
            .upload()
            .await
            .unwrap();

        // Same bytes under a different name: the server already holds the
        // content, so the second session completes without re-uploading.
        let second = write_sample(client_dir.path(), "renamed.bin", 4096);
        let controller = UploadController::new(transport, &second).unwrap();
        let mut events = controller.take_events().unwrap();
        controller.upload().await.unwrap();
        assert_eq!(controller.session().status(), UploadStatus::Success);

        let mut chunk_progress = 0;
        while let Ok(event) = events.try_recv() {
            if matches!(event, UploadEvent::ChunkProgress { .. }) {
                chunk_progress += 1;
            }
        }
        assert_eq!(chunk_progress, 0, "dedup upload should move no chunk data");

        server.shutdown();
    }

    #[tokio::test]
    async fn extensionless_file_round_trip() {
        let server_root = tempfile::tempdir().unwrap();
        let client_dir = tempfile::tempdir().unwrap();
        let (server, base) = start_server(server_root.path()).await;

        // No extension means the artifact lands at root/<hash>, the same
        // path the chunk directory occupied during the upload.
        let file = write_sample(client_dir.path(), "README", 955);
        let hash = expected_hash(&file);

        let transport = Arc::new(HttpTransport::new(&base));
        let controller = UploadController::new(transport, &file).unwrap();
        controller.upload().await.unwrap();
        assert_eq!(controller.session().status(), UploadStatus::Success);

        let artifact = server_root.path().join(&hash);
        assert!(artifact.is_file());
        assert_eq!(
            std::fs::read(&artifact).unwrap(),
            std::fs::read(&file).unwrap()
        );

        server.shutdown();
    }

    #[tokio::test]
    async fn tiny_file_uploads_fewer_chunks_than_requested() {
        let server_root = tempfile::tempdir().unwrap();
        let client_dir = tempfile::tempdir().unwrap();
        let (server, base) = start_server(server_root.path()).await;

        // 3 bytes split ten ways yields only three 1-byte chunks.
        let file = write_sample(client_dir.path(), "tiny.bin", 3);
        let hash = expected_hash(&file);

        let transport = Arc::new(HttpTransport::new(&base));
        let controller = UploadController::new(transport, &file).unwrap();
        controller.upload().await.unwrap();
        assert_eq!(controller.session().status(), UploadStatus::Success);
        assert_eq!(controller.session().chunks().len(), 3);

        let artifact = server_root.path().join(format!("{hash}.bin"));
        assert_eq!(std::fs::read(&artifact).unwrap(), vec![0u8, 1, 2]);

        server.shutdown();
    }
}
