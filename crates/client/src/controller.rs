//! Upload session controller.
//!
//! Drives one file through fingerprinting, server verification, concurrent
//! chunk transfers, and the final merge request. Pause cancels every
//! in-flight transfer; resume re-verifies with the server and re-sends only
//! the chunks still missing.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chunkport_protocol::constants::DEFAULT_CHUNK_COUNT;
use chunkport_protocol::messages::{MergeRequest, VerifyRequest};
use chunkport_protocol::ChunkId;
use chunkport_transfer::{partition, read_range, spawn_fingerprint, FingerprintEvent};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::session::{ChunkState, UploadSession, UploadStatus};
use crate::transport::{ChunkUpload, ProgressFn, Transport};
use crate::UploadError;

/// Events for the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadEvent {
    StatusChanged { status: UploadStatus },
    /// Fingerprinting progress, 0-100.
    HashProgress { percentage: f64 },
    /// One chunk's transfer progress plus the session-wide mean.
    ChunkProgress {
        index: u32,
        percentage: f64,
        aggregate: f64,
    },
    /// The merged artifact exists on the server. Terminal.
    Completed,
    Error { message: String },
}

enum ChunkOutcome {
    Done,
    Cancelled,
    Failed(UploadError),
}

/// Orchestrates the upload of a single file.
///
/// Construct one controller per selected file. Methods take `&self`; share
/// the controller in an `Arc` to pause from another task.
pub struct UploadController {
    transport: Arc<dyn Transport>,
    session: Arc<UploadSession>,
    chunk_count: usize,
    events_tx: mpsc::Sender<UploadEvent>,
    events_rx: Mutex<Option<mpsc::Receiver<UploadEvent>>>,
    /// In-flight transfers by chunk index. Entries are added when a request
    /// starts and removed when it settles; `pause` swaps the whole map out
    /// and cancels the tokens, which is safe against completions removing
    /// entries concurrently.
    inflight: Arc<Mutex<HashMap<u32, CancellationToken>>>,
}

impl UploadController {
    /// Creates a controller for the file at `file_path`, using the default
    /// chunk count.
    pub fn new(transport: Arc<dyn Transport>, file_path: impl Into<PathBuf>) -> Result<Self, UploadError> {
        let file_path = file_path.into();
        let meta = std::fs::metadata(&file_path)?;
        if !meta.is_file() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("not a regular file: {}", file_path.display()),
            )
            .into());
        }
        let file_name = file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no file name")
            })?;

        let (events_tx, events_rx) = mpsc::channel(256);
        Ok(Self {
            transport,
            session: Arc::new(UploadSession::new(file_path, file_name, meta.len())),
            chunk_count: DEFAULT_CHUNK_COUNT,
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            inflight: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Overrides the number of chunks the file is partitioned into.
    pub fn with_chunk_count(mut self, chunk_count: usize) -> Self {
        self.chunk_count = chunk_count.max(1);
        self
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&self) -> Option<mpsc::Receiver<UploadEvent>> {
        self.events_rx.lock().unwrap().take()
    }

    /// The session this controller drives.
    pub fn session(&self) -> Arc<UploadSession> {
        Arc::clone(&self.session)
    }

    /// Runs the full pipeline: partition, fingerprint, verify, transfer
    /// missing chunks, merge.
    ///
    /// Only valid from `Initial`. Returns once the session reached
    /// `Success`, was paused, or a transport/IO error failed the attempt
    /// (the session is then `Paused` and can be resumed).
    pub async fn upload(&self) -> Result<(), UploadError> {
        if !self.session.transition(UploadStatus::Initial, UploadStatus::Hashing) {
            return Err(UploadError::InvalidState(self.session.status()));
        }
        self.emit(UploadEvent::StatusChanged {
            status: UploadStatus::Hashing,
        })
        .await;

        let ranges = partition(self.session.total_size(), self.chunk_count);
        self.session.set_chunks(&ranges);

        // Fingerprinting runs off this task; only messages cross back.
        let mut hash_rx = spawn_fingerprint(self.session.file_path().to_path_buf(), ranges);
        let mut file_hash = None;
        while let Some(event) = hash_rx.recv().await {
            match event {
                FingerprintEvent::Progress { percentage } => {
                    self.emit(UploadEvent::HashProgress { percentage }).await;
                }
                FingerprintEvent::Done { hash } => {
                    self.emit(UploadEvent::HashProgress { percentage: 100.0 }).await;
                    file_hash = Some(hash);
                }
                FingerprintEvent::Failed { error } => {
                    self.session.set_status(UploadStatus::Initial);
                    self.emit(UploadEvent::Error {
                        message: error.clone(),
                    })
                    .await;
                    return Err(UploadError::Fingerprint(error));
                }
            }
        }
        let file_hash = file_hash
            .ok_or_else(|| UploadError::Fingerprint("hash task ended without a result".into()))?;
        info!(file = %self.session.file_name(), hash = %file_hash, "fingerprint ready");
        self.session.set_file_hash(file_hash);

        self.run_pending().await
    }

    /// Cancels every in-flight chunk transfer and parks the session in
    /// `Paused`. Returns `false` if the session was not `Pending`.
    ///
    /// Aborted transfers leave nothing visible server-side (two-phase chunk
    /// writes), so a later resume re-sends them from scratch.
    pub fn pause(&self) -> bool {
        if !self.session.transition(UploadStatus::Pending, UploadStatus::Paused) {
            return false;
        }
        let tokens = std::mem::take(&mut *self.inflight.lock().unwrap());
        let cancelled = tokens.len();
        for token in tokens.into_values() {
            token.cancel();
        }
        let _ = self.events_tx.try_send(UploadEvent::StatusChanged {
            status: UploadStatus::Paused,
        });
        info!(cancelled, "upload paused");
        true
    }

    /// Resumes a paused session: re-verifies with the server and re-sends
    /// only the chunks still missing.
    pub async fn resume(&self) -> Result<(), UploadError> {
        if self.session.status() != UploadStatus::Paused {
            return Err(UploadError::InvalidState(self.session.status()));
        }
        self.run_pending().await
    }

    /// One `Pending` round: verify, transfer missing chunks concurrently,
    /// merge when everything is stored.
    async fn run_pending(&self) -> Result<(), UploadError> {
        let file_hash = self
            .session
            .file_hash()
            .ok_or(UploadError::InvalidState(self.session.status()))?;
        let file_name = self.session.file_name().to_string();

        let verify = self
            .transport
            .verify(VerifyRequest {
                file_name: file_name.clone(),
                file_hash: file_hash.clone(),
            })
            .await;
        let verify = match verify {
            Ok(v) => v,
            Err(e) => return self.fail_attempt(e).await,
        };

        if !verify.should_upload {
            // The server already holds the merged artifact; nothing to send.
            info!(hash = %file_hash, "content already stored, skipping transfer");
            for chunk in self.session.chunks() {
                self.session.set_chunk_progress(chunk.index, 100.0);
            }
            return self.complete().await;
        }

        self.session.set_status(UploadStatus::Pending);
        self.emit(UploadEvent::StatusChanged {
            status: UploadStatus::Pending,
        })
        .await;

        let stored: HashSet<u32> = verify
            .uploaded_chunks
            .iter()
            .filter_map(|s| s.parse::<ChunkId>().ok())
            .map(|id| id.index())
            .collect();

        let mut missing = Vec::new();
        for chunk in self.session.chunks() {
            if stored.contains(&chunk.index) {
                self.session.set_chunk_progress(chunk.index, 100.0);
            } else {
                missing.push(chunk);
            }
        }
        debug!(
            stored = stored.len(),
            missing = missing.len(),
            "verify complete"
        );

        // Fire every missing chunk at once; each transfer tracks its own
        // progress and carries its own cancellation token. All tokens are
        // registered in one critical section after re-checking the status:
        // `pause()` swaps the map under this same lock, so a concurrent
        // pause either stops the spawn here or cancels every token.
        let mut transfers = tokio::task::JoinSet::new();
        {
            let mut registry = self.inflight.lock().unwrap();
            if self.session.status() != UploadStatus::Pending {
                return Ok(());
            }
            for chunk in missing {
                let token = CancellationToken::new();
                registry.insert(chunk.index, token.clone());

                let transport = Arc::clone(&self.transport);
                let session = Arc::clone(&self.session);
                let inflight = Arc::clone(&self.inflight);
                let events_tx = self.events_tx.clone();
                let file_name = file_name.clone();
                let file_hash = file_hash.clone();

                transfers.spawn(async move {
                    let index = chunk.index;
                    let outcome = upload_one(
                        transport, session, events_tx, chunk, file_name, file_hash, token,
                    )
                    .await;
                    inflight.lock().unwrap().remove(&index);
                    outcome
                });
            }
        }

        let mut paused = false;
        let mut first_err = None;
        while let Some(joined) = transfers.join_next().await {
            match joined {
                Ok(ChunkOutcome::Done) => {}
                Ok(ChunkOutcome::Cancelled) => paused = true,
                Ok(ChunkOutcome::Failed(e)) => {
                    warn!(error = %e, "chunk transfer failed");
                    if first_err.is_none() {
                        first_err = Some(e);
                    }
                }
                Err(e) => {
                    if first_err.is_none() {
                        first_err = Some(UploadError::Transport(format!("task join error: {e}")));
                    }
                }
            }
        }

        if let Some(e) = first_err {
            return self.fail_attempt(e).await;
        }
        if paused {
            // pause() already moved the session to Paused.
            return Ok(());
        }

        if let Err(e) = self
            .transport
            .merge(MergeRequest {
                file_name,
                file_hash,
            })
            .await
        {
            return self.fail_attempt(e).await;
        }
        self.complete().await
    }

    async fn complete(&self) -> Result<(), UploadError> {
        self.session.set_status(UploadStatus::Success);
        self.emit(UploadEvent::StatusChanged {
            status: UploadStatus::Success,
        })
        .await;
        self.emit(UploadEvent::Completed).await;
        Ok(())
    }

    /// Fails the current attempt: the session parks in `Paused` so the
    /// caller can `resume()` after fixing whatever broke. No automatic
    /// retries.
    async fn fail_attempt(&self, err: UploadError) -> Result<(), UploadError> {
        self.session.set_status(UploadStatus::Paused);
        self.emit(UploadEvent::Error {
            message: err.to_string(),
        })
        .await;
        Err(err)
    }

    async fn emit(&self, event: UploadEvent) {
        let _ = self.events_tx.send(event).await;
    }
}

async fn upload_one(
    transport: Arc<dyn Transport>,
    session: Arc<UploadSession>,
    events_tx: mpsc::Sender<UploadEvent>,
    chunk: ChunkState,
    file_name: String,
    file_hash: String,
    token: CancellationToken,
) -> ChunkOutcome {
    let index = chunk.index;

    let path = session.file_path().to_path_buf();
    let range = chunk.range;
    let bytes = match tokio::task::spawn_blocking(move || read_range(&path, range)).await {
        Ok(Ok(bytes)) => bytes,
        Ok(Err(e)) => return ChunkOutcome::Failed(e.into()),
        Err(e) => {
            return ChunkOutcome::Failed(UploadError::Transport(format!("task join error: {e}")))
        }
    };

    let progress: ProgressFn = {
        let session = Arc::clone(&session);
        let events_tx = events_tx.clone();
        Box::new(move |percentage| {
            session.set_chunk_progress(index, percentage);
            // Progress is lossy by design; drop events when the channel is full.
            let _ = events_tx.try_send(UploadEvent::ChunkProgress {
                index,
                percentage,
                aggregate: session.aggregate_progress(),
            });
        })
    };

    let upload = ChunkUpload {
        file_name,
        file_hash: file_hash.clone(),
        chunk_id: ChunkId::new(file_hash, index),
        bytes,
    };

    tokio::select! {
        _ = token.cancelled() => {
            debug!(index, "chunk transfer cancelled");
            ChunkOutcome::Cancelled
        }
        result = transport.upload_chunk(upload, progress) => match result {
            Ok(()) => {
                session.set_chunk_progress(index, 100.0);
                let _ = events_tx.try_send(UploadEvent::ChunkProgress {
                    index,
                    percentage: 100.0,
                    aggregate: session.aggregate_progress(),
                });
                ChunkOutcome::Done
            }
            Err(e) => ChunkOutcome::Failed(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chunkport_protocol::messages::VerifyResponse;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// In-memory transport that mimics the server store's bookkeeping.
    struct MockTransport {
        stored: Mutex<HashSet<String>>,
        merged: AtomicBool,
        merges: AtomicUsize,
        uploads: AtomicUsize,
        hang_uploads: AtomicBool,
        fail_uploads: AtomicBool,
    }

    impl MockTransport {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                stored: Mutex::new(HashSet::new()),
                merged: AtomicBool::new(false),
                merges: AtomicUsize::new(0),
                uploads: AtomicUsize::new(0),
                hang_uploads: AtomicBool::new(false),
                fail_uploads: AtomicBool::new(false),
            })
        }

        fn stored_ids(&self) -> Vec<String> {
            let mut ids: Vec<_> = self.stored.lock().unwrap().iter().cloned().collect();
            ids.sort();
            ids
        }

        fn preload(&self, ids: &[&str]) {
            let mut stored = self.stored.lock().unwrap();
            for id in ids {
                stored.insert((*id).to_string());
            }
        }
    }

    impl Transport for MockTransport {
        fn verify(
            &self,
            _req: VerifyRequest,
        ) -> Pin<Box<dyn Future<Output = Result<VerifyResponse, UploadError>> + Send + '_>>
        {
            Box::pin(async move {
                Ok(VerifyResponse {
                    should_upload: !self.merged.load(Ordering::SeqCst),
                    uploaded_chunks: self.stored_ids(),
                })
            })
        }

        fn upload_chunk(
            &self,
            upload: ChunkUpload,
            progress: ProgressFn,
        ) -> Pin<Box<dyn Future<Output = Result<(), UploadError>> + Send + '_>> {
            Box::pin(async move {
                if self.hang_uploads.load(Ordering::SeqCst) {
                    // Simulates a transfer that never completes; the
                    // controller aborts it on pause.
                    std::future::pending::<()>().await;
                }
                if self.fail_uploads.load(Ordering::SeqCst) {
                    return Err(UploadError::Transport("connection reset".into()));
                }
                progress(100.0);
                self.uploads.fetch_add(1, Ordering::SeqCst);
                self.stored
                    .lock()
                    .unwrap()
                    .insert(upload.chunk_id.to_string());
                Ok(())
            })
        }

        fn merge(
            &self,
            _req: MergeRequest,
        ) -> Pin<Box<dyn Future<Output = Result<(), UploadError>> + Send + '_>> {
            Box::pin(async move {
                self.merged.store(true, Ordering::SeqCst);
                self.merges.fetch_add(1, Ordering::SeqCst);
                self.stored.lock().unwrap().clear();
                Ok(())
            })
        }
    }

    fn test_file(dir: &std::path::Path, len: usize) -> PathBuf {
        let path = dir.join("data.bin");
        let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, data).unwrap();
        path
    }

    fn drain(rx: &mut mpsc::Receiver<UploadEvent>) -> Vec<UploadEvent> {
        let mut events = Vec::new();
        while let Ok(e) = rx.try_recv() {
            events.push(e);
        }
        events
    }

    #[tokio::test]
    async fn full_upload_reaches_success() {
        let dir = tempfile::tempdir().unwrap();
        let path = test_file(dir.path(), 955);

        let mock = MockTransport::new();
        let controller = UploadController::new(mock.clone(), &path).unwrap();
        let mut rx = controller.take_events().unwrap();

        controller.upload().await.unwrap();

        assert_eq!(controller.session().status(), UploadStatus::Success);
        assert_eq!(mock.uploads.load(Ordering::SeqCst), 10);
        assert_eq!(mock.merges.load(Ordering::SeqCst), 1);
        assert_eq!(controller.session().aggregate_progress(), 100.0);

        let events = drain(&mut rx);
        assert!(events.contains(&UploadEvent::Completed));
        assert!(events
            .iter()
            .any(|e| matches!(e, UploadEvent::HashProgress { .. })));
    }

    #[tokio::test]
    async fn duplicate_content_short_circuits() {
        let dir = tempfile::tempdir().unwrap();
        let path = test_file(dir.path(), 500);

        let mock = MockTransport::new();
        mock.merged.store(true, Ordering::SeqCst);

        let controller = UploadController::new(mock.clone(), &path).unwrap();
        controller.upload().await.unwrap();

        assert_eq!(controller.session().status(), UploadStatus::Success);
        assert_eq!(mock.uploads.load(Ordering::SeqCst), 0, "no bytes transferred");
        assert_eq!(mock.merges.load(Ordering::SeqCst), 0);
        assert_eq!(controller.session().aggregate_progress(), 100.0);
    }

    #[tokio::test]
    async fn already_stored_chunks_are_not_resent() {
        let dir = tempfile::tempdir().unwrap();
        let path = test_file(dir.path(), 1000);

        let mock = MockTransport::new();
        let controller = UploadController::new(mock.clone(), &path).unwrap();

        // Figure out the file hash the controller will compute, then preload
        // a subset of identities as already stored.
        let ranges = partition(1000, 10);
        let hash = chunkport_transfer::fingerprint_file(&path, &ranges).unwrap();
        let preloaded: Vec<String> =
            [0u32, 3, 7].iter().map(|i| format!("{hash}-{i}")).collect();
        mock.preload(&preloaded.iter().map(String::as_str).collect::<Vec<_>>());

        controller.upload().await.unwrap();

        assert_eq!(controller.session().status(), UploadStatus::Success);
        assert_eq!(mock.uploads.load(Ordering::SeqCst), 7, "only missing chunks sent");
    }

    #[tokio::test]
    async fn pause_cancels_inflight_and_resume_finishes() {
        let dir = tempfile::tempdir().unwrap();
        let path = test_file(dir.path(), 955);

        let mock = MockTransport::new();
        mock.hang_uploads.store(true, Ordering::SeqCst);

        let controller = Arc::new(UploadController::new(mock.clone(), &path).unwrap());

        let task = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { controller.upload().await })
        };

        // Wait until the transfers are in flight, then pause.
        for _ in 0..100 {
            if !controller.inflight.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(controller.pause());
        task.await.unwrap().unwrap();

        assert_eq!(controller.session().status(), UploadStatus::Paused);
        assert_eq!(mock.uploads.load(Ordering::SeqCst), 0, "nothing completed");
        assert!(controller.inflight.lock().unwrap().is_empty());

        // Resume with a working transport: everything is re-sent and merged.
        mock.hang_uploads.store(false, Ordering::SeqCst);
        controller.resume().await.unwrap();

        assert_eq!(controller.session().status(), UploadStatus::Success);
        assert_eq!(mock.uploads.load(Ordering::SeqCst), 10);
        assert_eq!(mock.merges.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn pause_at_pending_entry_leaves_no_stray_transfers() {
        let dir = tempfile::tempdir().unwrap();
        let path = test_file(dir.path(), 955);

        let mock = MockTransport::new();
        mock.hang_uploads.store(true, Ordering::SeqCst);

        let controller = Arc::new(UploadController::new(mock.clone(), &path).unwrap());
        let task = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { controller.upload().await })
        };

        // Pause at the first observable moment after the session enters
        // Pending, before the transfer spawn loop has necessarily run.
        while controller.session().status() != UploadStatus::Pending {
            tokio::task::yield_now().await;
        }
        controller.pause();

        // Every transfer is either never spawned or carries a cancelled
        // token; upload() must settle rather than join a hung request.
        let joined = tokio::time::timeout(std::time::Duration::from_secs(5), task)
            .await
            .expect("upload() did not settle after pause");
        joined.unwrap().unwrap();

        assert_eq!(controller.session().status(), UploadStatus::Paused);
        assert_eq!(mock.uploads.load(Ordering::SeqCst), 0);
        assert!(controller.inflight.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn resume_skips_chunks_stored_before_pause() {
        let dir = tempfile::tempdir().unwrap();
        let path = test_file(dir.path(), 955);

        let mock = MockTransport::new();
        let controller = Arc::new(UploadController::new(mock.clone(), &path).unwrap());

        // Let a subset land, then hang the rest by pre-storing: simulate a
        // pause that happened after 4 chunks were acked.
        let ranges = partition(955, 10);
        let hash = chunkport_transfer::fingerprint_file(&path, &ranges).unwrap();
        let landed: Vec<String> = [1u32, 2, 5, 9].iter().map(|i| format!("{hash}-{i}")).collect();
        mock.preload(&landed.iter().map(String::as_str).collect::<Vec<_>>());

        controller.upload().await.unwrap();

        assert_eq!(mock.uploads.load(Ordering::SeqCst), 6, "re-sent only the missing six");
        assert_eq!(controller.session().status(), UploadStatus::Success);
    }

    #[tokio::test]
    async fn transport_failure_parks_session_paused() {
        let dir = tempfile::tempdir().unwrap();
        let path = test_file(dir.path(), 200);

        let mock = MockTransport::new();
        mock.fail_uploads.store(true, Ordering::SeqCst);

        let controller = UploadController::new(mock.clone(), &path).unwrap();
        let mut rx = controller.take_events().unwrap();

        let result = controller.upload().await;
        assert!(matches!(result, Err(UploadError::Transport(_))));
        assert_eq!(controller.session().status(), UploadStatus::Paused);
        assert_eq!(mock.merges.load(Ordering::SeqCst), 0, "merge never issued");

        let events = drain(&mut rx);
        assert!(events.iter().any(|e| matches!(e, UploadEvent::Error { .. })));

        // The failure is recoverable: resume finishes the job.
        mock.fail_uploads.store(false, Ordering::SeqCst);
        controller.resume().await.unwrap();
        assert_eq!(controller.session().status(), UploadStatus::Success);
    }

    #[tokio::test]
    async fn upload_twice_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = test_file(dir.path(), 100);

        let mock = MockTransport::new();
        let controller = UploadController::new(mock, &path).unwrap();
        controller.upload().await.unwrap();

        let again = controller.upload().await;
        assert!(matches!(again, Err(UploadError::InvalidState(UploadStatus::Success))));
    }

    #[tokio::test]
    async fn pause_outside_pending_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let path = test_file(dir.path(), 100);

        let controller = UploadController::new(MockTransport::new(), &path).unwrap();
        assert!(!controller.pause());
        assert_eq!(controller.session().status(), UploadStatus::Initial);
    }

    #[tokio::test]
    async fn missing_file_is_constructor_error() {
        let result = UploadController::new(MockTransport::new(), "/nonexistent/f.bin");
        assert!(matches!(result, Err(UploadError::Io(_))));
    }
}
