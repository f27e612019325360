use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tokio::sync::mpsc;
use tracing::debug;

use crate::chunker::{read_range, ByteRange};
use crate::TransferError;

/// Progress and result messages from a fingerprinting task.
#[derive(Debug, Clone, PartialEq)]
pub enum FingerprintEvent {
    /// A chunk was fully read and folded into the hash.
    Progress { percentage: f64 },
    /// All chunks processed; `hash` is the hex SHA-256 of the whole file.
    /// Terminal, implies 100%.
    Done { hash: String },
    /// A read failed. Terminal.
    Failed { error: String },
}

/// Computes the whole-file fingerprint synchronously.
///
/// Streams every range, in order, through one hasher; the result depends
/// only on the file's bytes, not on the number of ranges.
pub fn fingerprint_file(path: &Path, ranges: &[ByteRange]) -> Result<String, TransferError> {
    hash_ranges(path, ranges, |_| {})
}

/// Spawns fingerprinting on the blocking thread pool and returns a channel
/// of [`FingerprintEvent`]s.
///
/// One `Progress` event is sent per intermediate chunk, then a terminal
/// `Done` (or `Failed`). The task owns no state shared with the caller; if
/// the receiver is dropped, remaining events are discarded and the task
/// finishes on its own.
pub fn spawn_fingerprint(
    path: PathBuf,
    ranges: Vec<ByteRange>,
) -> mpsc::Receiver<FingerprintEvent> {
    let (tx, rx) = mpsc::channel(16);

    tokio::task::spawn_blocking(move || {
        let total = ranges.len();
        let result = hash_ranges(&path, &ranges, |processed| {
            if processed < total {
                let percentage = (processed as f64 / total as f64) * 100.0;
                let _ = tx.blocking_send(FingerprintEvent::Progress { percentage });
            }
        });

        match result {
            Ok(hash) => {
                debug!(path = %path.display(), %hash, "fingerprint complete");
                let _ = tx.blocking_send(FingerprintEvent::Done { hash });
            }
            Err(e) => {
                let _ = tx.blocking_send(FingerprintEvent::Failed {
                    error: e.to_string(),
                });
            }
        }
    });

    rx
}

fn hash_ranges(
    path: &Path,
    ranges: &[ByteRange],
    mut on_chunk: impl FnMut(usize),
) -> Result<String, TransferError> {
    let mut hasher = Sha256::new();
    for (i, range) in ranges.iter().enumerate() {
        let bytes = read_range(path, *range)?;
        hasher.update(&bytes);
        on_chunk(i + 1);
    }
    Ok(hex::encode(hasher.finalize()))
}
