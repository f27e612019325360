use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chunkport_protocol::messages::VerifyResponse;
use chunkport_protocol::ChunkId;
use tracing::{debug, info};

use crate::StoreError;

/// Directory under the store root holding in-flight temporary writes.
///
/// Kept on the same filesystem as the final locations so the finalizing
/// rename is atomic.
const TMP_DIR: &str = ".tmp";

/// Content-addressed chunk store rooted at a single directory.
pub struct ChunkStore {
    root: PathBuf,
}

impl ChunkStore {
    /// Opens (creating if needed) a store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(root.join(TMP_DIR))?;
        Ok(Self { root })
    }

    /// The store's root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Reports whether a file still needs uploading and which chunks are
    /// already stored.
    ///
    /// If the merged artifact exists, `should_upload` is `false` and no
    /// bytes need to be transferred at all. Otherwise `uploaded_chunks`
    /// lists the chunk filenames currently present (empty if the chunk
    /// directory does not exist yet).
    pub fn verify(&self, file_name: &str, file_hash: &str) -> Result<VerifyResponse, StoreError> {
        validate_component(file_hash)?;

        // `is_file`, not `exists`: for an extensionless file name the
        // artifact path coincides with the chunk directory's path.
        if self.artifact_path(file_name, file_hash).is_file() {
            return Ok(VerifyResponse {
                should_upload: false,
                uploaded_chunks: Vec::new(),
            });
        }

        let chunk_dir = self.chunk_dir(file_hash);
        let mut uploaded_chunks = Vec::new();
        if chunk_dir.is_dir() {
            for entry in fs::read_dir(&chunk_dir)? {
                let entry = entry?;
                uploaded_chunks.push(entry.file_name().to_string_lossy().into_owned());
            }
        }

        Ok(VerifyResponse {
            should_upload: true,
            uploaded_chunks,
        })
    }

    /// Stores one chunk's bytes under its identity.
    ///
    /// Idempotent short-circuits: if the merged artifact already exists the
    /// bytes are dropped; if the chunk file already exists it is left alone
    /// (same identity means same bytes).
    ///
    /// The write is two-phase: a uniquely-suffixed temp file in `.tmp`, then
    /// an atomic rename into the chunk directory. An aborted transfer leaves
    /// at most an orphaned temp file, never a partial chunk under its final
    /// name.
    pub fn upload_chunk(
        &self,
        file_name: &str,
        file_hash: &str,
        chunk_id: &ChunkId,
        bytes: &[u8],
    ) -> Result<(), StoreError> {
        validate_component(file_hash)?;
        validate_component(chunk_id.file_hash())?;

        if self.artifact_path(file_name, file_hash).is_file() {
            debug!(%file_hash, %chunk_id, "artifact already merged, dropping chunk");
            return Ok(());
        }

        let chunk_dir = self.chunk_dir(file_hash);
        fs::create_dir_all(&chunk_dir)?;

        let final_path = chunk_dir.join(chunk_id.to_string());
        if final_path.exists() {
            debug!(%chunk_id, "chunk already stored");
            return Ok(());
        }

        // Unique suffix so concurrent writers of the same identity never
        // share a temp file; whichever rename lands last wins, and both
        // carry identical bytes.
        let tmp_path = self
            .root
            .join(TMP_DIR)
            .join(format!("{chunk_id}.{}", uuid::Uuid::new_v4()));

        let mut tmp = fs::File::create(&tmp_path)?;
        if let Err(e) = tmp.write_all(bytes).and_then(|()| tmp.sync_all()) {
            drop(tmp);
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }
        drop(tmp);
        fs::rename(&tmp_path, &final_path)?;

        debug!(%chunk_id, size = bytes.len(), "chunk stored");
        Ok(())
    }

    /// Reassembles all stored chunks into the final artifact.
    ///
    /// Chunks are appended in ascending numeric index order, parsed from the
    /// identity suffix — never in directory-listing order, which sorts
    /// `"...-10"` before `"...-2"`. The caller guarantees completeness via
    /// verify/upload; no byte counts are re-validated here.
    ///
    /// The artifact is assembled in `.tmp`, the chunk files and their
    /// directory are removed, and only then is the artifact renamed into
    /// place: for an extensionless file name the artifact path is the chunk
    /// directory's own path, so the directory must be gone before the
    /// rename. Returns the artifact path.
    pub fn merge(&self, file_name: &str, file_hash: &str) -> Result<PathBuf, StoreError> {
        validate_component(file_hash)?;

        let chunk_dir = self.chunk_dir(file_hash);
        if !chunk_dir.is_dir() {
            return Err(StoreError::NoChunks(file_hash.to_string()));
        }

        let mut chunks: Vec<ChunkId> = Vec::new();
        for entry in fs::read_dir(&chunk_dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let id = name
                .parse::<ChunkId>()
                .map_err(|_| StoreError::UnexpectedChunkFile(name))?;
            chunks.push(id);
        }
        chunks.sort_by_key(ChunkId::index);

        let artifact = self.artifact_path(file_name, file_hash);
        let tmp_path = self
            .root
            .join(TMP_DIR)
            .join(format!("{file_hash}.merge.{}", uuid::Uuid::new_v4()));

        let result = (|| -> Result<(), StoreError> {
            let mut out = fs::File::create(&tmp_path)?;
            for id in &chunks {
                let mut chunk = fs::File::open(chunk_dir.join(id.to_string()))?;
                std::io::copy(&mut chunk, &mut out)?;
            }
            out.sync_all()?;
            Ok(())
        })();
        if let Err(e) = result {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }

        for id in &chunks {
            fs::remove_file(chunk_dir.join(id.to_string()))?;
        }
        fs::remove_dir(&chunk_dir)?;
        fs::rename(&tmp_path, &artifact)?;

        info!(%file_hash, chunks = chunks.len(), artifact = %artifact.display(), "merge complete");
        Ok(artifact)
    }

    /// Path of the merged artifact: `root/<file_hash><original-extension>`.
    ///
    /// Content-addressed naming is what makes dedup across different file
    /// names work: a second upload of the same bytes hits the same path.
    fn artifact_path(&self, file_name: &str, file_hash: &str) -> PathBuf {
        let name = match Path::new(file_name).extension() {
            Some(ext) => format!("{file_hash}.{}", ext.to_string_lossy()),
            None => file_hash.to_string(),
        };
        self.root.join(name)
    }

    fn chunk_dir(&self, file_hash: &str) -> PathBuf {
        self.root.join(file_hash)
    }
}

/// Rejects client-supplied names that are not a single plain path component.
fn validate_component(name: &str) -> Result<(), StoreError> {
    let ok = !name.is_empty()
        && name != "."
        && name != ".."
        && name != TMP_DIR
        && !name.contains(['/', '\\']);
    if ok {
        Ok(())
    } else {
        Err(StoreError::InvalidName(name.to_string()))
    }
}
