//! Blob and pointer-file I/O for checkpoints
//!
//! Checkpoint blobs are framed binary files: magic, format version, payload
//! length, then the serialized record. Blob writes go through a temporary
//! file and an atomic rename. The pointer file is a plain whole-file
//! overwrite holding the absolute path of the last completed save.

use bytes::Bytes;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, warn};
use training_core::{Error, Result};
use uuid::Uuid;

/// Magic bytes opening every checkpoint blob
pub const CHECKPOINT_MAGIC: [u8; 4] = *b"CKPT";

/// Blob format version
pub const CHECKPOINT_VERSION: u32 = 1;

/// File extension for checkpoint blobs
pub const CHECKPOINT_EXT: &str = "ckpt";

/// Name of the single-slot pointer file inside the output directory
pub const LAST_CHECKPOINT_FILE: &str = "last_checkpoint";

/// Write a checkpoint payload to `path` as a framed blob.
///
/// Returns the total size in bytes. The write lands in a uniquely named
/// temporary file first and is renamed into place once synced.
pub async fn write_blob(path: &Path, payload: Bytes) -> Result<u64> {
    let start = std::time::Instant::now();

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let temp_path = temp_path(path);
    let mut file = File::create(&temp_path).await?;

    file.write_all(&CHECKPOINT_MAGIC).await?;
    file.write_all(&CHECKPOINT_VERSION.to_le_bytes()).await?;
    file.write_all(&(payload.len() as u64).to_le_bytes()).await?;
    file.write_all(&payload).await?;
    file.sync_all().await?;

    tokio::fs::rename(&temp_path, path).await?;

    let size = 16 + payload.len() as u64;
    debug!(
        path = %path.display(),
        size_bytes = size,
        elapsed_ms = start.elapsed().as_millis(),
        "Checkpoint blob written"
    );

    Ok(size)
}

/// Read a checkpoint payload back from a framed blob
pub async fn read_blob(path: &Path) -> Result<Bytes> {
    let mut file = match File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::CheckpointNotFound {
                path: path.display().to_string(),
            });
        }
        Err(e) => return Err(e.into()),
    };

    let mut magic = [0u8; 4];
    file.read_exact(&mut magic).await?;
    if magic != CHECKPOINT_MAGIC {
        return Err(Error::CheckpointCorrupted {
            path: path.display().to_string(),
            reason: "invalid magic".to_string(),
        });
    }

    let version = file.read_u32_le().await?;
    if version != CHECKPOINT_VERSION {
        warn!(
            path = %path.display(),
            expected = CHECKPOINT_VERSION,
            found = version,
            "Checkpoint version mismatch"
        );
    }

    let payload_len = file.read_u64_le().await?;
    let mut payload = vec![0u8; payload_len as usize];
    file.read_exact(&mut payload).await.map_err(|_| Error::CheckpointCorrupted {
        path: path.display().to_string(),
        reason: "truncated payload".to_string(),
    })?;

    Ok(Bytes::from(payload))
}

/// Record `blob_path` as the last completed checkpoint.
///
/// The pointer file is replaced wholesale; there is no write history. A
/// crash mid-write can leave a partial pointer, which readers treat the
/// same as no pointer at all.
pub async fn tag_last_checkpoint(output_dir: &Path, blob_path: &Path) -> Result<()> {
    let absolute = tokio::fs::canonicalize(blob_path).await?;
    let pointer = output_dir.join(LAST_CHECKPOINT_FILE);
    tokio::fs::write(&pointer, absolute.display().to_string()).await?;

    info!(
        pointer = %pointer.display(),
        checkpoint = %absolute.display(),
        "Tagged last checkpoint"
    );
    Ok(())
}

/// Resolve the last-checkpoint pointer, if one is readable
pub async fn read_last_checkpoint(output_dir: &Path) -> Option<PathBuf> {
    let pointer = output_dir.join(LAST_CHECKPOINT_FILE);
    match tokio::fs::read_to_string(&pointer).await {
        Ok(contents) => {
            let trimmed = contents.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(PathBuf::from(trimmed))
            }
        }
        Err(_) => None,
    }
}

/// Unique temporary path next to the final blob location
fn temp_path(path: &Path) -> PathBuf {
    let name = format!(
        ".{}.{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy(),
        Uuid::new_v4()
    );
    path.with_file_name(name)
}
