//! Streaming SHA-256 digests for model files.
//!
//! Files are read in fixed-size chunks so multi-gigabyte checkpoints never
//! sit in memory. A failed open or read returns an error, never a partial
//! digest.

use crate::error::{Result, SortError};
use crate::types::Digest;
use sha2::{Digest as _, Sha256};
use std::io::Read;
use std::path::Path;

/// Chunk size for reading files (1MB).
const CHUNK_SIZE: usize = 1024 * 1024;

/// Compute the SHA-256 digest of a file.
pub fn digest(path: impl AsRef<Path>) -> Result<Digest> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).map_err(|e| SortError::io_with_path(e, path))?;
    digest_reader(file).map_err(|e| SortError::io_with_path(e, path))
}

/// Compute the digest on the blocking pool.
///
/// Hashing is disk-bound, so the run task hands it off instead of stalling
/// the runtime.
pub async fn digest_async(path: impl AsRef<Path>) -> Result<Digest> {
    let path = path.as_ref().to_path_buf();
    tokio::task::spawn_blocking(move || digest(&path))
        .await
        .map_err(|e| SortError::Other(format!("Hash computation task failed: {}", e)))?
}

fn digest_reader(mut reader: impl Read) -> std::io::Result<Digest> {
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];

    loop {
        let bytes_read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(Digest::from_hex(hex::encode(hasher.finalize())))
}
