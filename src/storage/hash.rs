//! Streaming content digest.
//!
//! Only the first `limit` bytes of a file are hashed. Two large files that
//! share that prefix hash identically; the cap keeps ingestion of very large
//! payloads bounded.

use anyhow::Result;
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::io::AsyncReadExt;

const CHUNK_SIZE: usize = 64 * 1024;

/// Progress callback, invoked with the number of bytes hashed so far.
pub type Progress<'a> = &'a (dyn Fn(u64) + Send + Sync);

/// Hex-encoded SHA-256 over at most `limit` leading bytes of `path`.
pub async fn hash_file(path: &Path, limit: u64, progress: Option<Progress<'_>>) -> Result<String> {
    let file = tokio::fs::File::open(path).await?;
    let mut reader = file.take(limit);
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];
    let mut total = 0u64;

    loop {
        let n = reader.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
        total += n as u64;
        if let Some(report) = progress {
            report(total);
        }
    }

    Ok(hex::encode(hasher.finalize()))
}
