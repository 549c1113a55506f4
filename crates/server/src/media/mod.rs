//! Media storage for message images and avatars.
//!
//! The delivery path hands raw image bytes to a [`MediaStore`] and persists
//! only the URL it returns. The production implementation is a
//! content-addressed blob directory on disk, served back out through
//! `GET /blobs/{hash}`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;

#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Store media bytes, returning the URL clients fetch them from.
    async fn upload(&self, data: Vec<u8>, content_type: &str) -> Result<String>;

    /// Fetch stored bytes and their content type by hash.
    async fn get(&self, hash: &str) -> Result<Option<(Vec<u8>, String)>>;
}

/// Sha256-addressed blob storage on disk. Each blob is a data file named by
/// its hash plus a small JSON sidecar with the content type.
pub struct BlobStore {
    blob_dir: PathBuf,
}

#[derive(Serialize, Deserialize)]
struct BlobMeta {
    content_type: String,
    size: u64,
}

impl BlobStore {
    pub fn new(blob_dir: PathBuf) -> Self {
        Self { blob_dir }
    }

    fn data_path(&self, hash: &str) -> PathBuf {
        self.blob_dir.join(hash)
    }

    fn meta_path(&self, hash: &str) -> PathBuf {
        self.blob_dir.join(format!("{hash}.json"))
    }
}

/// Blob names are always lowercase hex; anything else is rejected before it
/// can touch the filesystem.
fn is_valid_hash(hash: &str) -> bool {
    !hash.is_empty() && hash.chars().all(|c| c.is_ascii_hexdigit())
}

#[async_trait]
impl MediaStore for BlobStore {
    async fn upload(&self, data: Vec<u8>, content_type: &str) -> Result<String> {
        let mut hasher = Sha256::new();
        hasher.update(&data);
        let hash = format!("{:x}", hasher.finalize());

        let meta = BlobMeta {
            content_type: content_type.to_string(),
            size: data.len() as u64,
        };

        // Write-then-rename so a crash never leaves a half-written blob
        // behind a valid name.
        let tmp = self.blob_dir.join(format!("{hash}.tmp"));
        tokio::fs::write(&tmp, &data)
            .await
            .context("failed to write blob data")?;
        tokio::fs::rename(&tmp, self.data_path(&hash))
            .await
            .context("failed to finalize blob data")?;
        tokio::fs::write(&self.meta_path(&hash), serde_json::to_vec(&meta)?)
            .await
            .context("failed to write blob metadata")?;

        info!(hash = %hash, size = meta.size, "stored blob");

        Ok(format!("/blobs/{hash}"))
    }

    async fn get(&self, hash: &str) -> Result<Option<(Vec<u8>, String)>> {
        if !is_valid_hash(hash) {
            return Ok(None);
        }

        let data = match tokio::fs::read(self.data_path(hash)).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).context("failed to read blob data"),
        };

        let content_type = match tokio::fs::read(self.meta_path(hash)).await {
            Ok(raw) => serde_json::from_slice::<BlobMeta>(&raw)
                .map(|m| m.content_type)
                .unwrap_or_else(|_| "application/octet-stream".to_string()),
            Err(_) => "application/octet-stream".to_string(),
        };

        Ok(Some((data, content_type)))
    }
}
