//! Local disk storage backend

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};
use uuid::Uuid;

use crate::backend::{StorageBackend, parse_digest, validate_digest, verify_digest};
use crate::error::StorageError;

/// Local disk storage backend
///
/// Stores bodies in a content-addressable directory structure:
/// `<base_path>/blobs/<algorithm>/<first 2 chars>/<digest>`
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    /// Create a new local storage backend
    pub async fn new(base_path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let base_path = base_path.as_ref().to_path_buf();

        fs::create_dir_all(base_path.join("blobs")).await?;

        info!("Initialized local storage at {:?}", base_path);

        Ok(Self { base_path })
    }

    /// Get the file path for a digest
    fn blob_path(&self, digest: &str) -> Result<PathBuf, StorageError> {
        validate_digest(digest)?;
        let (algorithm, hash) = parse_digest(digest)?;

        // Use first 2 characters for sharding
        let shard = &hash[..2];
        Ok(self
            .base_path
            .join("blobs")
            .join(algorithm)
            .join(shard)
            .join(hash))
    }
}

fn not_found_or_io(digest: &str, e: std::io::Error) -> StorageError {
    if e.kind() == std::io::ErrorKind::NotFound {
        StorageError::NotFound(digest.to_string())
    } else {
        StorageError::Io(e)
    }
}

#[async_trait]
impl StorageBackend for LocalStorage {
    async fn exists(&self, digest: &str) -> Result<bool, StorageError> {
        let path = self.blob_path(digest)?;
        Ok(fs::try_exists(&path).await?)
    }

    async fn read(&self, digest: &str) -> Result<Bytes, StorageError> {
        let path = self.blob_path(digest)?;
        debug!("Reading blob from {:?}", path);

        let data = fs::read(&path)
            .await
            .map_err(|e| not_found_or_io(digest, e))?;

        Ok(Bytes::from(data))
    }

    async fn write(&self, digest: &str, data: Bytes) -> Result<String, StorageError> {
        verify_digest(digest, &data)?;

        let path = self.blob_path(digest)?;
        debug!("Writing blob to {:?} ({} bytes)", path, data.len());

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Unique temp name: concurrent writers of the same body must not share one
        let temp_path = path.with_extension(format!("{}.tmp", Uuid::new_v4()));
        fs::write(&temp_path, &data).await?;
        if let Err(e) = fs::rename(&temp_path, &path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(StorageError::Io(e));
        }

        Ok(path.to_string_lossy().to_string())
    }

    async fn delete(&self, digest: &str) -> Result<bool, StorageError> {
        let path = self.blob_path(digest)?;
        debug!("Deleting blob at {:?}", path);

        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    fn storage_path(&self, digest: &str) -> String {
        self.blob_path(digest)
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}
