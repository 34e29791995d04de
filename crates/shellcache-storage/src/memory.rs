//! In-memory storage backend
//!
//! Used for ephemeral deployments (`storage.backend = "memory"`) and tests.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;

use crate::backend::{StorageBackend, validate_digest, verify_digest};
use crate::error::StorageError;

/// Storage backend that keeps bodies in a map
#[derive(Default)]
pub struct MemoryStorage {
    blobs: RwLock<HashMap<String, Bytes>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored bodies
    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    async fn exists(&self, digest: &str) -> Result<bool, StorageError> {
        validate_digest(digest)?;
        Ok(self.blobs.read().contains_key(digest))
    }

    async fn read(&self, digest: &str) -> Result<Bytes, StorageError> {
        validate_digest(digest)?;
        self.blobs
            .read()
            .get(digest)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(digest.to_string()))
    }

    async fn write(&self, digest: &str, data: Bytes) -> Result<String, StorageError> {
        validate_digest(digest)?;
        verify_digest(digest, &data)?;
        self.blobs.write().insert(digest.to_string(), data);
        Ok(self.storage_path(digest))
    }

    async fn delete(&self, digest: &str) -> Result<bool, StorageError> {
        validate_digest(digest)?;
        Ok(self.blobs.write().remove(digest).is_some())
    }

    fn storage_path(&self, digest: &str) -> String {
        format!("memory://{}", digest)
    }
}
