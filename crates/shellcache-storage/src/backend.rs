//! Storage backend trait

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::StorageError;

/// Storage backend trait
///
/// Implementations provide content-addressable storage for response bodies.
/// A body is addressed by the SHA-256 digest of its bytes, so identical bodies
/// cached under different keys share one object.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Check if a body exists
    async fn exists(&self, digest: &str) -> Result<bool, StorageError>;

    /// Read a body fully into memory
    async fn read(&self, digest: &str) -> Result<Bytes, StorageError>;

    /// Write a body (verifies digest before it becomes visible)
    async fn write(&self, digest: &str, data: Bytes) -> Result<String, StorageError>;

    /// Delete a body, returning whether it existed
    async fn delete(&self, digest: &str) -> Result<bool, StorageError>;

    /// Get the storage path for a digest (for logging and metadata)
    fn storage_path(&self, digest: &str) -> String;
}

/// Parse a digest string (e.g., "sha256:abc123...")
pub fn parse_digest(digest: &str) -> Result<(&str, &str), StorageError> {
    digest.split_once(':').ok_or_else(|| {
        StorageError::InvalidDigest(format!("Invalid digest format: {}", digest))
    })
}

/// Validate that a digest is a well-formed sha256 digest.
///
/// Digests end up in filesystem paths, so anything other than 64 lowercase
/// hex characters is rejected.
pub fn validate_digest(digest: &str) -> Result<(), StorageError> {
    let (algorithm, hash) = parse_digest(digest)?;

    if algorithm != "sha256" {
        return Err(StorageError::InvalidDigest(format!(
            "Unsupported algorithm: {}",
            algorithm
        )));
    }

    if hash.len() != 64
        || !hash
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
    {
        return Err(StorageError::InvalidDigest(digest.to_string()));
    }

    Ok(())
}

/// Compute SHA256 digest of data
pub fn compute_sha256(data: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    format!("sha256:{}", hex::encode(result))
}

/// Verify that `data` hashes to `digest`
pub(crate) fn verify_digest(digest: &str, data: &[u8]) -> Result<(), StorageError> {
    let computed = compute_sha256(data);
    if computed != digest {
        return Err(StorageError::DigestMismatch {
            expected: digest.to_string(),
            actual: computed,
        });
    }
    Ok(())
}
