//! Namespaced cache store
//!
//! Entry metadata lives in the database, bodies in content-addressed blob
//! storage. A body is written before the row that references it, and the row
//! is replaced with a single upsert, so a reader sees either the previous
//! entry or the new one.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::StatusCode;
use shellcache_db::{CacheEntry, Database, Namespace, NewCacheEntry};
use shellcache_proxy::UpstreamResponse;
use shellcache_storage::{StorageBackend, StorageError, compute_sha256};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::CoreError;
use crate::request::{InterceptedResponse, RequestIdentity, ResponseSource};

/// A response read back from the store
#[derive(Debug, Clone)]
pub struct StoredResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// `None` when the stored timestamp is missing or corrupt
    pub fetched_at: Option<DateTime<Utc>>,
}

impl StoredResponse {
    pub fn into_response(self, source: ResponseSource) -> InterceptedResponse {
        InterceptedResponse {
            status: self.status,
            headers: self.headers,
            body: self.body,
            source,
        }
    }
}

/// Cache store over the metadata index and blob storage
pub struct CacheStore {
    db: Database,
    storage: Arc<dyn StorageBackend>,
}

impl CacheStore {
    /// Create a new cache store
    pub fn new(db: Database, storage: Arc<dyn StorageBackend>) -> Self {
        Self { db, storage }
    }

    /// Make sure a namespace exists, returning `true` if it was created
    pub async fn open(&self, namespace: &str) -> Result<bool, CoreError> {
        let created = self.db.create_namespace(namespace).await?;
        if created {
            info!("Created cache namespace: {}", namespace);
        }
        Ok(created)
    }

    /// Look up the entry for a request identity
    ///
    /// An entry whose body has gone missing from storage is removed and
    /// reported as a miss.
    pub async fn match_entry(
        &self,
        namespace: &str,
        identity: &RequestIdentity,
    ) -> Result<Option<StoredResponse>, CoreError> {
        let method = identity.method.as_str();
        let url = identity.url.as_str();

        let Some(entry) = self.db.get_cache_entry(namespace, method, url).await? else {
            debug!("Cache miss in {}: {}", namespace, identity);
            return Ok(None);
        };

        match self.storage.read(&entry.body_digest).await {
            Ok(body) => Ok(Some(stored_response(entry, body)?)),
            Err(StorageError::NotFound(_)) => {
                warn!(
                    "Cache entry in database but body missing from storage: {} ({})",
                    identity, entry.body_digest
                );
                self.db
                    .delete_cache_entry(namespace, method, url, &entry.body_digest)
                    .await?;
                Ok(None)
            }
            Err(e) => Err(CoreError::Storage(e)),
        }
    }

    /// Check whether an entry exists without reading its body
    pub async fn contains(
        &self,
        namespace: &str,
        identity: &RequestIdentity,
    ) -> Result<bool, CoreError> {
        let entry = self
            .db
            .get_cache_entry(namespace, identity.method.as_str(), identity.url.as_str())
            .await?;
        match entry {
            Some(entry) => Ok(self.storage.exists(&entry.body_digest).await?),
            None => Ok(false),
        }
    }

    /// Store a response, replacing any prior entry for the identity
    pub async fn put(
        &self,
        namespace: &str,
        identity: &RequestIdentity,
        response: &UpstreamResponse,
        fetched_at: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        let digest = compute_sha256(&response.body);
        if !self.storage.exists(&digest).await? {
            self.storage.write(&digest, response.body.clone()).await?;
        }

        let headers = response
            .headers
            .iter()
            .filter_map(|(name, value)| match value.to_str() {
                Ok(value) => Some((name.as_str().to_string(), value.to_string())),
                Err(_) => {
                    debug!("Dropping non-UTF-8 header {} from {}", name, identity);
                    None
                }
            })
            .collect();

        self.db
            .upsert_cache_entry(NewCacheEntry {
                namespace: namespace.to_string(),
                method: identity.method.as_str().to_string(),
                url: identity.url.as_str().to_string(),
                status: response.status.as_u16(),
                headers,
                body_digest: digest,
                size: response.body.len() as i64,
                fetched_at,
            })
            .await?;

        debug!(
            "Stored {} in {} ({} bytes)",
            identity,
            namespace,
            response.body.len()
        );
        Ok(())
    }

    /// List namespaces with their entry counts
    pub async fn list_namespaces(&self) -> Result<Vec<Namespace>, CoreError> {
        Ok(self.db.list_namespaces().await?)
    }

    /// Names of all existing namespaces
    pub async fn namespace_names(&self) -> Result<BTreeSet<String>, CoreError> {
        Ok(self
            .list_namespaces()
            .await?
            .into_iter()
            .map(|ns| ns.name)
            .collect())
    }

    /// Delete a namespace and reclaim bodies nothing else references
    ///
    /// Must not run concurrently with request handling: a body reclaimed here
    /// could be one a concurrent `put` has just decided not to rewrite.
    pub async fn delete_namespace(&self, namespace: &str) -> Result<bool, CoreError> {
        let Some(digests) = self.db.delete_namespace(namespace).await? else {
            return Ok(false);
        };

        let reclaimed = self.collect_garbage(&digests).await?;
        info!(
            "Deleted cache namespace {} ({} bodies reclaimed)",
            namespace, reclaimed
        );
        Ok(true)
    }

    async fn collect_garbage(&self, digests: &[String]) -> Result<usize, CoreError> {
        let mut reclaimed = 0;
        for digest in digests {
            if self.db.is_digest_referenced(digest).await? {
                continue;
            }
            if self.storage.delete(digest).await? {
                reclaimed += 1;
            }
        }
        Ok(reclaimed)
    }
}

fn stored_response(entry: CacheEntry, body: Bytes) -> Result<StoredResponse, CoreError> {
    let status = StatusCode::from_u16(entry.status).map_err(|_| {
        shellcache_db::DbError::InvalidRow(format!("invalid status {}", entry.status))
    })?;

    let mut headers = HeaderMap::with_capacity(entry.headers.len());
    for (name, value) in &entry.headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.append(name, value);
            }
            _ => warn!("Skipping malformed stored header {} on {}", name, entry.url),
        }
    }

    Ok(StoredResponse {
        status,
        headers,
        body,
        fetched_at: entry.fetched_at,
    })
}
