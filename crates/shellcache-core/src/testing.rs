//! Test fixtures shared by the core modules

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{self, HeaderMap, HeaderValue};
use http::StatusCode;
use parking_lot::Mutex;
use shellcache_db::Database;
use shellcache_proxy::{Fetcher, OutboundRequest, ProxyError, UpstreamResponse};
use shellcache_storage::MemoryStorage;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::CacheStore;

pub async fn memory_store() -> (CacheStore, Arc<MemoryStorage>) {
    let db = Database::in_memory().await.unwrap();
    let storage = Arc::new(MemoryStorage::new());
    (CacheStore::new(db, storage.clone()), storage)
}

pub fn response(status: StatusCode, body: &str) -> UpstreamResponse {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    UpstreamResponse {
        status,
        headers,
        body: Bytes::from(body.to_string()),
    }
}

pub fn ok_response(body: &str) -> UpstreamResponse {
    response(StatusCode::OK, body)
}

/// Fetcher answering from a per-URL script; unscripted URLs are unreachable
#[derive(Default)]
pub struct ScriptedFetcher {
    routes: Mutex<HashMap<String, UpstreamResponse>>,
    calls: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn respond(&self, url: &str, response: UpstreamResponse) {
        self.routes.lock().insert(url.to_string(), response);
    }

    pub fn fail(&self, url: &str) {
        self.routes.lock().remove(url);
    }

    pub fn go_offline(&self) {
        self.routes.lock().clear();
    }

    pub fn reset_calls(&self) {
        self.calls.lock().clear();
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn calls_to(&self, url: &str) -> usize {
        self.calls.lock().iter().filter(|u| *u == url).count()
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, request: OutboundRequest) -> Result<UpstreamResponse, ProxyError> {
        let url = request.url.to_string();
        self.calls.lock().push(url.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.routes
            .lock()
            .get(&url)
            .cloned()
            .ok_or_else(|| ProxyError::Unreachable(url))
    }
}
