//! Strategy executor for intercepted requests
//!
//! Every request is classified and handed to exactly one strategy, and every
//! strategy produces exactly one response. Network and store failures are
//! absorbed here and never reach the caller as errors.

use chrono::{DateTime, Utc};
use http::header::HeaderValue;
use http::{Method, StatusCode};
use shellcache_proxy::{Fetcher, ProxyError, UpstreamResponse};
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::cache::{CacheStore, StoredResponse, entry_age};
use crate::clock::Clock;
use crate::config::{CacheConfig, FETCHED_AT_HEADER};
use crate::error::CoreError;
use crate::lifecycle::PhaseGate;
use crate::request::{InterceptedRequest, InterceptedResponse, RequestIdentity, ResponseSource};
use crate::routing::{RequestClass, RequestClassifier};

/// Interception router
#[derive(Clone)]
pub struct Interceptor {
    config: Arc<CacheConfig>,
    classifier: Arc<RequestClassifier>,
    store: Arc<CacheStore>,
    fetcher: Arc<dyn Fetcher>,
    clock: Arc<dyn Clock>,
    gate: PhaseGate,
}

impl Interceptor {
    /// Create a new interceptor
    pub fn new(
        config: Arc<CacheConfig>,
        store: Arc<CacheStore>,
        fetcher: Arc<dyn Fetcher>,
        clock: Arc<dyn Clock>,
        gate: PhaseGate,
    ) -> Result<Self, CoreError> {
        let classifier = RequestClassifier::new(&config.dynamic_patterns)?;
        Ok(Self {
            config,
            classifier: Arc::new(classifier),
            store,
            fetcher,
            clock,
            gate,
        })
    }

    pub fn classify(&self, request: &InterceptedRequest) -> RequestClass {
        self.classifier.classify(request)
    }

    /// Produce the response for an intercepted request
    pub async fn handle(&self, request: InterceptedRequest) -> InterceptedResponse {
        let class = self.classify(&request);
        metrics::counter!("shellcache_requests_total", "class" => class.as_str()).increment(1);
        debug!("{} {} classified as {}", request.method, request.url, class);

        let phase = self.gate.request().await;

        match class {
            RequestClass::DynamicData => {
                // Runs detached so the refresh completes, and the cache is
                // populated, even if the caller goes away.
                let this = self.clone();
                let task = tokio::spawn(async move {
                    let _phase = phase;
                    this.dynamic_data(request).await
                });
                match task.await {
                    Ok(response) => response,
                    Err(e) => {
                        error!("Dynamic data task failed: {}", e);
                        InterceptedResponse::synthesized(
                            StatusCode::INTERNAL_SERVER_ERROR,
                            "Internal cache error",
                        )
                    }
                }
            }
            RequestClass::Navigation => {
                let response = self.navigation(request).await;
                drop(phase);
                response
            }
            RequestClass::StaticAsset => {
                let response = self.static_asset(request).await;
                drop(phase);
                response
            }
        }
    }

    /// TTL-gated revalidate-or-refresh
    async fn dynamic_data(&self, request: InterceptedRequest) -> InterceptedResponse {
        // The body is not part of the identity, so only GETs are cacheable
        if request.method != Method::GET {
            return self.passthrough(request).await;
        }

        let namespace = &self.config.dynamic_namespace;
        let identity = request.identity();
        let cached = self.lookup(namespace, &identity).await;

        if let Some(entry) = &cached {
            let now = self.clock.now();
            if self.config.dynamic_freshness().is_fresh(entry.fetched_at, now) {
                debug!(
                    "Fresh dynamic entry for {} (age {:?})",
                    identity,
                    entry_age(entry.fetched_at, now)
                );
                record_hit(namespace);
                return entry.clone().into_response(ResponseSource::Cache);
            }
        }

        match self.fetcher.fetch(request.to_outbound()).await {
            Ok(upstream) => {
                let fetched_at = self.clock.now();
                let upstream = stamp_fetched_at(upstream, fetched_at);
                if let Err(e) = self.store.put(namespace, &identity, &upstream, fetched_at).await {
                    warn!("Failed to store {} in {}: {}", identity, namespace, e);
                }
                InterceptedResponse::from_upstream(upstream, ResponseSource::Network)
            }
            Err(e) => {
                record_network_failure(&identity, &e);
                match cached {
                    Some(entry) => {
                        debug!("Serving stale dynamic entry for {}", identity);
                        metrics::counter!("shellcache_stale_served_total").increment(1);
                        entry.into_response(ResponseSource::StaleCache)
                    }
                    None => self.offline_fallback().await,
                }
            }
        }
    }

    /// Network-first with offline fallback, never cached
    async fn navigation(&self, request: InterceptedRequest) -> InterceptedResponse {
        self.passthrough(request).await
    }

    /// Straight to the network, offline fallback on failure, nothing stored
    async fn passthrough(&self, request: InterceptedRequest) -> InterceptedResponse {
        let identity = request.identity();
        match self.fetcher.fetch(request.to_outbound()).await {
            Ok(upstream) => InterceptedResponse::from_upstream(upstream, ResponseSource::Network),
            Err(e) => {
                record_network_failure(&identity, &e);
                self.offline_fallback().await
            }
        }
    }

    /// Cache-first, network on a miss without writing back
    async fn static_asset(&self, request: InterceptedRequest) -> InterceptedResponse {
        let namespace = &self.config.static_namespace;
        let identity = request.identity();

        if let Some(entry) = self.lookup(namespace, &identity).await
            && self.config.static_freshness().is_fresh(entry.fetched_at, self.clock.now())
        {
            record_hit(namespace);
            return entry.into_response(ResponseSource::Cache);
        }

        match self.fetcher.fetch(request.to_outbound()).await {
            Ok(upstream) => InterceptedResponse::from_upstream(upstream, ResponseSource::Network),
            Err(e) => {
                record_network_failure(&identity, &e);
                gateway_error(&e)
            }
        }
    }

    /// The designated offline response from the static namespace
    async fn offline_fallback(&self) -> InterceptedResponse {
        metrics::counter!("shellcache_offline_fallbacks_total").increment(1);

        let identity = RequestIdentity::get(self.config.offline_fallback.clone());
        match self.lookup(&self.config.static_namespace, &identity).await {
            Some(entry) => entry.into_response(ResponseSource::OfflineFallback),
            None => {
                warn!(
                    "Offline fallback {} is not cached in {}",
                    identity, self.config.static_namespace
                );
                InterceptedResponse::synthesized(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Offline and no cached copy is available",
                )
            }
        }
    }

    /// Store lookup where any failure counts as a miss
    async fn lookup(&self, namespace: &str, identity: &RequestIdentity) -> Option<StoredResponse> {
        match self.store.match_entry(namespace, identity).await {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Cache lookup for {} in {} failed: {}", identity, namespace, e);
                None
            }
        }
    }
}

fn record_hit(namespace: &str) {
    metrics::counter!("shellcache_cache_hits_total", "namespace" => namespace.to_string())
        .increment(1);
}

fn record_network_failure(identity: &RequestIdentity, error: &ProxyError) {
    metrics::counter!("shellcache_network_failures_total").increment(1);
    warn!("Network fetch failed for {}: {}", identity, error);
}

/// Record when a dynamic response was fetched, replacing any earlier stamp
fn stamp_fetched_at(mut response: UpstreamResponse, fetched_at: DateTime<Utc>) -> UpstreamResponse {
    response.headers.insert(
        FETCHED_AT_HEADER,
        HeaderValue::from(fetched_at.timestamp_millis()),
    );
    response
}

fn gateway_error(error: &ProxyError) -> InterceptedResponse {
    if error.is_timeout() {
        InterceptedResponse::synthesized(StatusCode::GATEWAY_TIMEOUT, "Upstream request timed out")
    } else {
        InterceptedResponse::synthesized(StatusCode::BAD_GATEWAY, "Upstream unreachable")
    }
}
