//! Application state

use metrics_exporter_prometheus::PrometheusHandle;
use shellcache_core::{CacheConfig, CacheStore, Interceptor, LifecycleManager};
use std::sync::Arc;

/// Handle used to render the Prometheus exposition
pub type MetricsHandle = PrometheusHandle;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<CacheConfig>,
    pub store: Arc<CacheStore>,
    pub interceptor: Interceptor,
    pub lifecycle: Arc<LifecycleManager>,
    /// Largest request body accepted for interception
    pub max_body_size: usize,
}

impl AppState {
    pub fn new(
        config: Arc<CacheConfig>,
        store: Arc<CacheStore>,
        interceptor: Interceptor,
        lifecycle: Arc<LifecycleManager>,
    ) -> Self {
        Self {
            config,
            store,
            interceptor,
            lifecycle,
            max_body_size: 16 * 1024 * 1024,
        }
    }
}
