//! API routes

mod health;
pub mod intercept;
pub mod metrics;
mod namespaces;

use axum::Router;
use std::sync::Arc;

use crate::state::{AppState, MetricsHandle};

/// Create the main router
///
/// The cache's own endpoints live under `/_shellcache`; every other request is
/// proxied traffic and goes through the interceptor.
pub fn create_router(state: AppState, metrics_handle: Option<Arc<MetricsHandle>>) -> Router {
    let mut router = Router::new()
        .merge(health::routes())
        .merge(namespaces::routes());

    // Add metrics endpoint if handle is provided
    if let Some(handle) = metrics_handle {
        router = router.merge(metrics::routes(handle));
    }

    // Interception - must be last to not shadow the admin routes
    router.fallback(intercept::intercept).with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use bytes::Bytes;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use parking_lot::Mutex;
    use shellcache_core::{
        CacheConfig, CacheStore, Interceptor, LifecycleManager, PhaseGate, SystemClock,
    };
    use shellcache_db::Database;
    use shellcache_proxy::{Fetcher, OutboundRequest, ProxyError, UpstreamResponse};
    use shellcache_storage::MemoryStorage;
    use std::collections::HashMap;
    use tower::ServiceExt;
    use url::Url;

    /// Serves scripted responses; everything else is unreachable
    #[derive(Default)]
    struct FakeNetwork {
        responses: Mutex<HashMap<String, (StatusCode, &'static str)>>,
    }

    impl FakeNetwork {
        fn serve(&self, url: &str, status: StatusCode, body: &'static str) {
            self.responses.lock().insert(url.to_string(), (status, body));
        }

        fn disconnect(&self) {
            self.responses.lock().clear();
        }
    }

    #[async_trait]
    impl Fetcher for FakeNetwork {
        async fn fetch(&self, request: OutboundRequest) -> Result<UpstreamResponse, ProxyError> {
            let url = request.url.to_string();
            let (status, body) = self
                .responses
                .lock()
                .get(&url)
                .copied()
                .ok_or_else(|| ProxyError::Unreachable(url.clone()))?;
            let mut headers = axum::http::HeaderMap::new();
            headers.insert("content-type", "text/html".parse().unwrap());
            headers.insert("content-length", body.len().into());
            Ok(UpstreamResponse {
                status,
                headers,
                body: Bytes::from_static(body.as_bytes()),
            })
        }
    }

    async fn app(metrics: Option<Arc<MetricsHandle>>) -> (Router, Arc<FakeNetwork>) {
        let mut config = CacheConfig::for_origin(Url::parse("http://localhost:8080").unwrap()).unwrap();
        config.shell_manifest = vec![
            Url::parse("http://localhost:8080/").unwrap(),
            Url::parse("http://localhost:8080/offline.html").unwrap(),
            Url::parse("http://localhost:8080/script.js").unwrap(),
        ];
        let config = Arc::new(config);

        let db = Database::in_memory().await.unwrap();
        let store = Arc::new(CacheStore::new(db, Arc::new(MemoryStorage::new())));
        let network = Arc::new(FakeNetwork::default());
        let gate = PhaseGate::new();

        network.serve("http://localhost:8080/", StatusCode::OK, "<html>index</html>");
        network.serve("http://localhost:8080/offline.html", StatusCode::OK, "<html>offline</html>");
        network.serve("http://localhost:8080/script.js", StatusCode::OK, "console.log(1)");

        store.open("weather-app-v1").await.unwrap();

        let lifecycle = Arc::new(LifecycleManager::new(
            config.clone(),
            store.clone(),
            network.clone(),
            Arc::new(SystemClock),
            gate.clone(),
        ));
        lifecycle.install().await.unwrap();
        lifecycle.activate().await.unwrap();
        network.disconnect();

        let interceptor = Interceptor::new(
            config.clone(),
            store.clone(),
            network.clone(),
            Arc::new(SystemClock),
            gate,
        )
        .unwrap();

        let state = AppState::new(config, store, interceptor, lifecycle);
        (create_router(state, metrics), network)
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Bytes) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, body)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = app(None).await;
        let (status, _, body) = send(&app, get("/_shellcache/health")).await;

        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["lifecycle"], "activated");
    }

    #[tokio::test]
    async fn test_namespaces_after_activation() {
        let (app, _) = app(None).await;
        let (status, _, body) = send(&app, get("/_shellcache/namespaces")).await;

        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        let names: Vec<&str> = json
            .as_array()
            .unwrap()
            .iter()
            .map(|ns| ns["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["weather-app-v2", "weather-data-v1"]);
        assert_eq!(json[0]["entry_count"], 3);
        assert_eq!(json[0]["retained"], true);
    }

    #[tokio::test]
    async fn test_origin_form_static_asset_from_cache() {
        let (app, _) = app(None).await;
        let (status, headers, body) = send(&app, get("/script.js")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, Bytes::from_static(b"console.log(1)"));
        assert_eq!(headers[intercept::SOURCE_HEADER], "cache");
        assert_eq!(headers["content-type"], "text/html");
    }

    #[tokio::test]
    async fn test_navigation_offline_serves_fallback() {
        let (app, _) = app(None).await;
        let request = Request::builder()
            .uri("/forecast/oslo")
            .header("sec-fetch-mode", "navigate")
            .body(Body::empty())
            .unwrap();

        let (status, headers, body) = send(&app, request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, Bytes::from_static(b"<html>offline</html>"));
        assert_eq!(headers[intercept::SOURCE_HEADER], "offline_fallback");
    }

    #[tokio::test]
    async fn test_absolute_form_dynamic_data() {
        let (app, network) = app(None).await;
        let url = "https://api.openweathermap.org/data/2.5/weather?q=Oslo";
        network.serve(url, StatusCode::OK, "{\"temp\":21}");

        let (status, headers, body) = send(&app, get(url)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, Bytes::from_static(b"{\"temp\":21}"));
        assert_eq!(headers[intercept::SOURCE_HEADER], "network");
        assert!(headers.contains_key(shellcache_core::FETCHED_AT_HEADER));

        network.disconnect();
        let (_, headers, body) = send(&app, get(url)).await;
        assert_eq!(body, Bytes::from_static(b"{\"temp\":21}"));
        assert_eq!(headers[intercept::SOURCE_HEADER], "cache");
    }

    #[tokio::test]
    async fn test_static_miss_offline_is_bad_gateway() {
        let (app, _) = app(None).await;
        let (status, headers, _) = send(&app, get("https://unpkg.com/leaflet/dist/leaflet.js")).await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(headers[intercept::SOURCE_HEADER], "synthesized");
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let (app, _) = app(Some(Arc::new(recorder.handle()))).await;

        let (status, _, _) = send(&app, get("/_shellcache/metrics")).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_metrics_endpoint_absent_without_handle() {
        let (app, _) = app(None).await;

        // Falls through to interception, which has nothing for it offline
        let (status, headers, _) = send(&app, get("/_shellcache/metrics")).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(headers[intercept::SOURCE_HEADER], "synthesized");
    }
}
