//! Outbound HTTP client

use async_trait::async_trait;
use http::header::{self, HeaderMap};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::ProxyError;
use crate::exchange::{OutboundRequest, UpstreamResponse, strip_hop_by_hop};

/// The network as seen by the cache
///
/// `Ok` means the exchange completed, regardless of status code. `Err` means
/// no response was obtained at all.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: OutboundRequest) -> Result<UpstreamResponse, ProxyError>;
}

/// HTTP fetcher configuration
#[derive(Clone, Debug)]
pub struct HttpFetcherConfig {
    /// Overall timeout for a single exchange, body included
    pub timeout: Duration,
    /// Connection establishment timeout
    pub connect_timeout: Duration,
    /// Skip TLS certificate verification
    pub skip_tls_verify: bool,
    /// User agent sent when the intercepted request carries none
    pub user_agent: String,
}

impl Default for HttpFetcherConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            skip_tls_verify: false,
            user_agent: concat!("shellcache/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Fetcher backed by a shared reqwest client
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Create a new HTTP fetcher
    pub fn new(config: HttpFetcherConfig) -> Result<Self, ProxyError> {
        let mut builder = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent)
            // Redirects are returned to the client as-is, like any other response
            .redirect(reqwest::redirect::Policy::none());

        if config.skip_tls_verify {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let client = builder.build()?;

        info!(
            "Created HTTP fetcher (timeout: {:?}, connect timeout: {:?})",
            config.timeout, config.connect_timeout
        );

        Ok(Self { client })
    }
}

/// Prepare intercepted request headers for the outbound hop
fn outbound_headers(mut headers: HeaderMap) -> HeaderMap {
    strip_hop_by_hop(&mut headers);
    // Recomputed by the client for the upstream connection
    headers.remove(header::HOST);
    headers.remove(header::CONTENT_LENGTH);
    headers
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: OutboundRequest) -> Result<UpstreamResponse, ProxyError> {
        match request.url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(ProxyError::InvalidRequest(format!(
                    "Unsupported scheme '{}' in {}",
                    other, request.url
                )));
            }
        }

        debug!("Fetching {} {}", request.method, request.url);

        let response = self
            .client
            .request(request.method, request.url.clone())
            .headers(outbound_headers(request.headers))
            .body(request.body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    ProxyError::Unreachable(format!("{}: {}", request.url, e))
                } else {
                    ProxyError::Http(e)
                }
            })?;

        let status = response.status();
        let mut headers = response.headers().clone();
        strip_hop_by_hop(&mut headers);
        let body = response.bytes().await?;

        debug!(
            "Fetched {} -> {} ({} bytes)",
            request.url,
            status.as_u16(),
            body.len()
        );

        Ok(UpstreamResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, http::StatusCode as AxumStatus, routing::get};
    use bytes::Bytes;
    use http::{HeaderValue, Method, StatusCode};
    use url::Url;

    async fn spawn_upstream() -> String {
        let app = Router::new()
            .route("/data/2.5/weather", get(|| async { "{\"temp\":21}" }))
            .route(
                "/missing",
                get(|| async { (AxumStatus::NOT_FOUND, "no such thing") }),
            )
            .route(
                "/echo-agent",
                get(|headers: axum::http::HeaderMap| async move {
                    headers
                        .get("user-agent")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_string()
                }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn fetcher() -> HttpFetcher {
        HttpFetcher::new(HttpFetcherConfig {
            timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(2),
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let base = spawn_upstream().await;
        let url = Url::parse(&format!("{}/data/2.5/weather?q=Oslo", base)).unwrap();

        let response = fetcher().fetch(OutboundRequest::get(url)).await.unwrap();

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body, Bytes::from_static(b"{\"temp\":21}"));
    }

    #[tokio::test]
    async fn test_error_status_is_a_response() {
        let base = spawn_upstream().await;
        let url = Url::parse(&format!("{}/missing", base)).unwrap();

        let response = fetcher().fetch(OutboundRequest::get(url)).await.unwrap();

        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert_eq!(response.body, Bytes::from_static(b"no such thing"));
    }

    #[tokio::test]
    async fn test_intercepted_headers_are_forwarded() {
        let base = spawn_upstream().await;
        let mut request =
            OutboundRequest::get(Url::parse(&format!("{}/echo-agent", base)).unwrap());
        request
            .headers
            .insert(header::USER_AGENT, HeaderValue::from_static("weather-app/1.0"));
        request
            .headers
            .insert(header::HOST, HeaderValue::from_static("localhost:8080"));

        let response = fetcher().fetch(request).await.unwrap();

        assert_eq!(response.body, Bytes::from_static(b"weather-app/1.0"));
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_failure() {
        // Bind then drop to obtain a port nobody listens on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let url = Url::parse(&format!("http://{}/data/2.5/weather", addr)).unwrap();
        let result = fetcher().fetch(OutboundRequest::get(url)).await;

        assert!(matches!(result, Err(ProxyError::Unreachable(_))));
    }

    #[tokio::test]
    async fn test_unsupported_scheme() {
        let request = OutboundRequest {
            method: Method::GET,
            url: Url::parse("ftp://example.com/file").unwrap(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        };

        assert!(matches!(
            fetcher().fetch(request).await,
            Err(ProxyError::InvalidRequest(_))
        ));
    }
}
