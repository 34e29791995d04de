//! Intercepted requests and the responses produced for them

use bytes::Bytes;
use http::header::{self, HeaderMap, HeaderValue};
use http::{Method, StatusCode};
use serde::Serialize;
use shellcache_proxy::{OutboundRequest, UpstreamResponse};
use std::fmt;
use url::Url;

/// Cache key: method plus absolute URL, query included, headers ignored
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestIdentity {
    pub method: Method,
    pub url: Url,
}

impl RequestIdentity {
    pub fn new(method: Method, url: Url) -> Self {
        Self { method, url }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }
}

impl fmt::Display for RequestIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// A request entering the interception point
#[derive(Debug, Clone)]
pub struct InterceptedRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Top-level document load rather than a sub-resource fetch
    pub navigate: bool,
}

impl InterceptedRequest {
    /// Build a request, deriving navigation intent from its fetch metadata
    pub fn new(method: Method, url: Url, headers: HeaderMap, body: Bytes) -> Self {
        let navigate = navigation_intent(&headers);
        Self {
            method,
            url,
            headers,
            body,
            navigate,
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url, HeaderMap::new(), Bytes::new())
    }

    pub fn identity(&self) -> RequestIdentity {
        RequestIdentity::new(self.method.clone(), self.url.clone())
    }

    pub fn to_outbound(&self) -> OutboundRequest {
        OutboundRequest {
            method: self.method.clone(),
            url: self.url.clone(),
            headers: self.headers.clone(),
            body: self.body.clone(),
        }
    }
}

/// `Sec-Fetch-Mode: navigate` or `Sec-Fetch-Dest: document`
pub fn navigation_intent(headers: &HeaderMap) -> bool {
    let is = |name: &str, expected: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.trim().eq_ignore_ascii_case(expected))
    };
    is("sec-fetch-mode", "navigate") || is("sec-fetch-dest", "document")
}

/// Where a response came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseSource {
    /// Fresh cache entry
    Cache,
    /// Cache entry served after a failed refresh
    StaleCache,
    Network,
    OfflineFallback,
    /// Synthesized by the cache itself
    Synthesized,
}

impl ResponseSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseSource::Cache => "cache",
            ResponseSource::StaleCache => "stale_cache",
            ResponseSource::Network => "network",
            ResponseSource::OfflineFallback => "offline_fallback",
            ResponseSource::Synthesized => "synthesized",
        }
    }
}

/// The single response produced for an intercepted request
#[derive(Debug, Clone)]
pub struct InterceptedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub source: ResponseSource,
}

impl InterceptedResponse {
    pub fn from_upstream(response: UpstreamResponse, source: ResponseSource) -> Self {
        Self {
            status: response.status,
            headers: response.headers,
            body: response.body,
            source,
        }
    }

    /// A plain-text response generated without the network or the store
    pub fn synthesized(status: StatusCode, message: &str) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        Self {
            status,
            headers,
            body: Bytes::from(message.to_string()),
            source: ResponseSource::Synthesized,
        }
    }
}
