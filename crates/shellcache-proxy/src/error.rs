//! Proxy error types

use thiserror::Error;

/// A fetch that did not complete with an HTTP response
///
/// Every variant is a transport-level failure from the cache's point of view:
/// a completed exchange with an error status is an [`UpstreamResponse`], not a
/// `ProxyError`.
///
/// [`UpstreamResponse`]: crate::UpstreamResponse
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Upstream unreachable: {0}")]
    Unreachable(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ProxyError {
    /// Whether the failure was a timeout (connect or overall)
    pub fn is_timeout(&self) -> bool {
        match self {
            ProxyError::Http(e) => e.is_timeout(),
            ProxyError::Unreachable(_) | ProxyError::InvalidRequest(_) => false,
        }
    }
}
