//! Interception point
//!
//! Every request that is not an admin endpoint lands here. The request target
//! may be absolute-form (the client uses us as a forward proxy) or origin-form
//! (resolved against the shell origin).

use axum::body::{Body, to_bytes};
use axum::extract::{Request, State};
use axum::http::{HeaderValue, Uri, header};
use axum::response::Response;
use shellcache_core::{InterceptedRequest, InterceptedResponse};
use shellcache_proxy::strip_hop_by_hop;
use tracing::debug;
use url::Url;

use crate::error::ApiError;
use crate::state::AppState;

/// Response header naming where the response came from
pub const SOURCE_HEADER: &str = "x-shellcache-source";

/// Fallback handler for all proxied traffic
pub async fn intercept(
    State(state): State<AppState>,
    request: Request,
) -> Result<Response, ApiError> {
    let (parts, body) = request.into_parts();
    let url = request_url(&state.config.origin, &parts.uri)?;
    let body = to_bytes(body, state.max_body_size)
        .await
        .map_err(|e| ApiError::BadRequest(format!("Failed to read request body: {}", e)))?;

    let mut headers = parts.headers;
    strip_hop_by_hop(&mut headers);
    headers.remove(header::HOST);

    let request = InterceptedRequest::new(parts.method, url, headers, body);
    let method = request.method.clone();
    let url = request.url.clone();

    let response = state.interceptor.handle(request).await;
    debug!(
        "{} {} -> {} ({})",
        method,
        url,
        response.status.as_u16(),
        response.source.as_str()
    );

    Ok(into_http_response(response))
}

/// Absolute URL for a request target
fn request_url(origin: &Url, uri: &Uri) -> Result<Url, ApiError> {
    if uri.scheme().is_some() {
        let url = Url::parse(&uri.to_string())
            .map_err(|e| ApiError::BadRequest(format!("Invalid request target {}: {}", uri, e)))?;
        return match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(ApiError::BadRequest(format!("Unsupported scheme: {}", other))),
        };
    }

    let mut url = origin.clone();
    url.set_path(uri.path());
    url.set_query(uri.query());
    Ok(url)
}

fn into_http_response(response: InterceptedResponse) -> Response {
    let mut headers = response.headers;
    strip_hop_by_hop(&mut headers);
    // Recomputed from the body we actually send
    headers.remove(header::CONTENT_LENGTH);
    headers.insert(SOURCE_HEADER, HeaderValue::from_static(response.source.as_str()));

    let mut http_response = Response::new(Body::from(response.body));
    *http_response.status_mut() = response.status;
    *http_response.headers_mut() = headers;
    http_response
}
