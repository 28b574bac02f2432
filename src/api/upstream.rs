//! Upstream forwarding for the standalone server.
//!
//! Every request that is not a server endpoint is forwarded verbatim to the
//! configured upstream base URL. This is the downstream handler the body
//! transform middleware wraps.

use crate::core::config::UpstreamConfig;
use crate::core::error::{AppError, Result};
use crate::core::logging::get_request_id;
use axum::{
    body::Body,
    extract::{Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::Response,
};
use std::sync::Arc;
use std::time::Duration;

/// Headers that describe a single connection and are never forwarded.
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Shared state for the upstream proxy handler.
pub struct ProxyState {
    pub http_client: reqwest::Client,
    pub upstream_url: String,
}

impl ProxyState {
    pub fn new(config: &UpstreamConfig) -> anyhow::Result<Self> {
        Ok(Self {
            http_client: create_http_client(config)?,
            upstream_url: config.url.trim_end_matches('/').to_string(),
        })
    }
}

/// Create HTTP client with connection pooling
pub fn create_http_client(config: &UpstreamConfig) -> anyhow::Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .danger_accept_invalid_certs(!config.verify_ssl)
        .timeout(Duration::from_secs(config.timeout_secs))
        .pool_max_idle_per_host(100)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(60))
        .build()?;
    Ok(client)
}

fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP_HEADERS
        .iter()
        .any(|h| h.eq_ignore_ascii_case(name))
}

/// Build the upstream URL for a request path and query.
pub fn upstream_url(base: &str, path_and_query: &str) -> String {
    if path_and_query.starts_with('/') {
        format!("{base}{path_and_query}")
    } else {
        format!("{base}/{path_and_query}")
    }
}

fn forwardable_request_headers(headers: &HeaderMap) -> reqwest::header::HeaderMap {
    let mut forwarded = reqwest::header::HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if is_hop_by_hop(name.as_str()) || name.as_str().eq_ignore_ascii_case("host") {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            reqwest::header::HeaderName::from_bytes(name.as_str().as_bytes()),
            reqwest::header::HeaderValue::from_bytes(value.as_bytes()),
        ) {
            forwarded.append(name, value);
        }
    }
    forwarded
}

fn forwardable_response_headers(headers: &reqwest::header::HeaderMap) -> HeaderMap {
    let mut forwarded = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if is_hop_by_hop(name.as_str()) {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_str().as_bytes()),
            HeaderValue::from_bytes(value.as_bytes()),
        ) {
            forwarded.append(name, value);
        }
    }
    forwarded
}

/// Forward the request to the upstream and stream its response back.
pub async fn proxy_handler(
    State(state): State<Arc<ProxyState>>,
    request: Request,
) -> Result<Response> {
    let (parts, body) = request.into_parts();

    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let url = upstream_url(&state.upstream_url, path_and_query);

    let method = reqwest::Method::from_bytes(parts.method.as_str().as_bytes())
        .map_err(|e| AppError::Internal(format!("unsupported method: {e}")))?;

    tracing::debug!(
        request_id = %get_request_id(),
        method = %parts.method,
        url = %url,
        "Forwarding request upstream"
    );

    let upstream_response = state
        .http_client
        .request(method, &url)
        .headers(forwardable_request_headers(&parts.headers))
        .body(reqwest::Body::wrap_stream(body.into_data_stream()))
        .send()
        .await
        .map_err(|e| {
            tracing::warn!(
                request_id = %get_request_id(),
                url = %url,
                error = %e,
                "Upstream request failed"
            );
            AppError::Upstream(e)
        })?;

    let status = StatusCode::from_u16(upstream_response.status().as_u16())
        .unwrap_or(StatusCode::BAD_GATEWAY);
    let headers = forwardable_response_headers(upstream_response.headers());

    let mut response = Response::new(Body::from_stream(upstream_response.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_url() {
        assert_eq!(
            upstream_url("http://backend:9000", "/v1/items?limit=5"),
            "http://backend:9000/v1/items?limit=5"
        );
        assert_eq!(upstream_url("http://backend", "items"), "http://backend/items");
    }

    #[test]
    fn test_proxy_state_trims_trailing_slash() {
        let state = ProxyState::new(&UpstreamConfig {
            url: "http://backend:9000/".to_string(),
            ..UpstreamConfig::default()
        })
        .unwrap();
        assert_eq!(state.upstream_url, "http://backend:9000");
    }

    #[test]
    fn test_hop_by_hop_headers_not_forwarded() {
        let mut headers = HeaderMap::new();
        headers.insert("connection", HeaderValue::from_static("keep-alive"));
        headers.insert("transfer-encoding", HeaderValue::from_static("chunked"));
        headers.insert("host", HeaderValue::from_static("proxy.local"));
        headers.insert("content-type", HeaderValue::from_static("application/json"));
        headers.insert("content-length", HeaderValue::from_static("12"));

        let forwarded = forwardable_request_headers(&headers);
        assert!(forwarded.get("connection").is_none());
        assert!(forwarded.get("transfer-encoding").is_none());
        assert!(forwarded.get("host").is_none());
        assert_eq!(forwarded.get("content-type").unwrap(), "application/json");
        assert_eq!(forwarded.get("content-length").unwrap(), "12");
    }

    #[test]
    fn test_response_headers_filtered() {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("keep-alive", "timeout=5".parse().unwrap());
        headers.insert("x-upstream", "yes".parse().unwrap());

        let forwarded = forwardable_response_headers(&headers);
        assert!(forwarded.get("keep-alive").is_none());
        assert_eq!(forwarded.get("x-upstream").unwrap(), "yes");
    }
}
