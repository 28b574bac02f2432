//! HTTP surface of the standalone server.
//!
//! Everything outside the `/-/` prefix is forwarded to the upstream through
//! the body transform middleware.

pub mod handlers;
pub mod upstream;

pub use handlers::{health_handler, metrics_handler, HealthResponse};
pub use upstream::{create_http_client, proxy_handler, ProxyState};

use crate::core::logging::request_id_middleware;
use crate::core::middleware::{body_transform_middleware, BodyTransform};
use axum::{handler::Handler, routing::get, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Build the server router: health and metrics endpoints, plus the
/// transformed upstream proxy as fallback.
pub fn build_router(transform: Arc<BodyTransform>, proxy_state: Arc<ProxyState>) -> Router {
    let transformed_proxy = proxy_handler.layer(axum::middleware::from_fn_with_state(
        transform,
        body_transform_middleware,
    ));

    Router::new()
        .route("/-/health", get(health_handler))
        .route("/-/metrics", get(metrics_handler))
        .fallback(transformed_proxy)
        .with_state(proxy_state)
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
}
