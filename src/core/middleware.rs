//! HTTP middleware that rewrites request or response bodies with a Lua script.
//!
//! Mount it with [`axum::middleware::from_fn_with_state`]:
//!
//! ```no_run
//! use std::sync::Arc;
//! use axum::{routing::post, Router};
//! use body_transform::core::config::{TransformConfig, TransformMode};
//! use body_transform::core::middleware::{body_transform_middleware, BodyTransform};
//!
//! let config = TransformConfig::inline(
//!     "function transform(body) return string.upper(body) end",
//!     TransformMode::Response,
//! );
//! let transform = Arc::new(BodyTransform::provision(&config).unwrap());
//!
//! let app: Router = Router::new()
//!     .route("/echo", post(|body: String| async move { body }))
//!     .layer(axum::middleware::from_fn_with_state(transform, body_transform_middleware));
//! ```

use crate::core::config::{TransformConfig, TransformMode};
use crate::core::error::{AppError, ErrorResponse, Result};
use crate::core::logging::get_request_id;
use crate::transformer::{CaptureProxy, TransformInvoker};
use axum::{
    body::Body,
    extract::{Request, State},
    http::{
        header::{CONTENT_LENGTH, TRANSFER_ENCODING},
        HeaderValue,
    },
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

/// Identifier used in logs for this middleware.
pub const MODULE_ID: &str = "http.handlers.body_transform";

/// Provisioned body transform: the validated script plus the mode it runs in.
///
/// Immutable once provisioned and shared by every request.
pub struct BodyTransform {
    invoker: Arc<TransformInvoker>,
    max_body_bytes: usize,
    max_response_bytes: usize,
}

impl BodyTransform {
    /// Resolve and compile the configured script.
    ///
    /// A script that fails to load is a configuration error: the middleware
    /// must not become active.
    pub fn provision(config: &TransformConfig) -> Result<Self> {
        let script = config.resolve_script()?;
        let invoker = TransformInvoker::new(&script, config.transform_type, &config.engine)
            .map_err(|e| {
                AppError::Config(anyhow::Error::new(e).context("Failed to provision body transform"))
            })?;

        tracing::info!(
            module = MODULE_ID,
            mode = %config.transform_type,
            lifecycle = ?config.engine.lifecycle,
            max_body_bytes = config.max_body_bytes,
            max_response_bytes = config.max_response_bytes,
            "Body transform provisioned"
        );

        Ok(Self {
            invoker: Arc::new(invoker),
            max_body_bytes: config.max_body_bytes,
            max_response_bytes: config.max_response_bytes,
        })
    }

    pub fn mode(&self) -> TransformMode {
        self.invoker.mode()
    }

    pub fn invoker(&self) -> &Arc<TransformInvoker> {
        &self.invoker
    }

    /// Run one request through the configured mode.
    pub async fn handle(&self, request: Request, next: Next) -> Result<Response> {
        match self.mode() {
            TransformMode::Request => self.transform_request(request, next).await,
            TransformMode::Response => self.transform_response(request, next).await,
        }
    }

    async fn transform_request(&self, request: Request, next: Next) -> Result<Response> {
        let (mut parts, body) = request.into_parts();

        let original = axum::body::to_bytes(body, self.max_body_bytes)
            .await
            .map_err(|e| {
                tracing::warn!(
                    module = MODULE_ID,
                    request_id = %get_request_id(),
                    error = %e,
                    "Failed to read request body"
                );
                AppError::BodyRead(e.to_string())
            })?;

        let original_len = original.len();
        let transformed = self.run_transform(original).await?;

        tracing::debug!(
            module = MODULE_ID,
            request_id = %get_request_id(),
            original_len,
            transformed_len = transformed.len(),
            "Request body transformed"
        );

        parts.headers.remove(TRANSFER_ENCODING);
        parts
            .headers
            .insert(CONTENT_LENGTH, HeaderValue::from(transformed.len()));

        let request = Request::from_parts(parts, Body::from(transformed));
        Ok(next.run(request).await)
    }

    async fn transform_response(&self, request: Request, next: Next) -> Result<Response> {
        let response = next.run(request).await;

        // The wrapped handler failed: its error goes out as is.
        if response.extensions().get::<ErrorResponse>().is_some() {
            tracing::warn!(
                module = MODULE_ID,
                request_id = %get_request_id(),
                status = response.status().as_u16(),
                "Downstream handler failed, skipping transform"
            );
            return Ok(response);
        }

        let mut capture = CaptureProxy::capture(response, self.max_response_bytes)
            .await
            .map_err(|e| {
                tracing::warn!(
                    module = MODULE_ID,
                    request_id = %get_request_id(),
                    error = %e,
                    "Downstream response failed, skipping transform"
                );
                AppError::Downstream(e.to_string())
            })?;

        let original = capture.take_body();
        let original_len = original.len();
        let transformed = self.run_transform(original).await?;

        tracing::debug!(
            module = MODULE_ID,
            request_id = %get_request_id(),
            status = capture.status().as_u16(),
            original_len,
            transformed_len = transformed.len(),
            "Response body transformed"
        );

        Ok(capture.finish(transformed))
    }

    async fn run_transform(&self, payload: bytes::Bytes) -> Result<bytes::Bytes> {
        self.invoker
            .transform_blocking_task(payload)
            .await
            .map_err(|e| {
                tracing::warn!(
                    module = MODULE_ID,
                    request_id = %get_request_id(),
                    mode = %self.mode(),
                    error = %e,
                    "Body transform failed"
                );
                e
            })
    }
}

/// Axum middleware entry point for a provisioned [`BodyTransform`].
pub async fn body_transform_middleware(
    State(transform): State<Arc<BodyTransform>>,
    request: Request,
    next: Next,
) -> Result<Response> {
    transform.handle(request, next).await
}
