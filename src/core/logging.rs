//! Logging utilities with request context support.
//!
//! Every request gets an id that is scoped in a task-local, echoed back in the
//! `x-request-id` response header, and attached to transform log lines.

use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};

/// Header carrying the request id in both directions.
pub static REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

tokio::task_local! {
    /// Task-local storage for the current request ID.
    ///
    /// This allows logs to include a unique request ID for tracking all logs
    /// related to a single request.
    pub static REQUEST_ID: String;
}

/// Get the current request ID from context, if set.
///
/// Returns an empty string if no request ID is set.
pub fn get_request_id() -> String {
    REQUEST_ID.try_with(|id| id.clone()).unwrap_or_default()
}

/// Generate a new unique request ID using UUID v4.
pub fn generate_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Middleware that assigns a request id (or keeps the client's), scopes it
/// for the rest of the chain, and echoes it on the response.
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(&REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(generate_request_id);

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        request
            .headers_mut()
            .insert(REQUEST_ID_HEADER.clone(), value.clone());
        let mut response = REQUEST_ID.scope(request_id, next.run(request)).await;
        response.headers_mut().insert(REQUEST_ID_HEADER.clone(), value);
        response
    } else {
        REQUEST_ID.scope(request_id, next.run(request)).await
    }
}
