//! Response capture for response-mode transformation.
//!
//! The downstream handler's status, headers and body are recorded in a
//! [`CaptureProxy`] instead of being sent to the client. Only after the body
//! has been transformed does [`CaptureProxy::finish`] assemble the response
//! that actually goes out.

use axum::{
    body::Body,
    http::{
        header::{CONTENT_LENGTH, TRANSFER_ENCODING},
        Extensions, HeaderMap, HeaderValue, StatusCode, Version,
    },
    response::Response,
};
use bytes::{Bytes, BytesMut};

/// Buffered stand-in for the client-facing response of one request.
#[derive(Debug, Default)]
pub struct CaptureProxy {
    status: StatusCode,
    version: Version,
    headers: HeaderMap,
    extensions: Extensions,
    body: BytesMut,
}

impl CaptureProxy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain a downstream response into a new capture.
    ///
    /// Fails if the response body stream errors or exceeds `limit` bytes; the
    /// partial buffer is dropped with the error.
    pub async fn capture(response: Response, limit: usize) -> Result<Self, axum::Error> {
        let (parts, body) = response.into_parts();
        let mut capture = Self {
            status: parts.status,
            version: parts.version,
            headers: parts.headers,
            extensions: parts.extensions,
            body: BytesMut::new(),
        };

        let bytes = axum::body::to_bytes(body, limit).await?;
        capture.write(&bytes);
        Ok(capture)
    }

    /// Record the status code. Nothing is sent until [`finish`](Self::finish).
    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Append to the buffered body.
    pub fn write(&mut self, bytes: &[u8]) {
        self.body.extend_from_slice(bytes);
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Header collection the downstream handler writes into.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Everything written so far.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Take the buffered body out, leaving the capture empty.
    pub fn take_body(&mut self) -> Bytes {
        self.body.split().freeze()
    }

    /// Build the client response: recorded headers with `content-length`
    /// recomputed for `transformed`, then the recorded status, then the body.
    pub fn finish(self, transformed: Bytes) -> Response {
        let mut headers = self.headers;
        headers.remove(TRANSFER_ENCODING);
        headers.insert(CONTENT_LENGTH, HeaderValue::from(transformed.len()));

        let mut response = Response::new(Body::from(transformed));
        *response.headers_mut() = headers;
        *response.status_mut() = self.status;
        *response.version_mut() = self.version;
        *response.extensions_mut() = self.extensions;
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::CONTENT_TYPE;
    use axum::response::IntoResponse;

    #[test]
    fn test_default_status_is_ok() {
        assert_eq!(CaptureProxy::new().status(), StatusCode::OK);
    }

    #[test]
    fn test_writes_are_buffered() {
        let mut capture = CaptureProxy::new();
        capture.write(b"not ");
        capture.write(b"found");
        capture.set_status(StatusCode::NOT_FOUND);
        assert_eq!(capture.body(), b"not found");
        assert_eq!(capture.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_take_body_empties_buffer() {
        let mut capture = CaptureProxy::new();
        capture.write(b"abc");
        assert_eq!(&capture.take_body()[..], b"abc");
        assert!(capture.body().is_empty());
    }

    #[tokio::test]
    async fn test_capture_records_downstream_response() {
        let downstream = (
            StatusCode::NOT_FOUND,
            [(CONTENT_TYPE, "text/plain"), (CONTENT_LENGTH, "9")],
            "not found",
        )
            .into_response();

        let capture = CaptureProxy::capture(downstream, 1024).await.unwrap();
        assert_eq!(capture.status(), StatusCode::NOT_FOUND);
        assert_eq!(capture.headers()[CONTENT_TYPE], "text/plain");
        assert_eq!(capture.body(), b"not found");
    }

    #[tokio::test]
    async fn test_finish_recomputes_content_length() {
        let mut capture = CaptureProxy::new();
        capture.set_status(StatusCode::CREATED);
        capture
            .headers_mut()
            .insert(CONTENT_LENGTH, HeaderValue::from_static("2"));
        capture
            .headers_mut()
            .insert(TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        capture
            .headers_mut()
            .insert("x-custom", HeaderValue::from_static("kept"));
        capture.write(b"hi");

        let response = capture.finish(Bytes::from_static(b"hello world"));
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()[CONTENT_LENGTH], "11");
        assert_eq!(response.headers()["x-custom"], "kept");
        assert!(response.headers().get(TRANSFER_ENCODING).is_none());

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"hello world");
    }

    #[tokio::test]
    async fn test_capture_fails_on_body_error() {
        let stream = futures::stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(std::io::Error::new(std::io::ErrorKind::Other, "reset")),
        ]);
        let downstream = Response::new(Body::from_stream(stream));
        assert!(CaptureProxy::capture(downstream, 1024).await.is_err());
    }

    #[tokio::test]
    async fn test_capture_rejects_body_over_limit() {
        let downstream = Response::new(Body::from("0123456789"));
        assert!(CaptureProxy::capture(downstream, 4).await.is_err());
    }
}
