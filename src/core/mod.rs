//! Core functionality shared by the middleware and the server.
//!
//! - Configuration management
//! - Error handling
//! - Request-scoped logging context
//! - Metrics collection
//! - The body transform middleware itself

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod middleware;

// Re-export commonly used types
pub use config::{AppConfig, ServerConfig, TransformConfig, TransformMode, UpstreamConfig};
pub use error::{AppError, ErrorResponse, Result};
pub use logging::{generate_request_id, get_request_id, request_id_middleware, REQUEST_ID};
pub use metrics::{get_metrics, init_metrics, Metrics};
pub use middleware::{body_transform_middleware, BodyTransform, MODULE_ID};
