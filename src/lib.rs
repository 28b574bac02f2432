//! Body Transform - HTTP middleware that rewrites message bodies with Lua
//!
//! A user-supplied Lua script defines a global function `transform(body)`
//! that receives the full body as a string and returns the replacement body.
//! The middleware runs in one of two modes:
//!
//! - **request**: the inbound request body is transformed before the
//!   downstream handler sees it
//! - **response**: the downstream handler's output is captured, transformed,
//!   and only then sent to the client
//!
//! Every call runs on a Lua runtime that no other in-flight call can touch.
//!
//! # Architecture
//!
//! - [`scripting`]: sandboxed Lua runtimes and their lifecycle
//! - [`transformer`]: transform invocation and response capture
//! - [`core`]: config, errors, logging, metrics and the axum middleware
//! - [`api`]: the standalone reverse-proxy server
//!
//! # Configuration
//!
//! The server reads `config.yaml` (or `CONFIG_PATH`), with
//! `BODY_TRANSFORM__*` environment overrides. `HOST` and `PORT` override the
//! bind address.

pub mod api;
pub mod core;
pub mod scripting;
pub mod transformer;

// Re-export commonly used types for convenience
pub use api::build_router;
pub use core::{
    body_transform_middleware, AppConfig, AppError, BodyTransform, Result, TransformConfig,
    TransformMode,
};
pub use scripting::{EngineConfig, EngineLifecycle, ScriptError};
pub use transformer::{CaptureProxy, TransformInvoker, TRANSFORM_ENTRY_POINT};
