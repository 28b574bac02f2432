//! Body transformation core.
//!
//! ```text
//! request mode:   client ─▶ read body ─▶ [invoker] ─▶ downstream handler ─▶ client
//! response mode:  client ─▶ downstream handler ─▶ [capture] ─▶ [invoker] ─▶ client
//! ```
//!
//! - [`invoker`]: runs the script's `transform` entry point on one payload
//! - [`capture`]: buffers a downstream response until its body is transformed

pub mod capture;
pub mod invoker;

pub use capture::CaptureProxy;
pub use invoker::{TransformInvoker, TRANSFORM_ENTRY_POINT};
