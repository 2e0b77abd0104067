//! # Vigil Core
//!
//! Core types shared by the Vigil request instrumentation pipeline.
//!
//! - [`RequestContext`] - Per-request context carrying the correlation ID and start time
//! - [`RequestId`] - UUID v4 correlation identifier
//! - [`HandlerError`] - Failure signalled by a request handler
//! - [`ErrorClass`] - How the error trap treats a failure

#![doc(html_root_url = "https://docs.rs/vigil-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod context;
mod error;

pub use context::{RequestContext, RequestId};
pub use error::{BoxError, ErrorClass, HandlerError, HandlerResult, FALLBACK_ERROR_MESSAGE};
