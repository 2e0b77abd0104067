//! # Vigil Middleware
//!
//! The per-request instrumentation pipeline.
//!
//! Every request gets a correlation ID and an ingress log record before any
//! handler runs. Handler failures are trapped and turned into safe
//! responses. Every finalized response is counted and timed in the metrics
//! registry.
//!
//! ## Pipeline Stages
//!
//! ```text
//! Request → ContextInit → [Middleware…] → Handler
//!                                            ↓
//! Response ← MetricsRecorder ← ErrorTrap (on failure only)
//! ```
//!
//! | Stage | Type | Purpose |
//! |-------|------|---------|
//! | 1 | [`ContextInitializer`] | Correlation ID, start time, ingress log |
//! | 2 | [`Middleware`] chain + handler | Application logic |
//! | 3 | [`ErrorTrap`] | Failure disposition, generic 500 body |
//! | 4 | [`MetricsRecorder`] | Duration histogram and request counter |
//!
//! ## Example
//!
//! ```
//! use vigil_middleware::pipeline::Stage;
//!
//! let stages = Stage::all();
//! assert_eq!(stages[0].name(), "context_init");
//! assert_eq!(stages[3].name(), "metrics_recorder");
//! ```

#![doc(html_root_url = "https://docs.rs/vigil-middleware/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod context;
pub mod failure;
pub mod middleware;
pub mod pipeline;
pub mod stages;
pub mod types;

pub use context::MiddlewareContext;
pub use failure::{HandlerFailure, Outcome};
pub use middleware::{BoxFuture, ErrorHandler, FnMiddleware, Middleware, Next, ResponseObserver};
pub use pipeline::{Pipeline, PipelineBuilder, Stage};
pub use stages::{ContextInitializer, ErrorTrap, MetricObservation, MetricsRecorder, TrapDisposition};
pub use types::{ClientAddr, MatchedRoute, Request, Response, ResponseExt, CORRELATION_ID_HEADER};
