//! # Vigil Server
//!
//! HTTP host for the Vigil instrumentation pipeline.
//!
//! This crate owns the parts of a service that sit outside the pipeline:
//!
//! - Environment configuration ([`ServerConfig`])
//! - Route matching ([`Router`])
//! - The Hyper accept loop and graceful shutdown ([`Server`])
//!
//! Every request, routed or not, goes through the same [`Pipeline`]
//! (`vigil_middleware::Pipeline`), so it is logged, trapped and counted.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use vigil_middleware::Pipeline;
//! use vigil_server::{Router, Server, ServerConfig};
//! use vigil_telemetry::{MetricsConfig, MetricsRegistry};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = Arc::new(MetricsRegistry::new(&MetricsConfig::default())?);
//!     let server = Server::builder(Pipeline::builder(registry).build())
//!         .config(ServerConfig::from_env()?)
//!         .router(Router::new())
//!         .build();
//!
//!     server.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! [`Pipeline`]: vigil_middleware::Pipeline

#![doc(html_root_url = "https://docs.rs/vigil-server/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod config;
pub mod router;
pub mod server;
pub mod shutdown;

pub use config::{ConfigError, ServerConfig, ServerConfigBuilder};
pub use router::{PathParams, RouteHandler, RouteMatch, Router};
pub use server::{Server, ServerBuilder, ServerError};
pub use shutdown::{ConnectionToken, ConnectionTracker, ShutdownSignal};
