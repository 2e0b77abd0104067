//! HTTP server implementation.
//!
//! Built on Hyper and Tokio. For every request the server:
//!
//! 1. Collects the body, up to the configured size limit
//! 2. Attaches the peer address ([`ClientAddr`]) and, if a route matched,
//!    the route pattern ([`MatchedRoute`]) and [`PathParams`](crate::PathParams)
//! 3. Runs the [`Pipeline`] on its own task
//!
//! Running the pipeline on a separate task means a client that disconnects
//! mid-request cannot cancel the error trap or the metrics recorder.
//!
//! # Example
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

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};

use vigil_core::HandlerError;
use vigil_middleware::{
    BoxFuture, ClientAddr, ErrorTrap, HandlerFailure, MatchedRoute, Outcome, Pipeline, Request,
    Response,
};

use crate::config::{ConfigError, ServerConfig};
use crate::router::{RouteHandler, Router};
use crate::shutdown::{ConnectionTracker, ShutdownSignal};

/// Server error types.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to the configured address.
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        /// Address that could not be bound.
        addr: SocketAddr,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// I/O error during server operation.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// The Vigil HTTP server.
pub struct Server {
    config: ServerConfig,
    router: Router,
    pipeline: Pipeline,
}

impl Server {
    /// Creates a new server builder running every request through `pipeline`.
    #[must_use]
    pub fn builder(pipeline: Pipeline) -> ServerBuilder {
        ServerBuilder::new(pipeline)
    }

    /// Returns the server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Returns the router.
    #[must_use]
    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Binds a listener to the configured address.
    pub async fn bind(&self) -> Result<TcpListener, ServerError> {
        let addr = self.config.socket_addr();
        TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })
    }

    /// Runs the server until SIGTERM or SIGINT.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_with_shutdown(ShutdownSignal::with_os_signals()).await
    }

    /// Runs the server until `shutdown` is triggered.
    pub async fn run_with_shutdown(self, shutdown: ShutdownSignal) -> Result<(), ServerError> {
        let listener = self.bind().await?;
        self.serve(listener, shutdown).await
    }

    /// Serves connections from an already-bound listener.
    ///
    /// After `shutdown` fires no new connections are accepted; open
    /// connections finish their current request, bounded by the configured
    /// shutdown timeout.
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: ShutdownSignal,
    ) -> Result<(), ServerError> {
        let local_addr = listener.local_addr()?;
        tracing::info!(address = %local_addr, "server listening");

        let server = Arc::new(self);
        let tracker = ConnectionTracker::new();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, remote_addr)) => {
                            let server = Arc::clone(&server);
                            let token = tracker.acquire();
                            let shutdown = shutdown.clone();

                            tokio::spawn(async move {
                                if let Err(e) = server.handle_connection(stream, remote_addr, shutdown).await {
                                    tracing::debug!(client_address = %remote_addr, error = %e, "connection error");
                                }
                                drop(token);
                            });
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "failed to accept connection");
                        }
                    }
                }

                () = shutdown.recv() => {
                    tracing::info!("shutdown signal received, no longer accepting connections");
                    break;
                }
            }
        }
        drop(listener);

        let timeout = server.config.shutdown_timeout();
        tracing::info!(
            active_connections = tracker.active_connections(),
            timeout_secs = timeout.as_secs(),
            "draining connections"
        );
        if tokio::time::timeout(timeout, tracker.wait_idle()).await.is_err() {
            tracing::warn!(
                active_connections = tracker.active_connections(),
                "shutdown timeout reached with connections still open"
            );
        }

        tracing::info!("server stopped");
        Ok(())
    }

    async fn handle_connection(
        self: Arc<Self>,
        stream: TcpStream,
        remote_addr: SocketAddr,
        shutdown: ShutdownSignal,
    ) -> Result<(), hyper::Error> {
        let io = TokioIo::new(stream);
        let service = service_fn(move |req: http::Request<Incoming>| {
            Arc::clone(&self).handle_request(req, remote_addr)
        });

        let mut conn = std::pin::pin!(http1::Builder::new().serve_connection(io, service));
        let mut draining = false;
        loop {
            tokio::select! {
                result = conn.as_mut() => return result,
                () = shutdown.recv(), if !draining => {
                    draining = true;
                    conn.as_mut().graceful_shutdown();
                }
            }
        }
    }

    async fn handle_request(
        self: Arc<Self>,
        req: http::Request<Incoming>,
        remote_addr: SocketAddr,
    ) -> Result<Response, Infallible> {
        let (parts, body) = req.into_parts();
        let limit = self.config.max_body_size();
        let (body, read_error) = match Limited::new(body, limit).collect().await {
            Ok(collected) => (collected.to_bytes(), None),
            Err(e) => (Bytes::new(), Some(e)),
        };

        let mut request = Request::from_parts(parts, Full::new(body));
        request.extensions_mut().insert(ClientAddr(remote_addr));

        let route = self
            .router
            .match_route(request.method(), request.uri().path());
        let handler = match route {
            Some(route) => {
                let (pattern, params, handler) = route.into_parts();
                request.extensions_mut().insert(MatchedRoute(pattern));
                request.extensions_mut().insert(params);
                handler
            }
            None => unrouted(request.method(), request.uri().path()),
        };
        let handler = match read_error {
            Some(e) if e.is::<LengthLimitError>() => failing(move || {
                HandlerError::with_status(
                    StatusCode::PAYLOAD_TOO_LARGE,
                    format!("request body exceeds {limit} bytes"),
                )
            }),
            Some(e) => {
                let message = format!("failed to read request body: {e}");
                failing(move || HandlerError::bad_request(message.clone()))
            }
            None => handler,
        };

        let server = Arc::clone(&self);
        let task = tokio::spawn(async move {
            server
                .pipeline
                .process(request, move |ctx, mut req| {
                    req.extensions_mut().insert(ctx.request_context().clone());
                    handler(req)
                })
                .await
        });

        Ok(task.await.unwrap_or_else(|e| {
            tracing::error!(error = %e, "request task failed");
            ErrorTrap::generic_error_response()
        }))
    }
}

/// Handler for requests no route matched. The failure carries no status,
/// so the client gets the generic 500.
fn unrouted(method: &http::Method, path: &str) -> RouteHandler {
    let message = format!("no handler for {method} {path}");
    failing(move || HandlerError::unexpected(message.clone()))
}

fn failing<F>(make_error: F) -> RouteHandler
where
    F: Fn() -> HandlerError + Send + Sync + 'static,
{
    Arc::new(move |_req: Request| -> BoxFuture<'static, Outcome> {
        let error = make_error();
        Box::pin(async move { Err(HandlerFailure::from(error)) })
    })
}

/// Builder for configuring and creating a [`Server`].
pub struct ServerBuilder {
    config: Option<ServerConfig>,
    router: Option<Router>,
    pipeline: Pipeline,
}

impl ServerBuilder {
    /// Creates a new server builder with default configuration and no routes.
    #[must_use]
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            config: None,
            router: None,
            pipeline,
        }
    }

    /// Sets the server configuration.
    #[must_use]
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Sets the router.
    #[must_use]
    pub fn router(mut self, router: Router) -> Self {
        self.router = Some(router);
        self
    }

    /// Builds the server.
    #[must_use]
    pub fn build(self) -> Server {
        Server {
            config: self.config.unwrap_or_default(),
            router: self.router.unwrap_or_default(),
            pipeline: self.pipeline,
        }
    }
}
