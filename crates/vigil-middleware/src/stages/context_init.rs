//! Context initialization stage.
//!
//! Runs first for every request, before any middleware or handler. It
//! creates the [`RequestContext`] (correlation ID and start time), copies
//! the request facts into a [`MiddlewareContext`] and emits the ingress log
//! record.
//!
//! ## Correlation ID Sources
//!
//! 1. **x-correlation-id header**: used only when trusted and a valid UUID v4
//! 2. **Generated UUID v4**: otherwise
//!
//! The pipeline echoes the ID back in the `x-correlation-id` response header.

use crate::context::MiddlewareContext;
use crate::pipeline::Stage;
use crate::types::{ClientAddr, MatchedRoute, Request, CORRELATION_ID_HEADER};
use chrono::SecondsFormat;
use vigil_core::{RequestContext, RequestId};

/// Creates the per-request context and logs the inbound request.
///
/// Initialization cannot fail: a missing client address is logged as
/// `unknown`, and an untrusted or malformed incoming ID is replaced.
///
/// # Example
///
/// ```
/// use bytes::Bytes;
/// use http_body_util::Full;
/// use vigil_middleware::stages::ContextInitializer;
///
/// let request = http::Request::get("/health").body(Full::new(Bytes::new())).unwrap();
/// let ctx = ContextInitializer::new().initialize(&request);
/// assert_eq!(ctx.url(), "/health");
/// ```
#[derive(Debug, Clone, Default)]
pub struct ContextInitializer {
    /// Whether to adopt a correlation ID sent by the caller.
    ///
    /// Should stay `false` for traffic arriving from outside the trust
    /// boundary.
    trust_incoming: bool,
}

impl ContextInitializer {
    /// Creates an initializer that always generates a fresh ID.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an initializer that adopts a valid incoming
    /// `x-correlation-id` header.
    #[must_use]
    pub fn trust_incoming() -> Self {
        Self {
            trust_incoming: true,
        }
    }

    /// Returns the stage name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        Stage::ContextInit.name()
    }

    fn incoming_request_id(&self, request: &Request) -> Option<RequestId> {
        if !self.trust_incoming {
            return None;
        }

        request
            .headers()
            .get(CORRELATION_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(RequestId::parse_v4)
    }

    /// Builds the context for `request` and emits the ingress log record.
    #[must_use]
    pub fn initialize(&self, request: &Request) -> MiddlewareContext {
        let request_context = match self.incoming_request_id(request) {
            Some(id) => RequestContext::with_request_id(id),
            None => RequestContext::new(),
        };

        let mut ctx =
            MiddlewareContext::new(request_context, request.method().clone(), request.uri());
        if let Some(ClientAddr(addr)) = request.extensions().get::<ClientAddr>() {
            ctx = ctx.with_client_addr(*addr);
        }
        if let Some(route) = request.extensions().get::<MatchedRoute>() {
            ctx.set_matched_route(route.as_str());
        }

        let client_address = ctx
            .client_addr()
            .map_or_else(|| "unknown".to_string(), |addr| addr.ip().to_string());

        tracing::info!(
            timestamp = %ctx
                .request_context()
                .received_at()
                .to_rfc3339_opts(SecondsFormat::Millis, true),
            correlation_id = %ctx.request_id(),
            method = %ctx.method(),
            url = %ctx.url(),
            client_address = %client_address,
            "request received"
        );

        ctx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::Request as HttpRequest;
    use http_body_util::Full;
    use std::net::SocketAddr;
    use uuid::Version;
    use vigil_telemetry::logging::capture::CapturedLogs;
    use vigil_telemetry::logging::fields;

    fn request_with_id(id: &str) -> Request {
        HttpRequest::builder()
            .uri("/test")
            .header(CORRELATION_ID_HEADER, id)
            .body(Full::new(Bytes::new()))
            .unwrap()
    }

    #[test]
    fn test_generates_v4_id() {
        let request = HttpRequest::get("/test").body(Full::new(Bytes::new())).unwrap();
        let ctx = ContextInitializer::new().initialize(&request);
        assert_eq!(ctx.request_id().as_uuid().get_version(), Some(Version::Random));
    }

    #[test]
    fn test_ignores_incoming_id_when_not_trusted() {
        let incoming = "3f2b8c1e-9d4a-4c6b-8e2f-1a2b3c4d5e6f";
        let ctx = ContextInitializer::new().initialize(&request_with_id(incoming));
        assert_ne!(ctx.request_id().to_string(), incoming);
    }

    #[test]
    fn test_uses_incoming_v4_id_when_trusted() {
        let incoming = "3f2b8c1e-9d4a-4c6b-8e2f-1a2b3c4d5e6f";
        let ctx = ContextInitializer::trust_incoming().initialize(&request_with_id(incoming));
        assert_eq!(ctx.request_id().to_string(), incoming);
    }

    #[test]
    fn test_rejects_non_v4_incoming_id() {
        // Version 7 layout
        let incoming = "01234567-89ab-7def-8123-456789abcdef";
        let ctx = ContextInitializer::trust_incoming().initialize(&request_with_id(incoming));
        assert_ne!(ctx.request_id().to_string(), incoming);
        assert_eq!(ctx.request_id().as_uuid().get_version(), Some(Version::Random));

        let ctx = ContextInitializer::trust_incoming().initialize(&request_with_id("garbage"));
        assert_eq!(ctx.request_id().as_uuid().get_version(), Some(Version::Random));
    }

    #[test]
    fn test_copies_request_extensions() {
        let addr: SocketAddr = "192.168.1.20:40000".parse().unwrap();
        let mut request = HttpRequest::post("/users/7?verbose=1")
            .body(Full::new(Bytes::new()))
            .unwrap();
        request.extensions_mut().insert(ClientAddr(addr));
        request
            .extensions_mut()
            .insert(MatchedRoute("/users/{id}".to_string()));

        let ctx = ContextInitializer::new().initialize(&request);
        assert_eq!(ctx.client_addr(), Some(addr));
        assert_eq!(ctx.matched_route(), Some("/users/{id}"));
        assert_eq!(ctx.route_label(), "/users/{id}");
        assert_eq!(ctx.url(), "/users/7?verbose=1");
    }

    #[test]
    fn test_emits_ingress_log() {
        let logs = CapturedLogs::new();
        let addr: SocketAddr = "127.0.0.1:5555".parse().unwrap();
        let mut request = HttpRequest::get("/health").body(Full::new(Bytes::new())).unwrap();
        request.extensions_mut().insert(ClientAddr(addr));

        let ctx = {
            let _guard = tracing::subscriber::set_default(logs.subscriber());
            ContextInitializer::new().initialize(&request)
        };

        let event = logs.find("request received").expect("ingress log emitted");
        assert_eq!(event.level, tracing::Level::INFO);
        let id = ctx.request_id().to_string();
        assert_eq!(event.field(fields::CORRELATION_ID), Some(id.as_str()));
        assert_eq!(event.field(fields::METHOD), Some("GET"));
        assert_eq!(event.field(fields::URL), Some("/health"));
        assert_eq!(event.field(fields::CLIENT_ADDRESS), Some("127.0.0.1"));
        assert!(event.field(fields::TIMESTAMP).is_some());
    }

    #[test]
    fn test_unknown_client_address() {
        let logs = CapturedLogs::new();
        let request = HttpRequest::get("/").body(Full::new(Bytes::new())).unwrap();
        {
            let _guard = tracing::subscriber::set_default(logs.subscriber());
            let _ = ContextInitializer::new().initialize(&request);
        }

        let event = logs.find("request received").unwrap();
        assert_eq!(event.field(fields::CLIENT_ADDRESS), Some("unknown"));
    }

    #[test]
    fn test_stage_name() {
        assert_eq!(ContextInitializer::new().name(), "context_init");
    }
}
