//! Common types used throughout the middleware pipeline.

use bytes::Bytes;
use http::{header, HeaderValue, StatusCode};
use http_body_util::Full;
use std::net::SocketAddr;

/// The HTTP request type used in the middleware pipeline.
///
/// This is a standard `http::Request` with a `Full<Bytes>` body.
pub type Request = http::Request<Full<Bytes>>;

/// The HTTP response type used in the middleware pipeline.
///
/// This is a standard `http::Response` with a `Full<Bytes>` body.
pub type Response = http::Response<Full<Bytes>>;

/// Header carrying the correlation identifier on responses.
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

/// Peer address of the client, inserted as a request extension by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientAddr(pub SocketAddr);

/// Route pattern the request matched, inserted as a request extension by the
/// router (e.g. `/users/{id}`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MatchedRoute(pub String);

impl MatchedRoute {
    /// Returns the pattern.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Extension trait for building responses without panicking.
pub trait ResponseExt {
    /// Creates a response with the given status and an empty body.
    fn empty(status: StatusCode) -> Response;

    /// Creates a JSON response from a serializable value.
    ///
    /// Falls back to an empty body with the same status if the value cannot
    /// be serialized.
    fn json(status: StatusCode, body: &serde_json::Value) -> Response;
}

impl ResponseExt for Response {
    fn empty(status: StatusCode) -> Response {
        let mut response = http::Response::new(Full::new(Bytes::new()));
        *response.status_mut() = status;
        response
    }

    fn json(status: StatusCode, body: &serde_json::Value) -> Response {
        let Ok(bytes) = serde_json::to_vec(body) else {
            return Self::empty(status);
        };

        let mut response = http::Response::new(Full::new(Bytes::from(bytes)));
        *response.status_mut() = status;
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        response
    }
}
