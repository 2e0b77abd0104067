//! Request context types.
//!
//! The [`RequestContext`] is created once per inbound request, before any
//! handler runs, and carries the correlation identifier and start time
//! through the pipeline and into handlers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use uuid::{Uuid, Version};

/// A correlation identifier for one request, using UUID v4.
///
/// The identifier is 122 bits of randomness in the standard version-4
/// layout. It appears in every log record produced for the request and in
/// the `x-correlation-id` response header.
///
/// # Example
///
/// ```
/// use vigil_core::RequestId;
///
/// let id = RequestId::new();
/// assert_eq!(id.as_uuid().get_version_num(), 4);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Creates a new random request ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parses a request ID supplied by an upstream caller.
    ///
    /// Only well-formed version-4 UUIDs are accepted, so an adopted ID
    /// is indistinguishable from a generated one.
    #[must_use]
    pub fn parse_v4(value: &str) -> Option<Self> {
        let uuid = Uuid::parse_str(value.trim()).ok()?;
        (uuid.get_version() == Some(Version::Random)).then_some(Self(uuid))
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<RequestId> for Uuid {
    fn from(id: RequestId) -> Self {
        id.0
    }
}

/// Per-request context created when a request enters the pipeline.
///
/// The context holds two readings of the same moment:
///
/// - a monotonic [`Instant`], used to compute the request duration
/// - a wall-clock timestamp, used as the `timestamp` of the ingress log
///
/// Neither the ID nor the start time can be changed after construction.
///
/// # Example
///
/// ```
/// use vigil_core::RequestContext;
///
/// let ctx = RequestContext::new();
/// println!("Processing request: {}", ctx.request_id());
/// assert!(ctx.elapsed_ms() >= 0.0);
/// ```
#[derive(Debug, Clone)]
pub struct RequestContext {
    request_id: RequestId,
    started_at: Instant,
    received_at: DateTime<Utc>,
}

impl RequestContext {
    /// Creates a context with a fresh request ID, starting now.
    #[must_use]
    pub fn new() -> Self {
        Self::with_request_id(RequestId::new())
    }

    /// Creates a context for an already known request ID, starting now.
    #[must_use]
    pub fn with_request_id(request_id: RequestId) -> Self {
        Self {
            request_id,
            started_at: Instant::now(),
            received_at: Utc::now(),
        }
    }

    /// Returns the request ID.
    #[must_use]
    pub const fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Returns the monotonic start time.
    #[must_use]
    pub const fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Returns the wall-clock time the request was received.
    #[must_use]
    pub const fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    /// Returns the elapsed time since the request started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Returns the elapsed time in fractional milliseconds.
    ///
    /// Reads the monotonic clock on every call, so the value never
    /// decreases between calls.
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed().as_secs_f64() * 1000.0
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}
