//! Metrics recording stage.
//!
//! The last stage to see every request. It computes the request duration
//! from the context's start time and records one histogram observation and
//! one counter increment in the [`MetricsRegistry`].
//!
//! # Metrics Emitted
//!
//! - `http_request_duration_ms{route}` - request duration in milliseconds
//! - `http_request_counter{route, method, status}` - completed requests
//!
//! The `route` label is the matched route pattern when the router resolved
//! one, otherwise the raw request path.

use crate::context::MiddlewareContext;
use crate::middleware::ResponseObserver;
use crate::pipeline::Stage;
use crate::types::Response;
use std::sync::Arc;
use vigil_telemetry::MetricsRegistry;

/// Observation recorded for one completed request, stored in the context.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricObservation {
    /// Route label.
    pub route: String,
    /// HTTP method.
    pub method: String,
    /// Final response status.
    pub status_code: u16,
    /// Request duration in milliseconds.
    pub duration_ms: f64,
}

/// Records request duration and count for every finalized response.
#[derive(Debug, Clone)]
pub struct MetricsRecorder {
    registry: Arc<MetricsRegistry>,
}

impl MetricsRecorder {
    /// Creates a recorder writing into `registry`.
    #[must_use]
    pub const fn new(registry: Arc<MetricsRegistry>) -> Self {
        Self { registry }
    }

    /// Returns the registry this recorder writes into.
    #[must_use]
    pub fn registry(&self) -> &MetricsRegistry {
        &self.registry
    }

    fn record(&self, ctx: &mut MiddlewareContext, status_code: u16, duration_ms: f64) {
        let correlation_id = ctx.request_id();
        let route = ctx.route_label().to_owned();
        let method = ctx.method().as_str().to_owned();

        if duration_ms.is_finite() && duration_ms >= 0.0 {
            self.registry.observe_duration(&route, duration_ms);
        } else {
            tracing::warn!(
                correlation_id = %correlation_id,
                route = %route,
                duration_ms,
                "invalid request duration, skipping histogram"
            );
        }
        self.registry.increment_count(&route, &method, status_code);

        tracing::debug!(
            correlation_id = %correlation_id,
            route = %route,
            method = %method,
            status = status_code,
            duration_ms,
            "request completed"
        );

        ctx.set_extension(MetricObservation {
            route,
            method,
            status_code,
            duration_ms,
        });
    }
}

impl ResponseObserver for MetricsRecorder {
    fn name(&self) -> &'static str {
        Stage::MetricsRecorder.name()
    }

    fn observe(&self, ctx: &mut MiddlewareContext, response: &Response) {
        let duration_ms = ctx.request_context().elapsed_ms();
        self.record(ctx, response.status().as_u16(), duration_ms);
    }
}
