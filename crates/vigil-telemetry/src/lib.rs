//! Logging and Prometheus metrics for Vigil services.
//!
//! - **Metrics**: a [`MetricsRegistry`] holding the request duration
//!   histogram and request counter, rendered in Prometheus text format
//! - **Logging**: structured JSON (or pretty) logs via `tracing-subscriber`
//!
//! # Standard Metrics
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `http_request_duration_ms` | Histogram | `route` | Duration of HTTP requests in ms |
//! | `http_request_counter` | Counter | `route`, `method`, `status` | Number of requests for this endpoint |
//!
//! # Example
//!
//! ```rust,ignore
//! use vigil_telemetry::{init_telemetry, TelemetryConfig};
//!
//! let registry = init_telemetry(&TelemetryConfig::builder().service_name("orders").build())?;
//! registry.increment_count("/orders/{id}", "GET", 200);
//! ```

#![doc(html_root_url = "https://docs.rs/vigil-telemetry/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;

pub use crate::config::{TelemetryConfig, TelemetryConfigBuilder};
pub use crate::error::TelemetryError;
pub use crate::logging::{init_logging, LogConfig, LogFormat};
pub use crate::metrics::{MetricsConfig, MetricsRegistry};

use std::sync::Arc;

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Initializes logging and builds the metrics registry.
///
/// Logging is set up first so that the registry and everything after it
/// can log. The returned registry is meant to be created once per process
/// and shared with every component that records metrics.
///
/// # Errors
///
/// Returns `TelemetryError` if either subsystem fails to initialize.
pub fn init_telemetry(config: &TelemetryConfig) -> TelemetryResult<Arc<MetricsRegistry>> {
    init_logging(&config.logging)?;

    let registry = MetricsRegistry::new(&config.metrics)?;

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = %config.environment,
        log_format = %config.logging.format,
        "telemetry initialized"
    );

    Ok(Arc::new(registry))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_telemetry_without_logging() {
        let config = TelemetryConfig::builder()
            .logging(LogConfig {
                enabled: false,
                ..LogConfig::default()
            })
            .build();

        let registry = init_telemetry(&config).expect("telemetry should initialize");
        registry.increment_count("/", "GET", 200);
        assert_eq!(
            registry.sample(
                crate::metrics::HTTP_REQUEST_COUNTER,
                &[("route", "/"), ("method", "GET"), ("status", "200")]
            ),
            Some(1.0)
        );
    }

    #[test]
    fn test_init_telemetry_rejects_empty_buckets() {
        let config = TelemetryConfig::builder()
            .logging(LogConfig {
                enabled: false,
                ..LogConfig::default()
            })
            .duration_buckets(&[])
            .build();

        assert!(matches!(
            init_telemetry(&config),
            Err(TelemetryError::MetricsInit(_))
        ));
    }
}
