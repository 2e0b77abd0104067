//! Structured logging.
//!
//! Every record emitted while serving a request carries the request's
//! correlation identifier under [`fields::CORRELATION_ID`], so that all
//! records for one request can be joined downstream.
//!
//! # Example
//!
//! ```rust,ignore
//! use vigil_telemetry::logging::{LogConfig, init_logging};
//!
//! init_logging(&LogConfig::default())?;
//!
//! tracing::info!(correlation_id = %id, method = "GET", "request received");
//! ```

use crate::error::TelemetryError;
use crate::TelemetryResult;
use std::fmt;
use std::str::FromStr;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Output format of log records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// Human-readable multi-line output.
    Pretty,
}

impl FromStr for LogFormat {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" | "text" => Ok(Self::Pretty),
            other => Err(TelemetryError::InvalidConfig(format!(
                "unknown log format '{other}', expected 'json' or 'pretty'"
            ))),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => f.write_str("json"),
            Self::Pretty => f.write_str("pretty"),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Whether logging is enabled.
    pub enabled: bool,

    /// Log filter directive (e.g. "info", "vigil_middleware=debug").
    pub level: String,

    /// Output format.
    pub format: LogFormat,

    /// Whether to include file/line info.
    pub file_line_info: bool,

    /// Whether to include target (module path).
    pub include_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
            format: LogFormat::Json,
            file_line_info: false,
            include_target: true,
        }
    }
}

impl LogConfig {
    /// Creates a development configuration with human-readable output.
    #[must_use]
    pub fn development() -> Self {
        Self {
            level: "debug".to_string(),
            format: LogFormat::Pretty,
            file_line_info: true,
            ..Self::default()
        }
    }
}

/// Initializes the global logging subscriber.
///
/// # Errors
///
/// Returns `TelemetryError::LoggingInit` if the filter is invalid or a
/// global subscriber is already installed.
pub fn init_logging(config: &LogConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let filter = create_env_filter(&config.level)?;

    match config.format {
        LogFormat::Json => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_file(config.file_line_info)
                .with_line_number(config.file_line_info)
                .with_target(config.include_target)
                .with_filter(filter);

            tracing_subscriber::registry()
                .with(fmt_layer)
                .try_init()
                .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;
        }
        LogFormat::Pretty => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .pretty()
                .with_file(config.file_line_info)
                .with_line_number(config.file_line_info)
                .with_target(config.include_target)
                .with_filter(filter);

            tracing_subscriber::registry()
                .with(fmt_layer)
                .try_init()
                .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;
        }
    }

    Ok(())
}

/// Creates an env filter from a directive string.
///
/// # Errors
///
/// Returns error if the filter string is invalid.
pub fn create_env_filter(filter: &str) -> TelemetryResult<EnvFilter> {
    EnvFilter::try_new(filter)
        .map_err(|e| TelemetryError::LoggingInit(format!("Invalid log level: {e}")))
}

/// Standard log field names.
pub mod fields {
    /// Correlation identifier of the request.
    pub const CORRELATION_ID: &str = "correlation_id";

    /// Wall-clock time the request was received.
    pub const TIMESTAMP: &str = "timestamp";

    /// HTTP method.
    pub const METHOD: &str = "method";

    /// Raw request target.
    pub const URL: &str = "url";

    /// Peer address of the client.
    pub const CLIENT_ADDRESS: &str = "client_address";

    /// Route label used for metrics.
    pub const ROUTE: &str = "route";

    /// Response status code.
    pub const STATUS: &str = "status";

    /// Request duration in milliseconds.
    pub const DURATION_MS: &str = "duration_ms";

    /// Message of a trapped error.
    pub const ERROR_MESSAGE: &str = "error_message";
}

/// In-memory log capture for tests.
#[cfg(any(test, feature = "test-util"))]
pub mod capture {
    use std::collections::BTreeMap;
    use std::fmt;
    use std::sync::{Arc, Mutex};
    use tracing::field::{Field, Visit};
    use tracing::{Event, Level, Subscriber};
    use tracing_subscriber::layer::{Context, SubscriberExt};
    use tracing_subscriber::Layer;

    /// A single captured log record.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct CapturedEvent {
        /// Record level.
        pub level: Level,
        /// Rendered message.
        pub message: String,
        /// Structured fields, rendered with their display form.
        pub fields: BTreeMap<String, String>,
    }

    impl CapturedEvent {
        /// Returns a field value.
        #[must_use]
        pub fn field(&self, name: &str) -> Option<&str> {
            self.fields.get(name).map(String::as_str)
        }
    }

    /// Shared buffer of captured records.
    ///
    /// ```rust,ignore
    /// let logs = CapturedLogs::new();
    /// let _guard = tracing::subscriber::set_default(logs.subscriber());
    /// tracing::info!(correlation_id = "abc", "request received");
    /// assert!(logs.find("request received").is_some());
    /// ```
    #[derive(Debug, Clone, Default)]
    pub struct CapturedLogs {
        events: Arc<Mutex<Vec<CapturedEvent>>>,
    }

    impl CapturedLogs {
        /// Creates an empty buffer.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Returns a subscriber that records into this buffer.
        #[must_use]
        pub fn subscriber(&self) -> impl Subscriber + Send + Sync {
            tracing_subscriber::registry().with(CaptureLayer {
                events: Arc::clone(&self.events),
            })
        }

        /// Returns a snapshot of all captured records.
        #[must_use]
        pub fn events(&self) -> Vec<CapturedEvent> {
            self.events
                .lock()
                .map(|events| events.clone())
                .unwrap_or_default()
        }

        /// Returns the first record with the given message.
        #[must_use]
        pub fn find(&self, message: &str) -> Option<CapturedEvent> {
            self.events().into_iter().find(|e| e.message == message)
        }
    }

    struct CaptureLayer {
        events: Arc<Mutex<Vec<CapturedEvent>>>,
    }

    impl<S: Subscriber> Layer<S> for CaptureLayer {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            let mut visitor = FieldVisitor::default();
            event.record(&mut visitor);
            let captured = CapturedEvent {
                level: *event.metadata().level(),
                message: visitor.message.unwrap_or_default(),
                fields: visitor.fields,
            };
            if let Ok(mut events) = self.events.lock() {
                events.push(captured);
            }
        }
    }

    #[derive(Default)]
    struct FieldVisitor {
        message: Option<String>,
        fields: BTreeMap<String, String>,
    }

    impl Visit for FieldVisitor {
        fn record_str(&mut self, field: &Field, value: &str) {
            self.insert(field, value.to_string());
        }

        fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
            self.insert(field, format!("{value:?}"));
        }
    }

    impl FieldVisitor {
        fn insert(&mut self, field: &Field, value: String) {
            if field.name() == "message" {
                self.message = Some(value);
            } else {
                self.fields.insert(field.name().to_string(), value);
            }
        }
    }
}
