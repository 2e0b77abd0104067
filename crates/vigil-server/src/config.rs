//! Server configuration types.
//!
//! Configuration is read from a `.env` file (if present) and then from the
//! process environment:
//!
//! | Variable | Default |
//! |---|---|
//! | `PORT` | `3000` |
//! | `HOST` | `0.0.0.0` |
//! | `LOG_LEVEL` | `info` |
//! | `LOG_FORMAT` | `json` |
//! | `SHUTDOWN_TIMEOUT_SECS` | `30` |
//! | `MAX_BODY_BYTES` | `102400` |
//!
//! # Example
//!
//! ```rust
//! use vigil_server::ServerConfig;
//! use std::time::Duration;
//!
//! let config = ServerConfig::builder()
//!     .port(8080)
//!     .shutdown_timeout(Duration::from_secs(10))
//!     .build();
//!
//! assert_eq!(config.socket_addr().port(), 8080);
//! ```

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use thiserror::Error;
use vigil_telemetry::{LogConfig, LogFormat};

/// Default listen port.
pub const DEFAULT_PORT: u16 = 3000;

/// Default bind host.
pub const DEFAULT_HOST: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);

/// Default log filter directive.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default shutdown timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Default maximum request body size (100 KiB).
pub const DEFAULT_MAX_BODY_SIZE: usize = 100 * 1024;

/// Errors raised while loading configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A variable was set to a value that could not be parsed.
    #[error("invalid value for {name}: '{value}' ({reason})")]
    InvalidValue {
        /// Variable name.
        name: &'static str,
        /// Raw value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },
}

impl ConfigError {
    fn invalid(name: &'static str, value: &str, reason: impl ToString) -> Self {
        Self::InvalidValue {
            name,
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Server configuration.
///
/// Use [`ServerConfig::from_env()`] in the binary and
/// [`ServerConfig::builder()`] everywhere else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    host: IpAddr,
    port: u16,
    log_level: String,
    log_format: LogFormat,

    /// How long to wait for in-flight connections on shutdown.
    shutdown_timeout: Duration,

    /// Larger request bodies are rejected with 413.
    max_body_size: usize,
}

impl ServerConfig {
    /// Creates a new server configuration builder.
    #[must_use]
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// Loads configuration from `.env` and the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        // A missing .env file is normal.
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads configuration through an arbitrary variable lookup.
    ///
    /// Unset and empty variables take their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let mut builder = Self::builder();

        if let Some(raw) = get("PORT") {
            let port = raw
                .trim()
                .parse::<u16>()
                .map_err(|e| ConfigError::invalid("PORT", &raw, e))?;
            builder = builder.port(port);
        }
        if let Some(raw) = get("HOST") {
            let host = raw
                .trim()
                .parse::<IpAddr>()
                .map_err(|e| ConfigError::invalid("HOST", &raw, e))?;
            builder = builder.host(host);
        }
        if let Some(raw) = get("LOG_LEVEL") {
            builder = builder.log_level(raw.trim());
        }
        if let Some(raw) = get("LOG_FORMAT") {
            let format = raw
                .parse::<LogFormat>()
                .map_err(|e| ConfigError::invalid("LOG_FORMAT", &raw, e))?;
            builder = builder.log_format(format);
        }
        if let Some(raw) = get("SHUTDOWN_TIMEOUT_SECS") {
            let secs = raw
                .trim()
                .parse::<u64>()
                .map_err(|e| ConfigError::invalid("SHUTDOWN_TIMEOUT_SECS", &raw, e))?;
            builder = builder.shutdown_timeout(Duration::from_secs(secs));
        }
        if let Some(raw) = get("MAX_BODY_BYTES") {
            let bytes = raw
                .trim()
                .parse::<usize>()
                .map_err(|e| ConfigError::invalid("MAX_BODY_BYTES", &raw, e))?;
            builder = builder.max_body_size(bytes);
        }

        Ok(builder.build())
    }

    /// Returns the address to bind.
    #[must_use]
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Returns the log filter directive.
    #[must_use]
    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    /// Returns the log output format.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Returns the logging configuration derived from these settings.
    #[must_use]
    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            level: self.log_level.clone(),
            format: self.log_format,
            ..LogConfig::default()
        }
    }

    /// Returns the graceful shutdown timeout.
    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }

    /// Returns the maximum accepted request body size in bytes.
    #[must_use]
    pub fn max_body_size(&self) -> usize {
        self.max_body_size
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Builder for [`ServerConfig`].
#[derive(Debug, Clone)]
pub struct ServerConfigBuilder {
    host: IpAddr,
    port: u16,
    log_level: String,
    log_format: LogFormat,
    shutdown_timeout: Duration,
    max_body_size: usize,
}

impl ServerConfigBuilder {
    /// Creates a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            host: DEFAULT_HOST,
            port: DEFAULT_PORT,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_format: LogFormat::default(),
            shutdown_timeout: Duration::from_secs(DEFAULT_SHUTDOWN_TIMEOUT_SECS),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }

    /// Sets the bind host.
    #[must_use]
    pub fn host(mut self, host: IpAddr) -> Self {
        self.host = host;
        self
    }

    /// Sets the listen port. Port 0 picks a free port.
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the log filter directive.
    #[must_use]
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Sets the log output format.
    #[must_use]
    pub fn log_format(mut self, format: LogFormat) -> Self {
        self.log_format = format;
        self
    }

    /// Sets the graceful shutdown timeout.
    ///
    /// This is the maximum time the server waits for in-flight
    /// connections to finish during shutdown.
    #[must_use]
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Sets the maximum request body size in bytes.
    #[must_use]
    pub fn max_body_size(mut self, bytes: usize) -> Self {
        self.max_body_size = bytes;
        self
    }

    /// Builds the [`ServerConfig`].
    #[must_use]
    pub fn build(self) -> ServerConfig {
        ServerConfig {
            host: self.host,
            port: self.port,
            log_level: self.log_level,
            log_format: self.log_format,
            shutdown_timeout: self.shutdown_timeout,
            max_body_size: self.max_body_size,
        }
    }
}

impl Default for ServerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
