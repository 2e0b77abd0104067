//! Handler error types.
//!
//! Handlers signal failure by returning a [`HandlerError`]. The error either
//! carries an explicit HTTP status (a *classified* failure the handler chose
//! on purpose) or it does not (an *unclassified* failure, which the error
//! trap turns into a generic 500).
//!
//! # Classification
//!
//! | Class | Origin | Outcome |
//! |---|---|---|
//! | [`ErrorClass::Classified`] | [`HandlerError::with_status`] | status surfaced as-is |
//! | [`ErrorClass::Unclassified`] | [`HandlerError::unexpected`], `anyhow` | 500, generic body |
//! | [`ErrorClass::PostResponse`] | failure after the response was committed | logged only |

use http::StatusCode;
use thiserror::Error;

/// Boxed error used as the optional source of a [`HandlerError`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type returned by handlers.
pub type HandlerResult<T> = Result<T, HandlerError>;

/// Text used when an error carries no message of its own.
pub const FALLBACK_ERROR_MESSAGE: &str = "unknown error";

/// How a handler failure is treated by the error trap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// The error carries an explicit status code.
    Classified(StatusCode),
    /// The error carries no status code.
    Unclassified,
    /// The error was signalled after the response had been committed.
    PostResponse,
}

/// Error signalled by a request handler.
///
/// # Example
///
/// ```
/// use http::StatusCode;
/// use vigil_core::{ErrorClass, HandlerError};
///
/// let missing = HandlerError::with_status(StatusCode::NOT_FOUND, "user not found");
/// assert_eq!(missing.class(), ErrorClass::Classified(StatusCode::NOT_FOUND));
///
/// let broken = HandlerError::unexpected("db pool exhausted");
/// assert_eq!(broken.class(), ErrorClass::Unclassified);
/// ```
#[derive(Debug, Error)]
#[error("{}", .message.as_deref().unwrap_or(FALLBACK_ERROR_MESSAGE))]
pub struct HandlerError {
    status: Option<StatusCode>,
    message: Option<String>,
    #[source]
    source: Option<BoxError>,
}

impl HandlerError {
    /// Creates a classified error with an explicit status.
    #[must_use]
    pub fn with_status(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: Some(message.into()),
            source: None,
        }
    }

    /// Creates a classified `404 Not Found` error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::NOT_FOUND, message)
    }

    /// Creates a classified `400 Bad Request` error.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::BAD_REQUEST, message)
    }

    /// Creates an unclassified error with a message.
    #[must_use]
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: Some(message.into()),
            source: None,
        }
    }

    /// Creates an unclassified error with neither status nor message.
    #[must_use]
    pub const fn opaque() -> Self {
        Self {
            status: None,
            message: None,
            source: None,
        }
    }

    /// Creates an unclassified error wrapping an underlying cause.
    ///
    /// The cause's display text becomes the message.
    pub fn from_source(source: impl Into<BoxError>) -> Self {
        let source = source.into();
        Self {
            status: None,
            message: Some(source.to_string()),
            source: Some(source),
        }
    }

    /// Attaches an underlying cause, keeping the current message and status.
    #[must_use]
    pub fn caused_by(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Returns the explicit status code, if any.
    #[must_use]
    pub const fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Returns the error message, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Returns the classification of this error on its own.
    ///
    /// Whether the response was already committed is not known here; see
    /// the middleware crate's `HandlerFailure` for the full picture.
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self.status {
            Some(status) => ErrorClass::Classified(status),
            None => ErrorClass::Unclassified,
        }
    }
}

impl From<anyhow::Error> for HandlerError {
    fn from(err: anyhow::Error) -> Self {
        Self::from_source(err)
    }
}
