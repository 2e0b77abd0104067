//! Handler failure signalled to the pipeline.

use crate::types::Response;
use thiserror::Error;
use vigil_core::{ErrorClass, HandlerError};

/// Result of running the middleware chain and handler.
pub type Outcome = Result<Response, HandlerFailure>;

/// A handler failure, together with the response the handler had already
/// committed, if any.
///
/// A committed response means status and headers were already sent to the
/// client before the failure was signalled, so they can no longer change.
///
/// # Example
///
/// ```
/// use vigil_core::{ErrorClass, HandlerError};
/// use vigil_middleware::{HandlerFailure, Response, ResponseExt};
/// use http::StatusCode;
///
/// let before = HandlerFailure::from(HandlerError::not_found("no such user"));
/// assert_eq!(before.class(), ErrorClass::Classified(StatusCode::NOT_FOUND));
///
/// let after = HandlerFailure::after_commit(
///     Response::empty(StatusCode::OK),
///     HandlerError::unexpected("stream broke"),
/// );
/// assert!(after.headers_sent());
/// assert_eq!(after.class(), ErrorClass::PostResponse);
/// ```
#[derive(Debug, Error)]
#[error("{error}")]
pub struct HandlerFailure {
    #[source]
    error: HandlerError,
    committed: Option<Response>,
}

impl HandlerFailure {
    /// Creates a failure signalled after `response` was committed.
    pub fn after_commit(response: Response, error: impl Into<HandlerError>) -> Self {
        Self {
            error: error.into(),
            committed: Some(response),
        }
    }

    /// Returns the underlying error.
    #[must_use]
    pub const fn error(&self) -> &HandlerError {
        &self.error
    }

    /// Returns the committed response, if headers were already sent.
    #[must_use]
    pub const fn committed(&self) -> Option<&Response> {
        self.committed.as_ref()
    }

    /// Returns true if headers were sent before the failure.
    #[must_use]
    pub const fn headers_sent(&self) -> bool {
        self.committed.is_some()
    }

    /// Returns the classification of the failure.
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        if self.headers_sent() {
            ErrorClass::PostResponse
        } else {
            self.error.class()
        }
    }

    /// Splits the failure into the error and the committed response.
    #[must_use]
    pub fn into_parts(self) -> (HandlerError, Option<Response>) {
        (self.error, self.committed)
    }
}

impl From<HandlerError> for HandlerFailure {
    fn from(error: HandlerError) -> Self {
        Self {
            error,
            committed: None,
        }
    }
}

impl From<anyhow::Error> for HandlerFailure {
    fn from(error: anyhow::Error) -> Self {
        HandlerError::from(error).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ResponseExt;
    use http::StatusCode;

    #[test]
    fn test_failure_before_commit() {
        let failure = HandlerFailure::from(HandlerError::unexpected("db down"));
        assert!(!failure.headers_sent());
        assert!(failure.committed().is_none());
        assert_eq!(failure.class(), ErrorClass::Unclassified);
        assert_eq!(failure.to_string(), "db down");
    }

    #[test]
    fn test_post_response_class_wins_over_status() {
        let failure = HandlerFailure::after_commit(
            Response::empty(StatusCode::OK),
            HandlerError::bad_request("late validation"),
        );
        assert_eq!(failure.class(), ErrorClass::PostResponse);
        assert_eq!(failure.error().status(), Some(StatusCode::BAD_REQUEST));

        let (error, committed) = failure.into_parts();
        assert_eq!(error.message(), Some("late validation"));
        assert_eq!(committed.map(|r| r.status()), Some(StatusCode::OK));
    }

    #[test]
    fn test_from_anyhow() {
        let failure: HandlerFailure = anyhow::anyhow!("timeout talking to upstream").into();
        assert_eq!(failure.class(), ErrorClass::Unclassified);
        assert_eq!(failure.error().message(), Some("timeout talking to upstream"));
    }
}
