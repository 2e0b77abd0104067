//! Error trap stage.
//!
//! Invoked only when the chain returns a failure. It decides what the client
//! sees and makes sure nothing internal leaks.
//!
//! # Dispositions
//!
//! | Failure | Log | Response |
//! |---|---|---|
//! | headers already sent | `warn` | committed response, unchanged |
//! | explicit status | none | that status, empty body |
//! | anything else | `error` | 500, generic JSON body |
//!
//! The generic body is always:
//!
//! ```json
//! {"error":"An unexpected error has occurred."}
//! ```

use crate::context::MiddlewareContext;
use crate::failure::HandlerFailure;
use crate::middleware::ErrorHandler;
use crate::pipeline::Stage;
use crate::types::{Response, ResponseExt};
use http::StatusCode;
use vigil_core::FALLBACK_ERROR_MESSAGE;

/// Body text returned for unclassified failures.
pub const GENERIC_ERROR_MESSAGE: &str = "An unexpected error has occurred.";

/// How the trap disposed of a failure, stored in the context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapDisposition {
    /// Headers were already sent; the committed response was kept.
    HeadersSent,
    /// The failure carried a status, which was surfaced as-is.
    PassedThrough(StatusCode),
    /// The failure was replaced by the generic 500 response.
    Replaced,
}

/// Error handler that turns handler failures into client responses.
///
/// Never panics: response construction cannot fail here, and every branch
/// ends in a response.
///
/// # Example
///
/// ```rust,ignore
/// use vigil_middleware::stages::ErrorTrap;
///
/// let trap = ErrorTrap::new().fallback_message("no detail available");
/// ```
#[derive(Debug, Clone)]
pub struct ErrorTrap {
    /// Logged when a failure carries no message.
    fallback_message: String,
}

impl Default for ErrorTrap {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorTrap {
    /// Creates an error trap with the default fallback text.
    #[must_use]
    pub fn new() -> Self {
        Self {
            fallback_message: FALLBACK_ERROR_MESSAGE.to_string(),
        }
    }

    /// Sets the text logged for failures without a message.
    #[must_use]
    pub fn fallback_message(mut self, message: &str) -> Self {
        self.fallback_message = message.to_string();
        self
    }

    /// Returns the generic 500 response.
    #[must_use]
    pub fn generic_error_response() -> Response {
        Response::json(
            StatusCode::INTERNAL_SERVER_ERROR,
            &serde_json::json!({ "error": GENERIC_ERROR_MESSAGE }),
        )
    }
}

impl ErrorHandler for ErrorTrap {
    fn name(&self) -> &'static str {
        Stage::ErrorTrap.name()
    }

    fn handle(&self, ctx: &mut MiddlewareContext, failure: HandlerFailure) -> Response {
        let correlation_id = ctx.request_id();
        let (error, committed) = failure.into_parts();
        let message = error.message().unwrap_or(self.fallback_message.as_str());

        if let Some(response) = committed {
            tracing::warn!(
                correlation_id = %correlation_id,
                error_message = %message,
                "headers sent before error handler invoked"
            );
            ctx.set_extension(TrapDisposition::HeadersSent);
            return response;
        }

        if let Some(status) = error.status() {
            ctx.set_extension(TrapDisposition::PassedThrough(status));
            return Response::empty(status);
        }

        tracing::error!(correlation_id = %correlation_id, "{message}");
        ctx.set_extension(TrapDisposition::Replaced);
        Self::generic_error_response()
    }
}
