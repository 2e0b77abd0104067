//! Stage traits and the middleware chain.
//!
//! A request passes through three kinds of stage:
//!
//! - [`Middleware`] wraps the handler and may inspect or short-circuit the
//!   request. Middleware run in the order they were added to the pipeline.
//! - [`ErrorHandler`] is invoked only when the chain returns a
//!   [`HandlerFailure`], and always turns it into a response.
//! - [`ResponseObserver`] sees every finalized response, successful or not.
//!
//! # Example
//!
//! ```ignore
//! use vigil_middleware::{BoxFuture, Middleware, Next, Outcome, Request};
//! use vigil_middleware::context::MiddlewareContext;
//!
//! struct AuditMiddleware;
//!
//! impl Middleware for AuditMiddleware {
//!     fn name(&self) -> &'static str {
//!         "audit"
//!     }
//!
//!     fn process<'a>(
//!         &'a self,
//!         ctx: &'a mut MiddlewareContext,
//!         request: Request,
//!         next: Next<'a>,
//!     ) -> BoxFuture<'a, Outcome> {
//!         Box::pin(async move {
//!             let outcome = next.run(ctx, request).await;
//!             tracing::debug!(correlation_id = %ctx.request_id(), ok = outcome.is_ok(), "audited");
//!             outcome
//!         })
//!     }
//! }
//! ```

use crate::context::MiddlewareContext;
use crate::failure::{HandlerFailure, Outcome};
use crate::types::{Request, Response};
use std::future::Future;
use std::pin::Pin;

/// A boxed future that returns a response.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A stage wrapping the handler.
///
/// # Invariants
///
/// - Middleware MUST call `next.run()` at most once
/// - Middleware SHOULD return downstream failures instead of hiding them, so
///   the error handler sees them
pub trait Middleware: Send + Sync + 'static {
    /// Returns the unique name of this middleware stage.
    fn name(&self) -> &'static str;

    /// Process the request through this middleware.
    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Outcome>;
}

/// A stage invoked only when the chain fails.
///
/// Implementations must always produce a response and must not panic.
pub trait ErrorHandler: Send + Sync + 'static {
    /// Returns the unique name of this stage.
    fn name(&self) -> &'static str;

    /// Turns a failure into the response sent to the client.
    fn handle(&self, ctx: &mut MiddlewareContext, failure: HandlerFailure) -> Response;
}

/// A stage that observes every finalized response.
///
/// Observers run after the error handler, once per request.
pub trait ResponseObserver: Send + Sync + 'static {
    /// Returns the unique name of this stage.
    fn name(&self) -> &'static str;

    /// Observes the response about to be returned.
    fn observe(&self, ctx: &mut MiddlewareContext, response: &Response);
}

/// Callback to invoke the next middleware in the chain.
///
/// Consumed on use, so it can only be called once. If a middleware does not
/// call it, the middleware short-circuits the pipeline and returns its own
/// outcome.
pub struct Next<'a> {
    inner: NextInner<'a>,
}

/// Handler at the end of the chain.
pub type HandlerFn<'a> =
    Box<dyn FnOnce(&mut MiddlewareContext, Request) -> BoxFuture<'static, Outcome> + Send + 'a>;

enum NextInner<'a> {
    Chain {
        middleware: &'a dyn Middleware,
        next: Box<Next<'a>>,
    },
    Handler(HandlerFn<'a>),
}

impl<'a> Next<'a> {
    /// Creates a `Next` that will invoke the given middleware.
    pub(crate) fn new(middleware: &'a dyn Middleware, next: Next<'a>) -> Self {
        Self {
            inner: NextInner::Chain {
                middleware,
                next: Box::new(next),
            },
        }
    }

    /// Creates a terminal `Next` that invokes the handler.
    pub(crate) fn handler<F>(f: F) -> Self
    where
        F: FnOnce(&mut MiddlewareContext, Request) -> BoxFuture<'static, Outcome> + Send + 'a,
    {
        Self {
            inner: NextInner::Handler(Box::new(f)),
        }
    }

    /// Invokes the next middleware or handler in the chain.
    pub async fn run(self, ctx: &mut MiddlewareContext, request: Request) -> Outcome {
        match self.inner {
            NextInner::Chain { middleware, next } => middleware.process(ctx, request, *next).await,
            NextInner::Handler(handler) => handler(ctx, request).await,
        }
    }
}

/// A middleware created from an async function.
///
/// # Example
///
/// ```ignore
/// let middleware = FnMiddleware::new("deny_admin", |ctx, req, next| {
///     Box::pin(async move {
///         if req.uri().path().starts_with("/admin") {
///             let error = HandlerError::with_status(StatusCode::FORBIDDEN, "forbidden");
///             return Err(HandlerFailure::from(error));
///         }
///         next.run(ctx, req).await
///     })
/// });
/// ```
pub struct FnMiddleware<F> {
    name: &'static str,
    func: F,
}

impl<F> FnMiddleware<F>
where
    F: for<'a> Fn(&'a mut MiddlewareContext, Request, Next<'a>) -> BoxFuture<'a, Outcome>
        + Send
        + Sync
        + 'static,
{
    /// Creates a new function-based middleware.
    pub const fn new(name: &'static str, func: F) -> Self {
        Self { name, func }
    }
}

impl<F> Middleware for FnMiddleware<F>
where
    F: for<'a> Fn(&'a mut MiddlewareContext, Request, Next<'a>) -> BoxFuture<'a, Outcome>
        + Send
        + Sync
        + 'static,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Outcome> {
        (self.func)(ctx, request, next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ResponseExt;
    use bytes::Bytes;
    use http::{Method, Request as HttpRequest, StatusCode};
    use http_body_util::Full;
    use vigil_core::{HandlerError, RequestContext};

    struct VisitMiddleware {
        name: &'static str,
    }

    #[derive(Debug, Default)]
    struct Visits(Vec<&'static str>);

    impl Middleware for VisitMiddleware {
        fn name(&self) -> &'static str {
            self.name
        }

        fn process<'a>(
            &'a self,
            ctx: &'a mut MiddlewareContext,
            request: Request,
            next: Next<'a>,
        ) -> BoxFuture<'a, Outcome> {
            Box::pin(async move {
                let mut visits = ctx.remove_extension::<Visits>().unwrap_or_default();
                visits.0.push(self.name);
                ctx.set_extension(visits);
                next.run(ctx, request).await
            })
        }
    }

    fn request() -> Request {
        HttpRequest::builder()
            .uri("/test")
            .body(Full::new(Bytes::new()))
            .unwrap()
    }

    fn context() -> MiddlewareContext {
        MiddlewareContext::new(RequestContext::new(), Method::GET, request().uri())
    }

    #[tokio::test]
    async fn test_next_handler() {
        let mut ctx = context();
        let next = Next::handler(|_ctx, _req| {
            Box::pin(async { Ok(Response::empty(StatusCode::OK)) })
        });

        let response = next.run(&mut ctx, request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_middleware_chain_order() {
        let mw1 = VisitMiddleware { name: "first" };
        let mw2 = VisitMiddleware { name: "second" };
        let mut ctx = context();

        let handler = Next::handler(|_ctx, _req| {
            Box::pin(async { Ok(Response::empty(StatusCode::OK)) })
        });
        let next1 = Next::new(&mw1, Next::new(&mw2, handler));

        let outcome = next1.run(&mut ctx, request()).await;
        assert!(outcome.is_ok());
        assert_eq!(ctx.get_extension::<Visits>().unwrap().0, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_failure_propagates_through_chain() {
        let mw = VisitMiddleware { name: "outer" };
        let mut ctx = context();

        let handler = Next::handler(|_ctx, _req| {
            Box::pin(async { Err(HandlerFailure::from(HandlerError::not_found("gone"))) })
        });

        let failure = Next::new(&mw, handler)
            .run(&mut ctx, request())
            .await
            .unwrap_err();
        assert_eq!(failure.error().status(), Some(StatusCode::NOT_FOUND));
    }

    #[tokio::test]
    async fn test_fn_middleware_short_circuits() {
        let mw = FnMiddleware::new("deny", |_ctx, _req, _next| {
            Box::pin(async {
                Err(HandlerFailure::from(HandlerError::with_status(
                    StatusCode::FORBIDDEN,
                    "no",
                )))
            })
        });
        assert_eq!(mw.name(), "deny");

        let mut ctx = context();
        let handler = Next::handler(|_ctx, _req| {
            Box::pin(async { Ok(Response::empty(StatusCode::IM_A_TEAPOT)) })
        });

        let failure = Next::new(&mw, handler)
            .run(&mut ctx, request())
            .await
            .unwrap_err();
        assert_eq!(failure.error().status(), Some(StatusCode::FORBIDDEN));
    }
}
