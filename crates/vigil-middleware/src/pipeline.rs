//! Fixed-order request pipeline.
//!
//! ## Pipeline Stages
//!
//! Every request flows through the same stages, in this order:
//!
//! 1. **Context init** - create correlation ID and start time, log ingress
//! 2. **Handler** - user middleware, then the application handler
//! 3. **Error trap** - only when step 2 failed (or panicked)
//! 4. **Metrics recorder** - record duration and count
//!
//! Steps 3 and 4 always run to completion once step 2 has finished, so every
//! request that reaches the pipeline produces exactly one counter increment.
//! A panic in the error handler or in an observer is logged and contained;
//! the metrics recorder always runs last.

use crate::context::MiddlewareContext;
use crate::failure::{HandlerFailure, Outcome};
use crate::middleware::{BoxFuture, ErrorHandler, Middleware, Next, ResponseObserver};
use crate::stages::{ContextInitializer, ErrorTrap, MetricsRecorder};
use crate::types::{Request, Response, CORRELATION_ID_HEADER};
use futures_util::FutureExt;
use http::HeaderValue;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use vigil_core::HandlerError;
use vigil_telemetry::MetricsRegistry;

/// A type-erased middleware that can be stored in a vector.
pub type BoxedMiddleware = Arc<dyn Middleware>;

/// The fixed-order request pipeline.
///
/// # Example
///
/// ```ignore
/// use vigil_middleware::pipeline::Pipeline;
///
/// let pipeline = Pipeline::builder(registry.clone()).build();
///
/// let response = pipeline
///     .process(request, |ctx, req| Box::pin(async move { Ok(Response::empty(StatusCode::OK)) }))
///     .await;
/// ```
pub struct Pipeline {
    initializer: ContextInitializer,

    /// User middleware, outermost first.
    stages: Vec<BoxedMiddleware>,

    error_handler: Arc<dyn ErrorHandler>,

    observers: Vec<Arc<dyn ResponseObserver>>,

    /// Runs after every other observer.
    recorder: MetricsRecorder,
}

impl Pipeline {
    /// Creates a new pipeline builder recording into `registry`.
    #[must_use]
    pub fn builder(registry: Arc<MetricsRegistry>) -> PipelineBuilder {
        PipelineBuilder::new(registry)
    }

    /// Processes a request through the entire pipeline.
    pub async fn process<H>(&self, request: Request, handler: H) -> Response
    where
        H: FnOnce(&mut MiddlewareContext, Request) -> BoxFuture<'static, Outcome> + Send + 'static,
    {
        self.process_with_context(request, handler).await.1
    }

    /// Processes a request and also returns the final middleware context.
    ///
    /// The context holds what the stages recorded, such as the trap
    /// disposition and the metric observation.
    pub async fn process_with_context<H>(
        &self,
        request: Request,
        handler: H,
    ) -> (MiddlewareContext, Response)
    where
        H: FnOnce(&mut MiddlewareContext, Request) -> BoxFuture<'static, Outcome> + Send + 'static,
    {
        let mut ctx = self.initializer.initialize(&request);

        let next = self.build_chain(handler);
        let outcome = AssertUnwindSafe(next.run(&mut ctx, request))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(panic_failure(&*panic)));

        let (mut response, committed) = match outcome {
            Ok(response) => (response, false),
            Err(failure) => {
                let committed = failure.headers_sent();
                let handled =
                    catch_unwind(AssertUnwindSafe(|| self.error_handler.handle(&mut ctx, failure)));
                match handled {
                    Ok(response) => (response, committed),
                    Err(panic) => {
                        tracing::error!(
                            correlation_id = %ctx.request_id(),
                            stage = self.error_handler.name(),
                            panic = panic_detail(&*panic),
                            "error handler panicked"
                        );
                        (ErrorTrap::generic_error_response(), false)
                    }
                }
            }
        };

        if !committed {
            if let Ok(value) = HeaderValue::from_str(&ctx.request_id().to_string()) {
                response.headers_mut().insert(CORRELATION_ID_HEADER, value);
            }
        }

        for observer in &self.observers {
            Self::observe(observer.as_ref(), &mut ctx, &response);
        }
        Self::observe(&self.recorder, &mut ctx, &response);

        (ctx, response)
    }

    fn observe(observer: &dyn ResponseObserver, ctx: &mut MiddlewareContext, response: &Response) {
        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| observer.observe(ctx, response))) {
            tracing::error!(
                correlation_id = %ctx.request_id(),
                stage = observer.name(),
                panic = panic_detail(&*panic),
                "response observer panicked"
            );
        }
    }

    /// Builds the middleware chain for a request.
    fn build_chain<'a, H>(&'a self, handler: H) -> Next<'a>
    where
        H: FnOnce(&mut MiddlewareContext, Request) -> BoxFuture<'static, Outcome> + Send + 'a,
    {
        let mut next = Next::handler(handler);
        for middleware in self.stages.iter().rev() {
            next = Next::new(middleware.as_ref(), next);
        }
        next
    }

    /// Returns the names of all stages in execution order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        let mut names = vec![self.initializer.name()];
        names.extend(self.stages.iter().map(|mw| mw.name()));
        names.push(self.error_handler.name());
        names.extend(self.observers.iter().map(|o| o.name()));
        names.push(self.recorder.name());
        names
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        3 + self.stages.len() + self.observers.len()
    }
}

fn panic_detail(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic type")
}

/// Converts a handler panic into an unclassified failure.
fn panic_failure(panic: &(dyn Any + Send)) -> HandlerFailure {
    HandlerError::unexpected(format!("handler panicked: {}", panic_detail(panic))).into()
}

/// Builder for constructing a [`Pipeline`].
///
/// The stage order is fixed; the builder only chooses the implementations.
/// The error handler defaults to [`ErrorTrap`]. The [`MetricsRecorder`] is
/// always present and always the last observer.
pub struct PipelineBuilder {
    initializer: ContextInitializer,
    stages: Vec<BoxedMiddleware>,
    error_handler: Option<Arc<dyn ErrorHandler>>,
    observers: Vec<Arc<dyn ResponseObserver>>,
    recorder: MetricsRecorder,
}

impl PipelineBuilder {
    /// Creates a new pipeline builder recording into `registry`.
    #[must_use]
    pub fn new(registry: Arc<MetricsRegistry>) -> Self {
        Self {
            initializer: ContextInitializer::new(),
            stages: Vec::new(),
            error_handler: None,
            observers: Vec::new(),
            recorder: MetricsRecorder::new(registry),
        }
    }

    /// Sets the context initializer.
    #[must_use]
    pub fn context_initializer(mut self, initializer: ContextInitializer) -> Self {
        self.initializer = initializer;
        self
    }

    /// Adds a middleware stage wrapping the handler.
    ///
    /// Stages run in the order they are added.
    #[must_use]
    pub fn add_stage<M: Middleware>(mut self, middleware: M) -> Self {
        self.stages.push(Arc::new(middleware));
        self
    }

    /// Replaces the error handler.
    #[must_use]
    pub fn error_handler<E: ErrorHandler>(mut self, handler: E) -> Self {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    /// Adds a response observer. Observers run in the order they are added,
    /// before the metrics recorder.
    #[must_use]
    pub fn add_observer<O: ResponseObserver>(mut self, observer: O) -> Self {
        self.observers.push(Arc::new(observer));
        self
    }

    /// Builds the pipeline.
    #[must_use]
    pub fn build(self) -> Pipeline {
        Pipeline {
            initializer: self.initializer,
            stages: self.stages,
            error_handler: self
                .error_handler
                .unwrap_or_else(|| Arc::new(ErrorTrap::new())),
            observers: self.observers,
            recorder: self.recorder,
        }
    }
}

/// Pipeline stage marker.
///
/// This enum represents the fixed order of stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Stage {
    /// Stage 1: Request context creation and ingress log
    ContextInit = 1,
    /// Stage 2: User middleware and the application handler
    Handler = 2,
    /// Stage 3: Error trapping (failures only)
    ErrorTrap = 3,
    /// Stage 4: Metrics recording
    MetricsRecorder = 4,
}

impl Stage {
    /// Returns true if this stage runs only when the handler failed.
    #[must_use]
    pub const fn is_failure_only(self) -> bool {
        matches!(self, Self::ErrorTrap)
    }

    /// Returns the stage name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::ContextInit => "context_init",
            Self::Handler => "handler",
            Self::ErrorTrap => "error_trap",
            Self::MetricsRecorder => "metrics_recorder",
        }
    }

    /// Returns all stages in order.
    #[must_use]
    pub const fn all() -> [Self; 4] {
        [
            Self::ContextInit,
            Self::Handler,
            Self::ErrorTrap,
            Self::MetricsRecorder,
        ]
    }
}
