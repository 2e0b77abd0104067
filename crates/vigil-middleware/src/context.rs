//! Middleware context types.
//!
//! The [`MiddlewareContext`] carries the per-request [`RequestContext`] and
//! the request facts every stage needs (method, URL, client address, matched
//! route) through the pipeline, including the stages that run after the
//! request body has been handed to the handler.

use http::{Method, Uri};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::net::SocketAddr;
use vigil_core::{RequestContext, RequestId};

/// Context that flows through the middleware pipeline.
///
/// Created by the context initializer before anything else runs. The
/// embedded [`RequestContext`] is never replaced, so the correlation ID and
/// start time stay fixed for the life of the request.
///
/// # Example
///
/// ```
/// use http::{Method, Uri};
/// use vigil_core::RequestContext;
/// use vigil_middleware::context::MiddlewareContext;
///
/// let uri: Uri = "/users/42?expand=true".parse().unwrap();
/// let mut ctx = MiddlewareContext::new(RequestContext::new(), Method::GET, &uri);
/// assert_eq!(ctx.url(), "/users/42?expand=true");
/// assert_eq!(ctx.route_label(), "/users/42");
///
/// ctx.set_matched_route("/users/{id}");
/// assert_eq!(ctx.route_label(), "/users/{id}");
/// ```
#[derive(Debug)]
pub struct MiddlewareContext {
    request_context: RequestContext,

    method: Method,

    /// Path and query, as received.
    url: String,

    path: String,

    client_addr: Option<SocketAddr>,

    /// Route pattern resolved by the router, if any.
    matched_route: Option<String>,

    /// Type-erased extension data.
    ///
    /// Stages can store arbitrary data here using type-safe keys.
    extensions: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl MiddlewareContext {
    /// Creates a context for a request.
    #[must_use]
    pub fn new(request_context: RequestContext, method: Method, uri: &Uri) -> Self {
        let url = uri
            .path_and_query()
            .map_or_else(|| uri.path().to_string(), ToString::to_string);

        Self {
            request_context,
            method,
            url,
            path: uri.path().to_string(),
            client_addr: None,
            matched_route: None,
            extensions: HashMap::new(),
        }
    }

    /// Sets the client address.
    #[must_use]
    pub fn with_client_addr(mut self, addr: SocketAddr) -> Self {
        self.client_addr = Some(addr);
        self
    }

    /// Returns the request context.
    #[must_use]
    pub const fn request_context(&self) -> &RequestContext {
        &self.request_context
    }

    /// Returns the correlation ID.
    #[must_use]
    pub const fn request_id(&self) -> RequestId {
        self.request_context.request_id()
    }

    /// Returns the HTTP method.
    #[must_use]
    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the request target (path and query).
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the raw request path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the client address, if known.
    #[must_use]
    pub const fn client_addr(&self) -> Option<SocketAddr> {
        self.client_addr
    }

    /// Returns the matched route pattern, if resolved.
    #[must_use]
    pub fn matched_route(&self) -> Option<&str> {
        self.matched_route.as_deref()
    }

    /// Sets the matched route pattern.
    pub fn set_matched_route(&mut self, route: impl Into<String>) {
        self.matched_route = Some(route.into());
    }

    /// Returns the label used for the `route` metric dimension.
    ///
    /// This is the matched route pattern when one was resolved, otherwise
    /// the raw request path.
    #[must_use]
    pub fn route_label(&self) -> &str {
        self.matched_route.as_deref().unwrap_or(&self.path)
    }

    /// Stores a typed extension value.
    ///
    /// # Example
    ///
    /// ```
    /// use http::{Method, Uri};
    /// use vigil_core::RequestContext;
    /// use vigil_middleware::context::MiddlewareContext;
    ///
    /// #[derive(Clone)]
    /// struct TenantId(String);
    ///
    /// let mut ctx = MiddlewareContext::new(RequestContext::new(), Method::GET, &Uri::from_static("/"));
    /// ctx.set_extension(TenantId("acme".to_string()));
    ///
    /// let tenant = ctx.get_extension::<TenantId>().unwrap();
    /// assert_eq!(tenant.0, "acme");
    /// ```
    pub fn set_extension<T: Send + Sync + 'static>(&mut self, value: T) {
        self.extensions.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Retrieves a typed extension value.
    #[must_use]
    pub fn get_extension<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.extensions
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref())
    }

    /// Removes and returns a typed extension value.
    pub fn remove_extension<T: Send + Sync + 'static>(&mut self) -> Option<T> {
        self.extensions
            .remove(&TypeId::of::<T>())
            .and_then(|v| v.downcast().ok())
            .map(|b| *b)
    }

    /// Checks if an extension of the given type exists.
    #[must_use]
    pub fn has_extension<T: Send + Sync + 'static>(&self) -> bool {
        self.extensions.contains_key(&TypeId::of::<T>())
    }
}
