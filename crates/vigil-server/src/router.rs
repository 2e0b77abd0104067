//! Request routing and path matching.
//!
//! The router maps a method and path to a handler and reports the route
//! *pattern* that matched (e.g. `/users/{id}`). The server stores that
//! pattern on the request as [`MatchedRoute`](vigil_middleware::MatchedRoute)
//! so metrics are labelled by pattern instead of by raw path.
//!
//! # Example
//!
//! ```rust
//! use vigil_server::Router;
//! use vigil_middleware::{Response, ResponseExt};
//! use http::{Method, StatusCode};
//!
//! let mut router = Router::new();
//! router.route(Method::GET, "/users/{id}", |_req| async {
//!     Ok(Response::empty(StatusCode::OK))
//! });
//!
//! let m = router.match_route(&Method::GET, "/users/42").unwrap();
//! assert_eq!(m.pattern(), "/users/{id}");
//! assert_eq!(m.param("id"), Some("42"));
//! ```

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use http::Method;
use vigil_middleware::{BoxFuture, Outcome, Request};

/// A type-erased route handler.
pub type RouteHandler = Arc<dyn Fn(Request) -> BoxFuture<'static, Outcome> + Send + Sync>;

/// Path parameters extracted by the router, inserted as a request extension.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParams(pub HashMap<String, String>);

impl PathParams {
    /// Returns a parameter by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }
}

/// A matched route.
#[derive(Clone)]
pub struct RouteMatch {
    pattern: String,
    params: PathParams,
    handler: RouteHandler,
}

impl RouteMatch {
    /// Returns the route pattern that matched.
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Returns the extracted path parameters.
    #[must_use]
    pub fn params(&self) -> &PathParams {
        &self.params
    }

    /// Returns a specific path parameter by name.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    /// Splits the match into its parts.
    #[must_use]
    pub fn into_parts(self) -> (String, PathParams, RouteHandler) {
        (self.pattern, self.params, self.handler)
    }
}

impl fmt::Debug for RouteMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteMatch")
            .field("pattern", &self.pattern)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/// A segment of a path template.
#[derive(Debug, Clone, PartialEq, Eq)]
enum PathSegment {
    /// A literal segment (e.g., "users")
    Literal(String),

    /// A parameter segment (e.g., "{id}")
    Param(String),
}

#[derive(Clone)]
struct Route {
    method: Method,
    segments: Vec<PathSegment>,
    pattern: String,
    handler: RouteHandler,
}

impl Route {
    fn parse_segments(pattern: &str) -> Vec<PathSegment> {
        pattern
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| match s.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                Some(name) => PathSegment::Param(name.to_string()),
                None => PathSegment::Literal(s.to_string()),
            })
            .collect()
    }

    /// Returns extracted parameters if the route matches.
    fn match_path(&self, path: &str) -> Option<PathParams> {
        let path_segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        if path_segments.len() != self.segments.len() {
            return None;
        }

        let mut params = HashMap::new();
        for (pattern, actual) in self.segments.iter().zip(path_segments) {
            match pattern {
                PathSegment::Literal(expected) if expected != actual => return None,
                PathSegment::Literal(_) => {}
                PathSegment::Param(name) => {
                    params.insert(name.clone(), actual.to_string());
                }
            }
        }
        Some(PathParams(params))
    }

    /// Number of literal segments. `/users/me` outranks `/users/{id}`.
    fn specificity(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, PathSegment::Literal(_)))
            .count()
    }
}

/// HTTP request router.
///
/// Supports path parameters using `{name}` syntax. When several routes
/// match, the one with the most literal segments wins; ties go to the
/// route registered first.
#[derive(Clone, Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    /// Creates a new empty router.
    #[must_use]
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    /// Registers an async handler for a method and path pattern.
    pub fn route<F, Fut>(&mut self, method: Method, pattern: impl AsRef<str>, handler: F)
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Outcome> + Send + 'static,
    {
        let handler: RouteHandler =
            Arc::new(move |req: Request| -> BoxFuture<'static, Outcome> { Box::pin(handler(req)) });
        self.add_route(method, pattern, handler);
    }

    /// Registers an already type-erased handler.
    pub fn add_route(&mut self, method: Method, pattern: impl AsRef<str>, handler: RouteHandler) {
        let pattern = pattern.as_ref();
        self.routes.push(Route {
            method,
            segments: Route::parse_segments(pattern),
            pattern: pattern.to_string(),
            handler,
        });
    }

    /// Returns the number of registered routes.
    #[must_use]
    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    /// Matches a request method and path to a route.
    #[must_use]
    pub fn match_route(&self, method: &Method, path: &str) -> Option<RouteMatch> {
        let mut best: Option<(&Route, PathParams)> = None;
        for route in self.routes.iter().filter(|r| r.method == *method) {
            let Some(params) = route.match_path(path) else {
                continue;
            };
            let better = best
                .as_ref()
                .map_or(true, |(current, _)| route.specificity() > current.specificity());
            if better {
                best = Some((route, params));
            }
        }

        best.map(|(route, params)| RouteMatch {
            pattern: route.pattern.clone(),
            params,
            handler: Arc::clone(&route.handler),
        })
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.routes.iter().map(|r| (&r.method, &r.pattern)))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::StatusCode;
    use http_body_util::Full;
    use vigil_middleware::{Response, ResponseExt};

    fn router() -> Router {
        let mut router = Router::new();
        router.route(Method::GET, "/users", |_req| async {
            Ok(Response::empty(StatusCode::OK))
        });
        router.route(Method::GET, "/users/{id}", |_req| async {
            Ok(Response::empty(StatusCode::OK))
        });
        router.route(Method::GET, "/users/me", |_req| async {
            Ok(Response::empty(StatusCode::NO_CONTENT))
        });
        router.route(Method::DELETE, "/users/{id}/sessions/{sid}", |_req| async {
            Ok(Response::empty(StatusCode::OK))
        });
        router
    }

    fn request() -> Request {
        http::Request::new(Full::new(Bytes::new()))
    }

    #[test]
    fn test_literal_match() {
        let m = router().match_route(&Method::GET, "/users").unwrap();
        assert_eq!(m.pattern(), "/users");
        assert!(m.params().0.is_empty());
    }

    #[test]
    fn test_param_match() {
        let m = router().match_route(&Method::GET, "/users/42").unwrap();
        assert_eq!(m.pattern(), "/users/{id}");
        assert_eq!(m.param("id"), Some("42"));
    }

    #[test]
    fn test_multiple_params() {
        let m = router()
            .match_route(&Method::DELETE, "/users/7/sessions/abc")
            .unwrap();
        assert_eq!(m.pattern(), "/users/{id}/sessions/{sid}");
        assert_eq!(m.param("id"), Some("7"));
        assert_eq!(m.param("sid"), Some("abc"));
    }

    #[test]
    fn test_literal_beats_param() {
        let m = router().match_route(&Method::GET, "/users/me").unwrap();
        assert_eq!(m.pattern(), "/users/me");
    }

    #[test]
    fn test_trailing_slash_is_ignored() {
        let m = router().match_route(&Method::GET, "/users/").unwrap();
        assert_eq!(m.pattern(), "/users");
    }

    #[test]
    fn test_no_match() {
        let router = router();
        assert!(router.match_route(&Method::GET, "/health").is_none());
        assert!(router.match_route(&Method::POST, "/users").is_none());
        assert!(router.match_route(&Method::GET, "/users/1/extra").is_none());
    }

    #[test]
    fn test_route_count() {
        assert_eq!(Router::new().route_count(), 0);
        assert_eq!(router().route_count(), 4);
    }

    #[tokio::test]
    async fn test_handler_is_invoked() {
        let m = router().match_route(&Method::GET, "/users/me").unwrap();
        let (_, _, handler) = m.into_parts();
        let response = handler(request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }
}
