//! End-to-end pipeline integration tests.
//!
//! These tests drive whole requests through the pipeline with the real
//! stages and a fresh metrics registry:
//!
//! 1. Context init - correlation ID, ingress log
//! 2. Handler
//! 3. Error trap - failures only
//! 4. Metrics recorder

use bytes::Bytes;
use http::{Method, Request as HttpRequest, StatusCode};
use http_body_util::{BodyExt, Full};
use std::sync::Arc;
use std::time::Duration;
use vigil_core::{HandlerError, RequestId};
use vigil_middleware::{
    stages::{MetricObservation, TrapDisposition, GENERIC_ERROR_MESSAGE},
    HandlerFailure, MatchedRoute, Pipeline, Request, Response, ResponseExt,
    CORRELATION_ID_HEADER,
};
use vigil_telemetry::logging::capture::CapturedLogs;
use vigil_telemetry::logging::fields;
use vigil_telemetry::metrics::{MetricsConfig, HTTP_REQUEST_COUNTER, HTTP_REQUEST_DURATION_MS};
use vigil_telemetry::MetricsRegistry;

fn registry() -> Arc<MetricsRegistry> {
    Arc::new(MetricsRegistry::new(&MetricsConfig::default()).expect("registry"))
}

fn pipeline(registry: &Arc<MetricsRegistry>) -> Pipeline {
    Pipeline::builder(registry.clone()).build()
}

fn make_request(method: Method, path: &str, route: Option<&str>) -> Request {
    let mut request = HttpRequest::builder()
        .method(method)
        .uri(path)
        .body(Full::new(Bytes::new()))
        .unwrap();
    if let Some(route) = route {
        request
            .extensions_mut()
            .insert(MatchedRoute(route.to_string()));
    }
    request
}

fn count(registry: &MetricsRegistry, route: &str, method: &str, status: &str) -> Option<f64> {
    registry.sample(
        HTTP_REQUEST_COUNTER,
        &[("route", route), ("method", method), ("status", status)],
    )
}

fn duration_count(registry: &MetricsRegistry, route: &str) -> Option<f64> {
    registry.sample(
        &format!("{HTTP_REQUEST_DURATION_MS}_count"),
        &[("route", route)],
    )
}

async fn body_string(response: Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

// ============================================================================
// Scenario A: no handler for the route
// ============================================================================

#[tokio::test]
async fn test_unhandled_route_gets_generic_500() {
    let registry = registry();
    let pipeline = pipeline(&registry);

    let (ctx, response) = pipeline
        .process_with_context(make_request(Method::GET, "/health", None), |_ctx, _req| {
            Box::pin(async { Err(HandlerFailure::from(HandlerError::opaque())) })
        })
        .await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(ctx.get_extension::<TrapDisposition>(), Some(&TrapDisposition::Replaced));
    let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(body, serde_json::json!({ "error": GENERIC_ERROR_MESSAGE }));

    assert_eq!(count(&registry, "/health", "GET", "500"), Some(1.0));
    assert_eq!(duration_count(&registry, "/health"), Some(1.0));
}

// ============================================================================
// Scenario B: classified failure before anything was written
// ============================================================================

#[tokio::test]
async fn test_classified_failure_keeps_status() {
    let registry = registry();
    let pipeline = pipeline(&registry);

    let response = pipeline
        .process(
            make_request(Method::GET, "/users/17", Some("/users/{id}")),
            |_ctx, _req| Box::pin(async { Err(HandlerFailure::from(HandlerError::not_found("no user 17"))) }),
        )
        .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(body_string(response).await.is_empty());

    assert_eq!(count(&registry, "/users/{id}", "GET", "404"), Some(1.0));
    assert_eq!(count(&registry, "/users/17", "GET", "404"), None);
}

// ============================================================================
// Scenario C: failure after the response was committed
// ============================================================================

#[tokio::test]
async fn test_failure_after_commit_keeps_response() {
    let registry = registry();
    let pipeline = pipeline(&registry);
    let logs = CapturedLogs::new();
    let _guard = tracing::subscriber::set_default(logs.subscriber());

    let (ctx, response) = pipeline
        .process_with_context(
            make_request(Method::POST, "/reports", Some("/reports")),
            |_ctx, _req| {
                Box::pin(async {
                    let committed = Response::new(Full::new(Bytes::from_static(b"{\"id\":1}")));
                    Err(HandlerFailure::after_commit(
                        committed,
                        HandlerError::unexpected("audit write failed"),
                    ))
                })
            },
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "{\"id\":1}");
    assert_eq!(ctx.get_extension::<TrapDisposition>(), Some(&TrapDisposition::HeadersSent));

    let warning = logs
        .find("headers sent before error handler invoked")
        .expect("warning logged");
    let id = ctx.request_id().to_string();
    assert_eq!(warning.field(fields::CORRELATION_ID), Some(id.as_str()));
    assert_eq!(warning.field(fields::ERROR_MESSAGE), Some("audit write failed"));
    assert!(logs.events().iter().all(|e| e.level != tracing::Level::ERROR));

    assert_eq!(count(&registry, "/reports", "POST", "200"), Some(1.0));
}

// ============================================================================
// Scenario D: concurrent requests to different routes
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_routes_are_isolated() {
    let registry = registry();
    let pipeline = Arc::new(pipeline(&registry));

    let slow = {
        let pipeline = pipeline.clone();
        tokio::spawn(async move {
            pipeline
                .process_with_context(make_request(Method::GET, "/a", Some("/a")), |_ctx, _req| {
                    Box::pin(async {
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok(Response::empty(StatusCode::OK))
                    })
                })
                .await
        })
    };
    let failing = {
        let pipeline = pipeline.clone();
        tokio::spawn(async move {
            pipeline
                .process_with_context(make_request(Method::GET, "/b", Some("/b")), |_ctx, _req| {
                    Box::pin(async { Err(HandlerFailure::from(HandlerError::unexpected("b broke"))) })
                })
                .await
        })
    };

    let (ctx_a, response_a) = slow.await.unwrap();
    let (ctx_b, response_b) = failing.await.unwrap();

    assert_ne!(ctx_a.request_id(), ctx_b.request_id());
    assert_eq!(response_a.status(), StatusCode::OK);
    assert_eq!(response_b.status(), StatusCode::INTERNAL_SERVER_ERROR);

    assert_eq!(count(&registry, "/a", "GET", "200"), Some(1.0));
    assert_eq!(count(&registry, "/a", "GET", "500"), None);
    assert_eq!(count(&registry, "/b", "GET", "500"), Some(1.0));
    assert_eq!(count(&registry, "/b", "GET", "200"), None);
    assert_eq!(duration_count(&registry, "/a"), Some(1.0));
    assert_eq!(duration_count(&registry, "/b"), Some(1.0));

    let a_ms = ctx_a.get_extension::<MetricObservation>().unwrap().duration_ms;
    assert!(a_ms >= 20.0);
}

// ============================================================================
// Properties
// ============================================================================

#[tokio::test]
async fn test_correlation_id_is_v4_and_echoed() {
    let pipeline = pipeline(&registry());

    let (ctx, response) = pipeline
        .process_with_context(make_request(Method::GET, "/ping", None), |_ctx, _req| {
            Box::pin(async { Ok(Response::empty(StatusCode::OK)) })
        })
        .await;

    let header = response
        .headers()
        .get(CORRELATION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .expect("correlation header");
    let parsed = RequestId::parse_v4(header).expect("header is a v4 UUID");
    assert_eq!(parsed, ctx.request_id());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_requests_are_all_counted() {
    const REQUESTS: usize = 200;

    let registry = registry();
    let pipeline = Arc::new(pipeline(&registry));

    let tasks: Vec<_> = (0..REQUESTS)
        .map(|_| {
            let pipeline = pipeline.clone();
            tokio::spawn(async move {
                pipeline
                    .process(
                        make_request(Method::PUT, "/items/1", Some("/items/{id}")),
                        |_ctx, _req| {
                            Box::pin(async {
                                tokio::task::yield_now().await;
                                Ok(Response::empty(StatusCode::ACCEPTED))
                            })
                        },
                    )
                    .await
            })
        })
        .collect();

    for task in tasks {
        assert_eq!(task.await.unwrap().status(), StatusCode::ACCEPTED);
    }

    #[allow(clippy::cast_precision_loss)]
    let expected = REQUESTS as f64;
    assert_eq!(count(&registry, "/items/{id}", "PUT", "202"), Some(expected));
    assert_eq!(duration_count(&registry, "/items/{id}"), Some(expected));
}

#[tokio::test]
async fn test_log_order_for_failed_request() {
    let registry = registry();
    let pipeline = pipeline(&registry);
    let logs = CapturedLogs::new();
    let _guard = tracing::subscriber::set_default(logs.subscriber());

    let (ctx, _) = pipeline
        .process_with_context(make_request(Method::GET, "/orders", None), |_ctx, _req| {
            Box::pin(async { Err(HandlerFailure::from(HandlerError::unexpected("db timeout"))) })
        })
        .await;

    let id = ctx.request_id().to_string();
    let events = logs.events();
    let position = |message: &str| {
        events
            .iter()
            .position(|e| e.message == message && e.field(fields::CORRELATION_ID) == Some(id.as_str()))
            .unwrap_or_else(|| panic!("missing log: {message}"))
    };

    let ingress = position("request received");
    let error = position("db timeout");
    let completed = position("request completed");
    assert!(ingress < error);
    assert!(error < completed);

    let errors = events
        .iter()
        .filter(|e| e.level == tracing::Level::ERROR)
        .count();
    assert_eq!(errors, 1);

    let ingress_records = events
        .iter()
        .filter(|e| e.message == "request received")
        .count();
    assert_eq!(ingress_records, 1);

    let observation = ctx.get_extension::<MetricObservation>().unwrap();
    assert!(observation.duration_ms.is_finite());
    assert!(observation.duration_ms >= 0.0);
}

#[tokio::test]
async fn test_trusted_incoming_id_is_echoed() {
    use vigil_middleware::ContextInitializer;

    let pipeline = Pipeline::builder(registry())
        .context_initializer(ContextInitializer::trust_incoming())
        .build();
    let incoming = "3f2b8c1e-9d4a-4c6b-8e2f-1a2b3c4d5e6f";
    let mut request = make_request(Method::GET, "/ping", None);
    request
        .headers_mut()
        .insert(CORRELATION_ID_HEADER, http::HeaderValue::from_static(incoming));

    let response = pipeline
        .process(request, |_ctx, _req| {
            Box::pin(async { Ok(Response::empty(StatusCode::OK)) })
        })
        .await;

    assert_eq!(response.headers().get(CORRELATION_ID_HEADER).unwrap(), incoming);
}
