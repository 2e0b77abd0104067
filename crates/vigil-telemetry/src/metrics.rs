//! Prometheus metrics registry for HTTP requests.
//!
//! # Standard Metrics
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `http_request_duration_ms` | Histogram | `route` | Request latency in milliseconds |
//! | `http_request_counter` | Counter | `route`, `method`, `status` | Completed requests |
//! | `process_start_time_seconds` | Gauge | - | Unix time the registry was created |
//! | `process_uptime_seconds` | Gauge | - | Seconds since the registry was created |
//! | `process_resident_memory_bytes` | Gauge | - | Resident set size (Linux only) |
//!
//! The registry owns its recorder instead of installing a global one, so it
//! can be constructed once at startup and handed to every component that
//! needs it, and tests can build a fresh instance each time.
//!
//! # Example
//!
//! ```
//! use vigil_telemetry::metrics::{MetricsConfig, MetricsRegistry};
//!
//! let registry = MetricsRegistry::new(&MetricsConfig::default()).unwrap();
//! registry.observe_duration("/users/{id}", 12.5);
//! registry.increment_count("/users/{id}", "GET", 200);
//!
//! let count = registry.sample(
//!     "http_request_counter",
//!     &[("route", "/users/{id}"), ("method", "GET"), ("status", "200")],
//! );
//! assert_eq!(count, Some(1.0));
//! ```

use crate::error::TelemetryError;
use crate::TelemetryResult;
use metrics::{Gauge, Key, Label, Level, Metadata, Recorder};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle, PrometheusRecorder};
use std::fmt;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Request duration histogram name.
pub const HTTP_REQUEST_DURATION_MS: &str = "http_request_duration_ms";

/// Request counter name.
pub const HTTP_REQUEST_COUNTER: &str = "http_request_counter";

/// Process start time gauge name.
pub const PROCESS_START_TIME_SECONDS: &str = "process_start_time_seconds";

/// Process uptime gauge name.
pub const PROCESS_UPTIME_SECONDS: &str = "process_uptime_seconds";

/// Resident memory gauge name.
pub const PROCESS_RESIDENT_MEMORY_BYTES: &str = "process_resident_memory_bytes";

/// Default histogram buckets for request duration, in milliseconds.
pub const DEFAULT_DURATION_BUCKETS_MS: [f64; 9] =
    [0.1, 5.0, 15.0, 50.0, 100.0, 200.0, 300.0, 400.0, 500.0];

static METADATA: Metadata<'static> =
    Metadata::new(module_path!(), Level::INFO, Some(module_path!()));

/// Metrics configuration.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Histogram buckets for request duration, in milliseconds.
    pub duration_buckets: Vec<f64>,

    /// Whether to register the default process metrics.
    pub process_metrics: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            duration_buckets: DEFAULT_DURATION_BUCKETS_MS.to_vec(),
            process_metrics: true,
        }
    }
}

/// Process-level gauges refreshed on every render.
struct ProcessCollector {
    started_at: Instant,
    uptime: Gauge,
    resident_memory: Gauge,
}

impl ProcessCollector {
    fn register(recorder: &PrometheusRecorder) -> Self {
        let start_time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0.0, |since_epoch| since_epoch.as_secs_f64());
        recorder
            .register_gauge(&Key::from_name(PROCESS_START_TIME_SECONDS), &METADATA)
            .set(start_time);

        let collector = Self {
            started_at: Instant::now(),
            uptime: recorder.register_gauge(&Key::from_name(PROCESS_UPTIME_SECONDS), &METADATA),
            resident_memory: recorder
                .register_gauge(&Key::from_name(PROCESS_RESIDENT_MEMORY_BYTES), &METADATA),
        };
        collector.refresh();
        collector
    }

    fn refresh(&self) {
        self.uptime.set(self.started_at.elapsed().as_secs_f64());
        if let Some(bytes) = resident_memory_bytes() {
            self.resident_memory.set(bytes);
        }
    }
}

/// Metrics registry for HTTP request instrumentation.
///
/// Both update operations are safe to call concurrently from any number of
/// in-flight requests: the underlying counters and histogram buckets are
/// atomic, so no update is lost and no caller ever performs a
/// read-modify-write of its own.
pub struct MetricsRegistry {
    recorder: PrometheusRecorder,
    handle: PrometheusHandle,
    process: Option<ProcessCollector>,
}

impl MetricsRegistry {
    /// Creates a new registry.
    ///
    /// # Errors
    ///
    /// Returns `TelemetryError::MetricsInit` if the duration buckets are empty.
    pub fn new(config: &MetricsConfig) -> TelemetryResult<Self> {
        let recorder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Full(HTTP_REQUEST_DURATION_MS.to_string()),
                &config.duration_buckets,
            )
            .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?
            .build_recorder();
        let handle = recorder.handle();

        register_metric_descriptions(&recorder);

        let process = config
            .process_metrics
            .then(|| ProcessCollector::register(&recorder));

        Ok(Self {
            recorder,
            handle,
            process,
        })
    }

    /// Records one request duration, in milliseconds, under `route`.
    pub fn observe_duration(&self, route: &str, value_ms: f64) {
        let key = Key::from_parts(
            HTTP_REQUEST_DURATION_MS,
            vec![Label::new("route", route.to_owned())],
        );
        self.recorder
            .register_histogram(&key, &METADATA)
            .record(value_ms);
    }

    /// Increments the request counter for `(route, method, status)`.
    pub fn increment_count(&self, route: &str, method: &str, status: u16) {
        let key = Key::from_parts(
            HTTP_REQUEST_COUNTER,
            vec![
                Label::new("route", route.to_owned()),
                Label::new("method", method.to_owned()),
                Label::new("status", status.to_string()),
            ],
        );
        self.recorder.register_counter(&key, &METADATA).increment(1);
    }

    /// Renders all metrics in Prometheus text format.
    #[must_use]
    pub fn render(&self) -> String {
        if let Some(process) = &self.process {
            process.refresh();
        }
        self.handle.render()
    }

    /// Returns the value of a single rendered sample.
    ///
    /// `labels` must name the complete label set of the sample. Histogram
    /// series are addressed by their suffixed names, e.g.
    /// `http_request_duration_ms_count`.
    #[must_use]
    pub fn sample(&self, name: &str, labels: &[(&str, &str)]) -> Option<f64> {
        find_sample(&self.render(), name, labels)
    }
}

impl fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricsRegistry")
            .field("process_metrics", &self.process.is_some())
            .finish_non_exhaustive()
    }
}

/// Registers descriptions for all standard metrics.
fn register_metric_descriptions(recorder: &PrometheusRecorder) {
    recorder.describe_histogram(
        HTTP_REQUEST_DURATION_MS.into(),
        None,
        "Duration of HTTP requests in ms".into(),
    );
    recorder.describe_counter(
        HTTP_REQUEST_COUNTER.into(),
        None,
        "Number of requests for this endpoint".into(),
    );
    recorder.describe_gauge(
        PROCESS_START_TIME_SECONDS.into(),
        None,
        "Start time of the process since unix epoch in seconds".into(),
    );
    recorder.describe_gauge(
        PROCESS_UPTIME_SECONDS.into(),
        None,
        "Seconds since the metrics registry was created".into(),
    );
    recorder.describe_gauge(
        PROCESS_RESIDENT_MEMORY_BYTES.into(),
        None,
        "Resident memory size in bytes".into(),
    );
}

#[cfg(target_os = "linux")]
fn resident_memory_bytes() -> Option<f64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    let kib = status
        .lines()
        .find_map(|line| line.strip_prefix("VmRSS:"))?
        .trim()
        .trim_end_matches("kB")
        .trim()
        .parse::<f64>()
        .ok()?;
    Some(kib * 1024.0)
}

#[cfg(not(target_os = "linux"))]
fn resident_memory_bytes() -> Option<f64> {
    None
}

/// Finds one sample in Prometheus text exposition output.
///
/// Matches on the exact metric name and the exact label set.
#[must_use]
pub fn find_sample(rendered: &str, name: &str, labels: &[(&str, &str)]) -> Option<f64> {
    rendered
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .find_map(|line| {
            let (series, value) = line.rsplit_once(' ')?;
            let (metric, label_set) = match series.split_once('{') {
                Some((metric, rest)) => (metric, parse_labels(rest.strip_suffix('}')?)?),
                None => (series, Vec::new()),
            };
            let matches = metric == name
                && label_set.len() == labels.len()
                && labels
                    .iter()
                    .all(|(k, v)| label_set.iter().any(|(lk, lv)| lk == k && lv == v));
            if matches {
                value.parse().ok()
            } else {
                None
            }
        })
}

/// Parses `k1="v1",k2="v2"` into pairs, undoing exposition escaping.
fn parse_labels(input: &str) -> Option<Vec<(String, String)>> {
    let mut pairs = Vec::new();
    let mut rest = input;
    while !rest.is_empty() {
        let (key, after_key) = rest.split_once("=\"")?;
        let mut value = String::new();
        let mut chars = after_key.char_indices();
        let end = loop {
            let (idx, c) = chars.next()?;
            match c {
                '\\' => match chars.next()?.1 {
                    'n' => value.push('\n'),
                    other => value.push(other),
                },
                '"' => break idx,
                other => value.push(other),
            }
        };
        pairs.push((key.trim_start_matches(',').trim().to_string(), value));
        rest = &after_key[end + 1..];
    }
    Some(pairs)
}
