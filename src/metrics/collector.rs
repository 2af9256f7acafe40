//! Metrics collector using prometheus-client.
//!
//! Provides metrics for invocation counts, latency, exclusions, and backend health.

use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;
use std::sync::Arc;

/// Labels for invocation metrics.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RequestLabels {
    pub backend: String,
    pub outcome: Outcome,
}

/// Labels for per-backend metrics.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct BackendLabels {
    pub backend: String,
}

/// Outcome of a dispatched invocation.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum Outcome {
    Success,
    Failure,
}

/// Collects and stores all metrics.
#[derive(Clone)]
pub struct MetricsCollector {
    inner: Arc<MetricsCollectorInner>,
}

struct MetricsCollectorInner {
    /// Total invocations counter, by backend and outcome.
    requests_total: Family<RequestLabels, Counter>,
    /// Invocation duration histogram (in seconds).
    request_duration_seconds: Family<BackendLabels, Histogram>,
    /// Invocations rejected because every backend was excluded.
    no_backend_available: Counter,
    /// Backend exclusions counter.
    exclusions_total: Family<BackendLabels, Counter>,
    /// Backends readmitted by the recovery sweeper.
    sweeper_recoveries_total: Family<BackendLabels, Counter>,
    /// Backend health gauge (1 = healthy, 0 = excluded).
    backend_healthy: Family<BackendLabels, Gauge>,
    /// In-flight invocations gauge.
    in_flight_requests: Family<BackendLabels, Gauge>,
    /// The prometheus registry.
    registry: Registry,
}

impl MetricsCollector {
    /// Create a new metrics collector.
    pub fn new() -> Self {
        let mut registry = Registry::default();

        // Create metrics
        let requests_total = Family::<RequestLabels, Counter>::default();
        let request_duration_seconds = Family::<BackendLabels, Histogram>::new_with_constructor(
            || {
                // Buckets: 1ms, 2.5ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 2.5s, 5s, 10s
                Histogram::new(exponential_buckets(0.001, 2.5, 13))
            },
        );
        let no_backend_available = Counter::default();
        let exclusions_total = Family::<BackendLabels, Counter>::default();
        let sweeper_recoveries_total = Family::<BackendLabels, Counter>::default();
        let backend_healthy = Family::<BackendLabels, Gauge>::default();
        let in_flight_requests = Family::<BackendLabels, Gauge>::default();

        // Register metrics
        registry.register(
            "rudder_requests",
            "Total number of invocations dispatched",
            requests_total.clone(),
        );
        registry.register(
            "rudder_request_duration_seconds",
            "Invocation duration in seconds",
            request_duration_seconds.clone(),
        );
        registry.register(
            "rudder_no_backend_available",
            "Invocations rejected because no backend was available",
            no_backend_available.clone(),
        );
        registry.register(
            "rudder_exclusions",
            "Total number of backend exclusions",
            exclusions_total.clone(),
        );
        registry.register(
            "rudder_sweeper_recoveries",
            "Backends readmitted by the recovery sweeper",
            sweeper_recoveries_total.clone(),
        );
        registry.register(
            "rudder_backend_healthy",
            "Backend health status (1=healthy, 0=excluded)",
            backend_healthy.clone(),
        );
        registry.register(
            "rudder_in_flight_requests",
            "Number of invocations currently in flight",
            in_flight_requests.clone(),
        );

        Self {
            inner: Arc::new(MetricsCollectorInner {
                requests_total,
                request_duration_seconds,
                no_backend_available,
                exclusions_total,
                sweeper_recoveries_total,
                backend_healthy,
                in_flight_requests,
                registry,
            }),
        }
    }

    /// Get the prometheus registry for encoding.
    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    /// Record a completed invocation.
    pub fn record_invocation(&self, backend: &str, success: bool, duration: std::time::Duration) {
        let labels = RequestLabels {
            backend: backend.to_string(),
            outcome: if success {
                Outcome::Success
            } else {
                Outcome::Failure
            },
        };
        self.inner.requests_total.get_or_create(&labels).inc();

        let backend_labels = BackendLabels {
            backend: backend.to_string(),
        };
        self.inner
            .request_duration_seconds
            .get_or_create(&backend_labels)
            .observe(duration.as_secs_f64());
    }

    /// Record an invocation rejected for lack of a usable backend.
    pub fn record_no_backend(&self) {
        self.inner.no_backend_available.inc();
    }

    /// Record a backend crossing its failure threshold.
    pub fn record_exclusion(&self, backend: &str) {
        let labels = BackendLabels {
            backend: backend.to_string(),
        };
        self.inner.exclusions_total.get_or_create(&labels).inc();
    }

    /// Record a backend readmitted by the recovery sweeper.
    pub fn record_sweeper_recovery(&self, backend: &str) {
        let labels = BackendLabels {
            backend: backend.to_string(),
        };
        self.inner
            .sweeper_recoveries_total
            .get_or_create(&labels)
            .inc();
    }

    /// Update backend health status.
    pub fn set_backend_health(&self, backend: &str, healthy: bool) {
        let labels = BackendLabels {
            backend: backend.to_string(),
        };
        self.inner
            .backend_healthy
            .get_or_create(&labels)
            .set(if healthy { 1 } else { 0 });
    }

    /// Update the in-flight gauge for a backend.
    pub fn set_in_flight(&self, backend: &str, in_flight: u32) {
        let labels = BackendLabels {
            backend: backend.to_string(),
        };
        self.inner
            .in_flight_requests
            .get_or_create(&labels)
            .set(i64::from(in_flight));
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
