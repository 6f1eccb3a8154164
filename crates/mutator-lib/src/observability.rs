//! Observability infrastructure for the webhook
//!
//! Provides:
//! - Prometheus metrics (admission outcomes, error kinds, latencies, unresolved requests)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_int_counter_vec, Histogram, IntCounterVec,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for latency measurements (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Admission outcome labels
pub mod outcomes {
    pub const PATCHED: &str = "patched";
    pub const UNCHANGED: &str = "unchanged";
    pub const FAILED_OPEN: &str = "failed_open";
}

static GLOBAL_METRICS: OnceLock<MutatorMetricsInner> = OnceLock::new();

struct MutatorMetricsInner {
    admission_requests: IntCounterVec,
    admission_errors: IntCounterVec,
    admission_latency_seconds: Histogram,
    suggestion_lookup_latency_seconds: Histogram,
    unresolved_resources: IntCounterVec,
}

impl MutatorMetricsInner {
    fn new() -> Self {
        Self {
            admission_requests: register_int_counter_vec!(
                "ocean_rs_mutator_admission_requests_total",
                "Admission reviews answered, by outcome",
                &["outcome"]
            )
            .expect("Failed to register admission_requests_total"),

            admission_errors: register_int_counter_vec!(
                "ocean_rs_mutator_admission_errors_total",
                "Admission reviews answered fail-open, by error kind",
                &["kind"]
            )
            .expect("Failed to register admission_errors_total"),

            admission_latency_seconds: register_histogram!(
                "ocean_rs_mutator_admission_latency_seconds",
                "Time spent answering an admission review",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register admission_latency_seconds"),

            suggestion_lookup_latency_seconds: register_histogram!(
                "ocean_rs_mutator_suggestion_lookup_latency_seconds",
                "Time spent waiting for the suggestion backend",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register suggestion_lookup_latency_seconds"),

            unresolved_resources: register_int_counter_vec!(
                "ocean_rs_mutator_unresolved_resources_total",
                "Missing container requests that could not be derived",
                &["resource", "reason"]
            )
            .expect("Failed to register unresolved_resources_total"),
        }
    }
}

/// Handle to the process-wide webhook metrics
///
/// Clones share the same underlying registered metrics.
#[derive(Clone)]
pub struct MutatorMetrics {
    _private: (),
}

impl Default for MutatorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MutatorMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(MutatorMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &MutatorMetricsInner {
        GLOBAL_METRICS.get_or_init(MutatorMetricsInner::new)
    }

    pub fn inc_admission(&self, outcome: &str) {
        self.inner()
            .admission_requests
            .with_label_values(&[outcome])
            .inc();
    }

    pub fn inc_error(&self, kind: &str) {
        self.inner().admission_errors.with_label_values(&[kind]).inc();
    }

    pub fn observe_admission_latency(&self, duration_secs: f64) {
        self.inner().admission_latency_seconds.observe(duration_secs);
    }

    pub fn observe_lookup_latency(&self, duration_secs: f64) {
        self.inner()
            .suggestion_lookup_latency_seconds
            .observe(duration_secs);
    }

    pub fn inc_unresolved(&self, resource: &str, reason: &str) {
        self.inner()
            .unresolved_resources
            .with_label_values(&[resource, reason])
            .inc();
    }

}

/// Structured logger for webhook events
#[derive(Clone)]
pub struct StructuredLogger {
    cluster_id: String,
}

impl StructuredLogger {
    pub fn new(cluster_id: impl Into<String>) -> Self {
        Self {
            cluster_id: cluster_id.into(),
        }
    }

    pub fn log_startup(&self, version: &str, listen_addr: &str) {
        info!(
            event = "webhook_started",
            cluster_id = %self.cluster_id,
            version = %version,
            listen_addr = %listen_addr,
            "Resource mutator webhook started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "webhook_shutdown",
            cluster_id = %self.cluster_id,
            reason = %reason,
            "Resource mutator webhook shutting down"
        );
    }

    pub fn log_patched(&self, uid: &str, deployment: &str, operations: usize) {
        info!(
            event = "deployment_patched",
            cluster_id = %self.cluster_id,
            uid = %uid,
            deployment = %deployment,
            operations = operations,
            "Patched deployment resource requests"
        );
    }

    pub fn log_fail_open(&self, uid: &str, kind: &str, message: &str) {
        warn!(
            event = "admission_failed_open",
            cluster_id = %self.cluster_id,
            uid = %uid,
            kind = %kind,
            error = %message,
            "Admission allowed without mutation"
        );
    }

    pub fn log_unresolved(&self, deployment: &str, container: &str, resource: &str, reason: &str) {
        warn!(
            event = "resource_unresolved",
            cluster_id = %self.cluster_id,
            deployment = %deployment,
            container = %container,
            resource = %resource,
            reason = %reason,
            "Container request missing and could not be derived"
        );
    }
}
