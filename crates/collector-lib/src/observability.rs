//! Observability for the collector process itself
//!
//! Provides:
//! - Prometheus self-metrics (pass latency, domains collected, error counts)
//! - Structured JSON lifecycle events with tracing
//!
//! Self-metrics live in the process-wide default registry and are served by
//! the HTTP API. They are separate from the per-domain gauges the sink owns.

use crate::collector::CollectionResults;
use prometheus::{
    register_histogram, register_int_counter, register_int_gauge, Histogram, IntCounter, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for pass latency (in seconds)
const PASS_LATENCY_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<CollectorMetricsInner> = OnceLock::new();

struct CollectorMetricsInner {
    pass_latency_seconds: Histogram,
    domains_collected: IntGauge,
    passes: IntCounter,
    domain_errors: IntCounter,
    enumeration_errors: IntCounter,
    push_errors: IntCounter,
}

impl CollectorMetricsInner {
    fn new() -> Self {
        Self {
            pass_latency_seconds: register_histogram!(
                "libvirt_collector_pass_latency_seconds",
                "Time spent on one collection pass over all domains",
                PASS_LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register pass_latency_seconds"),

            domains_collected: register_int_gauge!(
                "libvirt_collector_domains_collected",
                "Domains whose metrics were collected in the last pass"
            )
            .expect("Failed to register domains_collected"),

            passes: register_int_counter!(
                "libvirt_collector_passes_total",
                "Total number of collection passes"
            )
            .expect("Failed to register passes_total"),

            domain_errors: register_int_counter!(
                "libvirt_collector_domain_errors_total",
                "Domains skipped because lookup or extraction failed"
            )
            .expect("Failed to register domain_errors_total"),

            enumeration_errors: register_int_counter!(
                "libvirt_collector_enumeration_errors_total",
                "Passes aborted because active domains could not be listed"
            )
            .expect("Failed to register enumeration_errors_total"),

            push_errors: register_int_counter!(
                "libvirt_collector_push_errors_total",
                "Records the sink failed to publish"
            )
            .expect("Failed to register push_errors_total"),
        }
    }
}

/// Handle to the collector's self-metrics.
///
/// Clones share the same underlying metrics.
#[derive(Clone)]
pub struct CollectorMetrics {
    _private: (),
}

impl Default for CollectorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl CollectorMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(CollectorMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &CollectorMetricsInner {
        GLOBAL_METRICS.get_or_init(CollectorMetricsInner::new)
    }

    /// Record a completed pass
    pub fn observe_pass(&self, duration_secs: f64, results: &CollectionResults) {
        let inner = self.inner();
        inner.passes.inc();
        inner.pass_latency_seconds.observe(duration_secs);
        inner.domains_collected.set(results.collected as i64);
        inner.domain_errors.inc_by(results.skipped as u64);
        inner.push_errors.inc_by(results.push_failures as u64);
    }

    /// Record a pass that could not enumerate domains
    pub fn inc_enumeration_errors(&self) {
        let inner = self.inner();
        inner.passes.inc();
        inner.enumeration_errors.inc();
        inner.domains_collected.set(0);
    }
}

/// Structured logger for collector lifecycle events
#[derive(Clone)]
pub struct StructuredLogger {
    hypervisor_uri: String,
}

impl StructuredLogger {
    pub fn new(hypervisor_uri: impl Into<String>) -> Self {
        Self {
            hypervisor_uri: hypervisor_uri.into(),
        }
    }

    pub fn hypervisor_uri(&self) -> &str {
        &self.hypervisor_uri
    }

    pub fn log_startup(&self, version: &str, interval_secs: u64) {
        info!(
            event = "collector_started",
            hypervisor = %self.hypervisor_uri,
            collector_version = %version,
            interval_secs = interval_secs,
            "Libvirt collector started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "collector_shutdown",
            hypervisor = %self.hypervisor_uri,
            reason = %reason,
            "Libvirt collector shutting down"
        );
    }

    /// Log the outcome of a pass
    pub fn log_pass(&self, results: &CollectionResults, elapsed_ms: u128) {
        if results.is_clean() {
            info!(
                event = "collection_pass",
                hypervisor = %self.hypervisor_uri,
                domains = results.domains_seen,
                collected = results.collected,
                elapsed_ms = elapsed_ms,
                "Collection pass finished"
            );
        } else {
            warn!(
                event = "collection_pass",
                hypervisor = %self.hypervisor_uri,
                domains = results.domains_seen,
                collected = results.collected,
                skipped = results.skipped,
                push_failures = results.push_failures,
                elapsed_ms = elapsed_ms,
                "Collection pass finished with failures"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collector_metrics_observe() {
        let metrics = CollectorMetrics::new();
        let results = CollectionResults {
            domains_seen: 3,
            collected: 2,
            skipped: 1,
            push_failures: 0,
        };

        // Counters are process-wide and shared with other tests
        metrics.observe_pass(0.05, &results);
        metrics.inc_enumeration_errors();

        assert!(metrics.inner().passes.get() >= 2);
        assert!(metrics.inner().domain_errors.get() >= 1);
        assert!(metrics.inner().enumeration_errors.get() >= 1);
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("qemu:///system");
        assert_eq!(logger.hypervisor_uri, "qemu:///system");
    }
}
