// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Prometheus metrics for the Mongocar sidecar.
//!
//! All metrics live in a module-local registry under the `mongocar`
//! namespace and are exposed via the `/metrics` endpoint started in `main`.
//!
//! # Metrics Categories
//!
//! - **Tick Metrics** - Outcome counts and duration of reconciliation ticks
//! - **Membership Metrics** - Members added/removed, replica-set initiations
//! - **Roster Metrics** - Size of the observed peer-pod roster

use prometheus::{
    Counter, CounterVec, Encoder, Gauge, Histogram, HistogramOpts, Opts, Registry, TextEncoder,
};
use std::sync::LazyLock;
use std::time::Duration;

/// Namespace prefix for all Mongocar metrics
const METRICS_NAMESPACE: &str = "mongocar";

/// Global Prometheus metrics registry
pub static METRICS_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// ============================================================================
// Tick Metrics
// ============================================================================

/// Total number of reconciliation ticks by outcome
///
/// Labels:
/// - `outcome`: `noop`, `initialized`, `reconfigured`, `forced_reconfigured`,
///   or `error`
pub static TICKS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_ticks_total"),
        "Total number of reconciliation ticks by outcome",
    );
    let counter = CounterVec::new(opts, &["outcome"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Duration of reconciliation ticks in seconds
pub static TICK_DURATION_SECONDS: LazyLock<Histogram> = LazyLock::new(|| {
    let opts = HistogramOpts::new(
        format!("{METRICS_NAMESPACE}_tick_duration_seconds"),
        "Duration of reconciliation ticks in seconds",
    )
    .buckets(vec![0.001, 0.01, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]);
    let histogram = Histogram::with_opts(opts).unwrap();
    METRICS_REGISTRY
        .register(Box::new(histogram.clone()))
        .unwrap();
    histogram
});

/// Total number of tick errors by stage
///
/// Labels:
/// - `stage`: `orchestrator`, `database`, `status`, `mutation`, `probe`
pub static TICK_ERRORS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_tick_errors_total"),
        "Total number of tick errors by stage",
    );
    let counter = CounterVec::new(opts, &["stage"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Membership Metrics
// ============================================================================

/// Total number of members added to the replica set by this sidecar
pub static MEMBERS_ADDED_TOTAL: LazyLock<Counter> = LazyLock::new(|| {
    let counter = Counter::new(
        format!("{METRICS_NAMESPACE}_members_added_total"),
        "Total number of members added to the replica set",
    )
    .unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Total number of members removed from the replica set by this sidecar
pub static MEMBERS_REMOVED_TOTAL: LazyLock<Counter> = LazyLock::new(|| {
    let counter = Counter::new(
        format!("{METRICS_NAMESPACE}_members_removed_total"),
        "Total number of members removed from the replica set",
    )
    .unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Total number of replica-set initiations performed by this sidecar
pub static REPLSET_INITIATED_TOTAL: LazyLock<Counter> = LazyLock::new(|| {
    let counter = Counter::new(
        format!("{METRICS_NAMESPACE}_replset_initiated_total"),
        "Total number of replica-set initiations performed",
    )
    .unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Roster Metrics
// ============================================================================

/// Number of Running peer pods with addresses observed last tick
pub static PEER_PODS: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new(
        format!("{METRICS_NAMESPACE}_peer_pods"),
        "Number of Running peer pods with addresses observed last tick",
    )
    .unwrap();
    METRICS_REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

// ============================================================================
// Helper Functions
// ============================================================================

/// Record a completed tick with its outcome label.
pub fn record_tick_outcome(outcome: &str, duration: Duration) {
    TICKS_TOTAL.with_label_values(&[outcome]).inc();
    TICK_DURATION_SECONDS.observe(duration.as_secs_f64());
}

/// Record a failed tick and the stage it failed in.
pub fn record_tick_error(stage: &str, duration: Duration) {
    TICKS_TOTAL.with_label_values(&["error"]).inc();
    TICK_ERRORS_TOTAL.with_label_values(&[stage]).inc();
    TICK_DURATION_SECONDS.observe(duration.as_secs_f64());
}

/// Record a membership reconfiguration's add/remove counts.
#[allow(clippy::cast_precision_loss)]
pub fn record_membership_change(added: usize, removed: usize) {
    MEMBERS_ADDED_TOTAL.inc_by(added as f64);
    MEMBERS_REMOVED_TOTAL.inc_by(removed as f64);
}

/// Record a replica-set initiation.
pub fn record_replset_initiated() {
    REPLSET_INITIATED_TOTAL.inc();
}

/// Record the size of the filtered peer-pod roster.
#[allow(clippy::cast_precision_loss)]
pub fn set_peer_pods(count: usize) {
    PEER_PODS.set(count as f64);
}

/// Gather and encode all metrics in Prometheus text format
///
/// # Errors
/// Returns error if encoding fails
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = METRICS_REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(format!("UTF-8 error: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_tick_outcome() {
        record_tick_outcome("noop", Duration::from_millis(50));

        let counter = TICKS_TOTAL.with_label_values(&["noop"]);
        assert!(counter.get() > 0.0);
        assert!(TICK_DURATION_SECONDS.get_sample_count() > 0);
    }

    #[test]
    fn test_record_tick_error() {
        record_tick_error("status", Duration::from_millis(25));

        assert!(TICKS_TOTAL.with_label_values(&["error"]).get() > 0.0);
        assert!(TICK_ERRORS_TOTAL.with_label_values(&["status"]).get() > 0.0);
    }

    #[test]
    fn test_record_membership_change() {
        let added_before = MEMBERS_ADDED_TOTAL.get();
        let removed_before = MEMBERS_REMOVED_TOTAL.get();

        record_membership_change(2, 1);

        assert!((MEMBERS_ADDED_TOTAL.get() - added_before - 2.0).abs() < f64::EPSILON);
        assert!((MEMBERS_REMOVED_TOTAL.get() - removed_before - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_gather_metrics() {
        record_tick_outcome("reconfigured", Duration::from_millis(100));

        let result = gather_metrics();
        assert!(result.is_ok(), "Gathering metrics should succeed");

        let metrics_text = result.unwrap();
        assert!(
            metrics_text.contains("mongocar_ticks_total"),
            "Metrics should contain the tick counter"
        );
    }
}
