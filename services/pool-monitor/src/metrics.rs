//! Prometheus metrics exposition
//!
//! The pool crates record through the `metrics` facade:
//!
//! - `credpool_selections_total` (counter): label `platform`
//! - `credpool_invalidations_total` (counter): label `platform`
//! - `credpool_acquire_total` (counter): labels `platform`, `outcome`
//! - `credpool_probe_duration_seconds` (histogram): label `platform`
//!
//! This module installs the recorder and adds the per-platform credential
//! gauges refreshed on each health check.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and return a handle for rendering.
///
/// `credpool_probe_duration_seconds` gets explicit buckets so it renders
/// as a histogram (`_bucket` lines) rather than a summary. The range covers
/// fast session endpoints through the probe timeout ceiling.
pub fn install_recorder() -> PrometheusHandle {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            metrics_exporter_prometheus::Matcher::Full(
                "credpool_probe_duration_seconds".to_string(),
            ),
            &[0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0],
        )
        .expect("failed to set histogram buckets")
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

/// Refresh the per-platform credential gauges.
pub fn record_pool_counts(platform: &str, active: u64, invalid: u64) {
    metrics::gauge!("credpool_credentials", "platform" => platform.to_string(), "status" => "active")
        .set(active as f64);
    metrics::gauge!("credpool_credentials", "platform" => platform.to_string(), "status" => "invalid")
        .set(invalid as f64);
}
