// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Prometheus metrics for the tunnel ingress operator.
//!
//! All metrics carry the `tunnel_cloudflare_io_` prefix (prometheus-safe
//! version of "tunnel.cloudflare.io").
//!
//! # Metrics Categories
//!
//! - **Reconciliation Metrics** - outcome and duration of reconcile passes
//! - **Tunnel Configuration Metrics** - writes, write-cycle attempts, lock wait
//! - **Verification Metrics** - per-hostname read-back verdicts
//! - **DNS Metrics** - CNAME upsert outcomes
//!
//! # Example
//!
//! ```rust,no_run
//! use tunnelsync::metrics::record_reconciliation;
//!
//! record_reconciliation("ready", std::time::Duration::from_secs(1));
//! ```

use prometheus::{CounterVec, Encoder, Histogram, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use std::sync::LazyLock;
use std::time::Duration;

/// Namespace prefix for all metrics (prometheus-safe)
const METRICS_NAMESPACE: &str = "tunnel_cloudflare_io";

/// Global Prometheus metrics registry
///
/// All metrics are registered in this registry and exposed via `/metrics` endpoint.
pub static METRICS_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// ============================================================================
// Reconciliation Metrics
// ============================================================================

/// Total number of reconcile passes by outcome
///
/// Labels:
/// - `outcome`: `ready`, `pending`, `disabled`, `failed`, `error`
pub static RECONCILIATION_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_reconciliations_total"),
        "Total number of tunnel ingress reconciliations by outcome",
    );
    let counter = CounterVec::new(opts, &["outcome"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Duration of reconcile passes in seconds, including time spent waiting for the write lock
pub static RECONCILIATION_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    let opts = HistogramOpts::new(
        format!("{METRICS_NAMESPACE}_reconciliation_duration_seconds"),
        "Duration of tunnel ingress reconciliations in seconds by outcome",
    )
    .buckets(vec![0.01, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0]);
    let histogram = HistogramVec::new(opts, &["outcome"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(histogram.clone()))
        .unwrap();
    histogram
});

// ============================================================================
// Tunnel Configuration Metrics
// ============================================================================

/// Whole-document writes of the tunnel configuration
///
/// Labels:
/// - `result`: `success` or `error`
pub static REMOTE_WRITES_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_tunnel_config_writes_total"),
        "Total number of tunnel configuration writes by result",
    );
    let counter = CounterVec::new(opts, &["result"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Write cycles used per synchronization
///
/// Labels:
/// - `outcome`: `consistent`, `drift_accepted`, `failed`
pub static WRITE_CYCLE_ATTEMPTS: LazyLock<HistogramVec> = LazyLock::new(|| {
    let opts = HistogramOpts::new(
        format!("{METRICS_NAMESPACE}_write_cycle_attempts"),
        "Write-verify cycles used per tunnel configuration sync",
    )
    .buckets(vec![1.0, 2.0, 3.0, 4.0, 5.0, 8.0, 10.0]);
    let histogram = HistogramVec::new(opts, &["outcome"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(histogram.clone()))
        .unwrap();
    histogram
});

/// Time spent waiting for the process-wide write lock
pub static WRITE_LOCK_WAIT_SECONDS: LazyLock<Histogram> = LazyLock::new(|| {
    let opts = HistogramOpts::new(
        format!("{METRICS_NAMESPACE}_write_lock_wait_seconds"),
        "Time reconciles spend waiting for the tunnel configuration lock",
    )
    .buckets(vec![0.001, 0.01, 0.1, 1.0, 5.0, 15.0, 30.0, 60.0, 120.0]);
    let histogram = Histogram::with_opts(opts).unwrap();
    METRICS_REGISTRY
        .register(Box::new(histogram.clone()))
        .unwrap();
    histogram
});

// ============================================================================
// Verification Metrics
// ============================================================================

/// Read-back verdicts per managed hostname
///
/// Labels:
/// - `verdict`: `ok`, `ephemeral_address_leaked`, `mismatch`, `missing`
pub static VERIFICATION_VERDICTS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_verification_verdicts_total"),
        "Total number of read-back verdicts by classification",
    );
    let counter = CounterVec::new(opts, &["verdict"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// DNS Metrics
// ============================================================================

/// CNAME upserts by outcome
///
/// Labels:
/// - `outcome`: `created`, `updated`, `unchanged`, `error`
pub static DNS_UPSERTS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_dns_upserts_total"),
        "Total number of DNS CNAME upserts by outcome",
    );
    let counter = CounterVec::new(opts, &["outcome"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Record a finished reconcile pass
pub fn record_reconciliation(outcome: &str, duration: Duration) {
    RECONCILIATION_TOTAL.with_label_values(&[outcome]).inc();
    RECONCILIATION_DURATION_SECONDS
        .with_label_values(&[outcome])
        .observe(duration.as_secs_f64());
}

pub fn record_remote_write(success: bool) {
    let result = if success { "success" } else { "error" };
    REMOTE_WRITES_TOTAL.with_label_values(&[result]).inc();
}

/// Record the write cycles one synchronization used
pub fn record_write_cycles(outcome: &str, attempts: u32) {
    WRITE_CYCLE_ATTEMPTS
        .with_label_values(&[outcome])
        .observe(f64::from(attempts));
}

pub fn record_lock_wait(waited: Duration) {
    WRITE_LOCK_WAIT_SECONDS.observe(waited.as_secs_f64());
}

pub fn record_verification_verdict(verdict: &str) {
    VERIFICATION_VERDICTS_TOTAL
        .with_label_values(&[verdict])
        .inc();
}

pub fn record_dns_upsert(outcome: &str) {
    DNS_UPSERTS_TOTAL.with_label_values(&[outcome]).inc();
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
