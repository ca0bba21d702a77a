//! Prometheus metrics collection for reparrayd.
//!
//! Exposed on the HTTP endpoint served by [`crate::http`].
//!
//! - `reparray_entries_added_total{array}` - Entries added on the authority
//! - `reparray_entries_removed_total{array}` - Entries removed on the authority
//! - `reparray_errors_total{array, error}` - Failed operations by error code
//! - `reparray_operation_duration_seconds{operation}` - Host operation latency
//! - `reparray_entries{array}` - Live entries per array (gauge)
//! - `reparray_batches_sent_total{array, kind}` - Delta batches forwarded
//! - `reparray_batches_applied_total{array, kind}` - Delta batches applied by replicas

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

// ========================================================================
// Counters (monotonic increasing)
// ========================================================================

/// Entries added by array.
pub static ENTRIES_ADDED: OnceLock<IntCounterVec> = OnceLock::new();

/// Entries removed by array.
pub static ENTRIES_REMOVED: OnceLock<IntCounterVec> = OnceLock::new();

/// Failed operations by array and error code.
pub static OPERATION_ERRORS: OnceLock<IntCounterVec> = OnceLock::new();

/// Delta batches forwarded to replicas.
pub static BATCHES_SENT: OnceLock<IntCounterVec> = OnceLock::new();

/// Delta batches applied by replicas.
pub static BATCHES_APPLIED: OnceLock<IntCounterVec> = OnceLock::new();

/// Batches a replica skipped because it already held newer state.
pub static STALE_BATCHES: OnceLock<IntCounter> = OnceLock::new();

// ========================================================================
// Gauges (can increase/decrease)
// ========================================================================

/// Live entries per array.
pub static ARRAY_ENTRIES: OnceLock<IntGaugeVec> = OnceLock::new();

/// Arrays currently hosted.
pub static HOSTED_ARRAYS: OnceLock<IntGauge> = OnceLock::new();

// ========================================================================
// Histograms
// ========================================================================

/// Host operation latency by operation name.
pub static OPERATION_LATENCY: OnceLock<HistogramVec> = OnceLock::new();

/// Initialize the Prometheus metrics registry.
///
/// Must be called once at startup before any metrics are recorded.
/// Recording before `init` is a no-op.
pub fn init() {
    let r = registry();

    // Helper macro to register metric
    macro_rules! register {
        ($metric:ident, $init:expr) => {
            match $init {
                Ok(m) => {
                    if let Err(e) = r.register(Box::new(m.clone())) {
                        tracing::warn!(error = %e, concat!("Failed to register metric ", stringify!($metric)));
                    }
                    let _ = $metric.set(m);
                }
                Err(e) => {
                    tracing::error!(error = %e, concat!("Failed to create metric ", stringify!($metric)));
                }
            }
        };
    }

    register!(ENTRIES_ADDED, IntCounterVec::new(Opts::new("reparray_entries_added_total", "Entries added on the authority"), &["array"]));
    register!(ENTRIES_REMOVED, IntCounterVec::new(Opts::new("reparray_entries_removed_total", "Entries removed on the authority"), &["array"]));
    register!(OPERATION_ERRORS, IntCounterVec::new(Opts::new("reparray_errors_total", "Failed array operations by error code"), &["array", "error"]));
    register!(BATCHES_SENT, IntCounterVec::new(Opts::new("reparray_batches_sent_total", "Delta batches forwarded to replicas"), &["array", "kind"]));
    register!(BATCHES_APPLIED, IntCounterVec::new(Opts::new("reparray_batches_applied_total", "Delta batches applied by replicas"), &["array", "kind"]));
    register!(STALE_BATCHES, IntCounter::new("reparray_stale_batches_total", "Delta batches skipped as stale"));
    register!(ARRAY_ENTRIES, IntGaugeVec::new(Opts::new("reparray_entries", "Live entries per array"), &["array"]));
    register!(HOSTED_ARRAYS, IntGauge::new("reparray_hosted_arrays", "Arrays currently hosted"));
    register!(OPERATION_LATENCY, HistogramVec::new(
        HistogramOpts::new("reparray_operation_duration_seconds", "Host operation latency by type")
            .buckets(vec![0.000005, 0.00001, 0.00005, 0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05]),
        &["operation"]));
}

/// Gather all metrics and encode them in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode Prometheus metrics");
        return String::new();
    }
    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Prometheus metrics were not valid UTF-8");
            String::new()
        }
    }
}

// ============================================================================
// Helper functions for metric updates
// ============================================================================

/// Record entries added to an array.
#[inline]
pub fn record_added(array: &str, count: usize) {
    if let Some(c) = ENTRIES_ADDED.get() {
        c.with_label_values(&[array]).inc_by(count as u64);
    }
}

/// Record an entry removed from an array.
#[inline]
pub fn record_removed(array: &str) {
    if let Some(c) = ENTRIES_REMOVED.get() {
        c.with_label_values(&[array]).inc();
    }
}

/// Record a failed operation.
#[inline]
pub fn record_error(array: &str, error: &str) {
    if let Some(c) = OPERATION_ERRORS.get() {
        c.with_label_values(&[array, error]).inc();
    }
}

/// Record host operation latency.
#[inline]
pub fn record_operation(operation: &str, duration_secs: f64) {
    if let Some(h) = OPERATION_LATENCY.get() {
        h.with_label_values(&[operation]).observe(duration_secs);
    }
}

/// Update the live entry gauge for an array.
#[inline]
pub fn set_entries(array: &str, count: usize) {
    if let Some(g) = ARRAY_ENTRIES.get() {
        g.with_label_values(&[array]).set(count as i64);
    }
}

/// Drop an array's series from the entry gauge (when the array is deleted).
#[inline]
pub fn remove_array_metrics(array: &str) {
    if let Some(g) = ARRAY_ENTRIES.get() {
        let _ = g.remove_label_values(&[array]);
    }
}

#[inline]
pub fn set_hosted_arrays(count: usize) {
    if let Some(g) = HOSTED_ARRAYS.get() {
        g.set(count as i64);
    }
}

/// Record a batch forwarded by a replication link.
#[inline]
pub fn record_batch_sent(array: &str, full: bool) {
    if let Some(c) = BATCHES_SENT.get() {
        c.with_label_values(&[array, batch_kind(full)]).inc();
    }
}

/// Record a batch applied (or skipped) by a replica.
#[inline]
pub fn record_batch_applied(array: &str, full: bool, stale: bool) {
    if stale {
        if let Some(c) = STALE_BATCHES.get() {
            c.inc();
        }
        return;
    }
    if let Some(c) = BATCHES_APPLIED.get() {
        c.with_label_values(&[array, batch_kind(full)]).inc();
    }
}

fn batch_kind(full: bool) -> &'static str {
    if full { "full" } else { "incremental" }
}
