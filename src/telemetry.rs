//! Telemetry utilities for operation timing and tracing spans.

use std::time::Instant;

/// Guard for timing a host operation and recording metrics.
///
/// Records operation latency when dropped.
pub struct OperationTimer {
    operation: &'static str,
    start: Instant,
}

impl OperationTimer {
    /// Start timing an operation.
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            start: Instant::now(),
        }
    }
}

impl Drop for OperationTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        crate::metrics::record_operation(self.operation, duration);
    }
}

/// Standardized span constructors for replication observability.
pub mod spans {
    use tracing::{Span, info_span};

    /// Create a span for an authority-side array.
    pub fn array(name: &str) -> Span {
        info_span!("array", name = %name)
    }

    /// Create a span for one replica of an array.
    pub fn replica(array: &str, index: usize) -> Span {
        info_span!("replica", array = %array, index)
    }

    /// Create a span for a replication link.
    pub fn link(array: &str, replicas: usize) -> Span {
        info_span!("link", array = %array, replicas)
    }
}
