//! Metrics for observability.
//!
//! Exports Prometheus-compatible metrics for:
//! - Backend call counts and latency
//! - Store outcomes (complete, partial)
//! - Load outcomes and the backend that won reconciliation
//! - Query result sizes
//! - Requests rejected before any I/O
//!
//! # Metric Naming Convention
//!
//! All metrics are prefixed with `correlation_` and follow Prometheus conventions:
//! - Counters end in `_total`
//! - Histograms track distributions (duration, size)
//!
//! No recorder is installed here; without one every call is a no-op.
//!
//! # Usage
//!
//! ```rust,no_run
//! use correlation_engine::backend::BackendKind;
//! use correlation_engine::config::Operation;
//! use correlation_engine::metrics;
//! use std::time::Duration;
//!
//! metrics::record_backend_call(BackendKind::Table, Operation::Load, true, Duration::from_millis(12));
//! metrics::record_load_outcome(Some(BackendKind::Table));
//! ```

use crate::backend::BackendKind;
use crate::config::Operation;
use metrics::{counter, histogram};
use std::time::Duration;

/// Record one adapter call.
pub fn record_backend_call(backend: BackendKind, operation: Operation, success: bool, duration: Duration) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "correlation_backend_calls_total",
        "backend" => backend.as_str(),
        "operation" => operation.as_str(),
        "status" => status
    )
    .increment(1);
    histogram!(
        "correlation_backend_call_duration_seconds",
        "backend" => backend.as_str(),
        "operation" => operation.as_str()
    )
    .record(duration.as_secs_f64());
}

/// Record the end-to-end latency of an engine operation.
pub fn record_operation_latency(operation: Operation, duration: Duration) {
    histogram!("correlation_operation_duration_seconds", "operation" => operation.as_str())
        .record(duration.as_secs_f64());
}

/// Record a store: how many backends committed and how many failed.
pub fn record_store(committed: usize, failed: usize) {
    let outcome = match (committed, failed) {
        (_, 0) => "complete",
        (0, _) => "failed",
        _ => "partial",
    };
    counter!("correlation_store_total", "outcome" => outcome).increment(1);
    if failed > 0 {
        counter!("correlation_store_backend_failures_total").increment(failed as u64);
    }
}

/// Record a load; `source` is the winning backend, `None` when nothing was found.
pub fn record_load_outcome(source: Option<BackendKind>) {
    match source {
        Some(backend) => {
            counter!("correlation_load_total", "outcome" => "found", "source" => backend.as_str()).increment(1)
        }
        None => counter!("correlation_load_total", "outcome" => "not_found").increment(1),
    }
}

/// Record the number of keys a query returned.
pub fn record_query_results(count: usize) {
    counter!("correlation_query_total").increment(1);
    histogram!("correlation_query_results").record(count as f64);
}

/// Record an operation where every attempted backend failed.
pub fn record_all_backends_failed(operation: Operation) {
    counter!("correlation_all_backends_failed_total", "operation" => operation.as_str()).increment(1);
}

/// Record a request rejected before I/O (`validation`, `config`, `bad_request`, `resolution`).
pub fn record_rejected(operation: Operation, reason: &'static str) {
    counter!(
        "correlation_rejected_total",
        "operation" => operation.as_str(),
        "reason" => reason
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    // Note: The metrics crate uses global state. In tests, we just verify that
    // the functions don't panic on edge-case inputs.

    #[test]
    fn test_record_backend_call() {
        for backend in BackendKind::ALL {
            record_backend_call(backend, Operation::Store, true, Duration::from_millis(5));
            record_backend_call(backend, Operation::Load, false, Duration::ZERO);
        }
    }

    #[test]
    fn test_record_operation_latency() {
        record_operation_latency(Operation::Query, Duration::from_secs(1));
    }

    #[test]
    fn test_record_store_outcomes() {
        record_store(3, 0);
        record_store(2, 1);
        record_store(0, 3);
        // every backend dissected
        record_store(0, 0);
    }

    #[test]
    fn test_record_load_outcome() {
        record_load_outcome(Some(BackendKind::Disk));
        record_load_outcome(None);
    }

    #[test]
    fn test_record_query_and_failures() {
        record_query_results(0);
        record_query_results(100);
        record_all_backends_failed(Operation::Load);
        record_rejected(Operation::Store, "bad_request");
    }
}
