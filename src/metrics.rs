// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics for observability.
//!
//! Exports Prometheus-compatible metrics for:
//! - Connection attempts per side
//! - Run outcomes and active runs
//! - Per-collection copy outcomes
//! - Batch writes
//! - Collaborator failures (history, notifications, release)
//!
//! # Metric Naming Convention
//!
//! All metrics are prefixed with `clone_` and follow Prometheus conventions:
//! - Counters end in `_total`
//! - Gauges represent current state
//! - Histograms track distributions (duration, size)
//!
//! Nothing is recorded unless the host process installs a recorder.
//!
//! # Usage
//!
//! ```rust,no_run
//! use db_clone_engine::metrics;
//! use std::time::Duration;
//!
//! metrics::record_batch_write(1000, Duration::from_millis(35));
//! metrics::record_collection_copy("copied", 1010, Duration::from_secs(2));
//! ```

use crate::error::Side;
use metrics::{counter, gauge, histogram};
use std::time::Duration;

// =============================================================================
// Connections
// =============================================================================

/// Record a connection attempt.
pub fn record_connection(side: Side, success: bool, duration: Duration) {
    let status = if success { "success" } else { "failure" };
    counter!("clone_connections_total", "side" => side.to_string(), "status" => status).increment(1);
    histogram!("clone_connect_duration_seconds", "side" => side.to_string())
        .record(duration.as_secs_f64());
}

/// Record a failed release of a connection pair.
pub fn record_release_failure() {
    counter!("clone_release_failures_total").increment(1);
}

// =============================================================================
// Runs
// =============================================================================

/// Record a finished run.
///
/// `error_kind` is the stable label from `ReplicationError::kind`, or
/// `None` for completed runs.
pub fn record_run(status: &str, error_kind: Option<&str>, duration: Duration) {
    counter!(
        "clone_runs_total",
        "status" => status.to_string(),
        "error_kind" => error_kind.unwrap_or("none").to_string()
    )
    .increment(1);
    histogram!("clone_run_duration_seconds", "status" => status.to_string())
        .record(duration.as_secs_f64());
}

/// Gauge for runs currently executing.
pub fn set_active_runs(count: usize) {
    gauge!("clone_active_runs").set(count as f64);
}

// =============================================================================
// Collections & Batches
// =============================================================================

/// Record the outcome of one collection.
pub fn record_collection_copy(outcome: &str, documents_written: u64, duration: Duration) {
    counter!("clone_collections_total", "outcome" => outcome.to_string()).increment(1);
    if documents_written > 0 {
        counter!("clone_documents_copied_total").increment(documents_written);
    }
    histogram!("clone_collection_copy_duration_seconds", "outcome" => outcome.to_string())
        .record(duration.as_secs_f64());
}

/// Record one bulk insert.
pub fn record_batch_write(size: usize, duration: Duration) {
    counter!("clone_batch_writes_total").increment(1);
    histogram!("clone_batch_size").record(size as f64);
    histogram!("clone_batch_write_duration_seconds").record(duration.as_secs_f64());
}

// =============================================================================
// Collaborators
// =============================================================================

/// Record a history write that failed after retries.
pub fn record_history_failure() {
    counter!("clone_history_write_failures_total").increment(1);
}

/// Record history SQLite retry (for SQLITE_BUSY/SQLITE_LOCKED).
pub fn record_history_retry(operation: &str) {
    counter!("clone_history_retries_total", "operation" => operation.to_string()).increment(1);
}

/// Record a notification that could not be delivered.
pub fn record_notification_failure() {
    counter!("clone_notification_failures_total").increment(1);
}
