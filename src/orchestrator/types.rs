// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Run model.
//!
//! # State Transitions
//!
//! ```text
//!            begin()
//! Pending ───────────→ Running ──── complete() ───→ Completed
//!                         │
//!                         └──────── fail() ───────→ Failed
//! ```
//!
//! Terminal states are final. `end_time` and `duration_ms` are stamped by
//! the transition into a terminal state and never before.
//!
//! Only the orchestrator mutates a run; the mutators are crate-private.

use crate::backend::CollectionKind;
use crate::connection::redact_uri;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A source/destination pair to clone, as handed over by the job registry.
///
/// URIs are ready to use (already decrypted). `Debug` redacts passwords.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationJob {
    pub job_id: String,
    pub job_name: String,
    pub source_uri: String,
    pub destination_uri: String,
}

impl ReplicationJob {
    pub fn new(
        job_id: impl Into<String>,
        job_name: impl Into<String>,
        source_uri: impl Into<String>,
        destination_uri: impl Into<String>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            job_name: job_name.into(),
            source_uri: source_uri.into(),
            destination_uri: destination_uri.into(),
        }
    }
}

impl std::fmt::Debug for ReplicationJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicationJob")
            .field("job_id", &self.job_id)
            .field("job_name", &self.job_name)
            .field("source_uri", &redact_uri(&self.source_uri))
            .field("destination_uri", &redact_uri(&self.destination_uri))
            .finish()
    }
}

/// Status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Created, not started yet.
    Pending,
    /// Connections acquired or being acquired; collections being copied.
    Running,
    /// Reached the end of the collection loop. Individual collections
    /// may still have failed; see `collections`.
    Completed,
    /// A fatal error (connection, empty source, cancellation) ended the run.
    Failed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RunStatus::Pending),
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            other => Err(format!("unknown run status: {}", other)),
        }
    }
}

/// What happened to one collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CopyOutcome {
    /// Every document read from the cursor was written.
    ///
    /// `counted` is only the pre-copy estimate. If the source shrinks
    /// between count and read, fewer documents (possibly none) are read,
    /// the destination has still been cleared, and the outcome is `Copied`.
    Copied,
    /// Source had zero documents; destination untouched.
    Empty,
    /// `system.*` collection; counted as processed, never copied.
    System,
    /// Count, clear, stream or write failed.
    Failed,
    /// Cancellation was observed mid-copy. Partial writes are left as-is.
    Cancelled,
}

impl CopyOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CopyOutcome::Copied => "copied",
            CopyOutcome::Empty => "empty",
            CopyOutcome::System => "system",
            CopyOutcome::Failed => "failed",
            CopyOutcome::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for CopyOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of copying a single collection.
///
/// Produced by the batch copier, consumed by the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionCopyResult {
    pub name: String,
    /// Count reported by the source before copying.
    pub counted: u64,
    /// Documents read from the source cursor.
    pub seen: u64,
    /// Documents acknowledged by the destination.
    pub written: u64,
    pub outcome: CopyOutcome,
    pub error: Option<String>,
    pub duration: Duration,
}

impl CollectionCopyResult {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, CopyOutcome::Copied | CopyOutcome::Empty)
    }
}

/// Per-collection line on a run record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionSummary {
    pub name: String,
    pub kind: String,
    pub documents_counted: u64,
    pub documents_written: u64,
    pub outcome: CopyOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One execution of a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationRun {
    pub run_id: String,
    pub job_id: String,
    pub job_name: String,
    pub status: RunStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub source_database_name: Option<String>,
    pub destination_database_name: Option<String>,
    pub collections_total: u64,
    pub collections_processed: u64,
    pub documents_total: u64,
    pub documents_cloned: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Stable error label (see [`ReplicationError::kind`](crate::ReplicationError::kind)).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(default)]
    pub collections: Vec<CollectionSummary>,
}

impl ReplicationRun {
    /// New pending run for `job` with a fresh UUID.
    pub fn new(job: &ReplicationJob) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            job_id: job.job_id.clone(),
            job_name: job.job_name.clone(),
            status: RunStatus::Pending,
            start_time: Utc::now(),
            end_time: None,
            duration_ms: None,
            source_database_name: None,
            destination_database_name: None,
            collections_total: 0,
            collections_processed: 0,
            documents_total: 0,
            documents_cloned: 0,
            error_message: None,
            error_kind: None,
            collections: Vec::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Collections whose copy failed or was cancelled.
    pub fn failed_collections(&self) -> impl Iterator<Item = &CollectionSummary> {
        self.collections
            .iter()
            .filter(|c| matches!(c.outcome, CopyOutcome::Failed | CopyOutcome::Cancelled))
    }

    pub(crate) fn begin(&mut self) {
        self.status = RunStatus::Running;
        self.start_time = Utc::now();
    }

    pub(crate) fn set_databases(&mut self, source: &str, destination: &str) {
        self.source_database_name = Some(source.to_string());
        self.destination_database_name = Some(destination.to_string());
    }

    pub(crate) fn record_system(&mut self, name: &str, kind: &CollectionKind) {
        self.collections_processed += 1;
        self.collections.push(CollectionSummary {
            name: name.to_string(),
            kind: kind.to_string(),
            documents_counted: 0,
            documents_written: 0,
            outcome: CopyOutcome::System,
            error: None,
        });
    }

    /// Fold one collection into the totals.
    ///
    /// Written documents only count toward `documents_cloned` when the
    /// copy succeeded.
    pub(crate) fn record_copy(&mut self, kind: &CollectionKind, result: &CollectionCopyResult) {
        self.collections_processed += 1;
        self.documents_total += result.counted.max(result.seen);
        if result.is_success() {
            self.documents_cloned += result.written;
        }
        self.collections.push(CollectionSummary {
            name: result.name.clone(),
            kind: kind.to_string(),
            documents_counted: result.counted,
            documents_written: result.written,
            outcome: result.outcome,
            error: result.error.clone(),
        });
    }

    /// Account for a collection the run never reached because it was
    /// cancelled.
    pub(crate) fn record_not_started(&mut self, name: &str, kind: &CollectionKind) {
        self.collections_processed += 1;
        self.collections.push(CollectionSummary {
            name: name.to_string(),
            kind: kind.to_string(),
            documents_counted: 0,
            documents_written: 0,
            outcome: CopyOutcome::Cancelled,
            error: Some("not started: run cancelled".to_string()),
        });
    }

    pub(crate) fn complete(&mut self) {
        self.status = RunStatus::Completed;
        self.stamp_end();
    }

    pub(crate) fn fail(&mut self, kind: &str, message: String) {
        self.status = RunStatus::Failed;
        self.error_kind = Some(kind.to_string());
        self.error_message = Some(message);
        self.stamp_end();
    }

    fn stamp_end(&mut self) {
        let end = Utc::now();
        let elapsed = (end - self.start_time).num_milliseconds().max(0) as u64;
        self.end_time = Some(end);
        self.duration_ms = Some(elapsed);
    }
}
