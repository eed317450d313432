// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Run outcome notifications.
//!
//! The engine calls [`NotificationSink::notify`] once per finished run.
//! Whether that becomes an email, a browser toast or nothing at all is the
//! sink's business. A sink error is logged and otherwise ignored.

use crate::error::{ReplicationError, Result};
use crate::orchestrator::{ReplicationRun, RunStatus};
use std::future::Future;
use std::pin::Pin;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Future returned by [`NotificationSink::notify`].
pub type NotifyFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// Final result of a run, ready for delivery.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    Success { run: ReplicationRun },
    Failure { run: ReplicationRun, message: String },
}

impl RunOutcome {
    /// Build the outcome for a finished run.
    pub fn from_run(run: &ReplicationRun) -> Self {
        match run.status {
            RunStatus::Completed => RunOutcome::Success { run: run.clone() },
            _ => RunOutcome::Failure {
                run: run.clone(),
                message: run
                    .error_message
                    .clone()
                    .unwrap_or_else(|| "Replication failed".to_string()),
            },
        }
    }

    pub fn run(&self) -> &ReplicationRun {
        match self {
            RunOutcome::Success { run } | RunOutcome::Failure { run, .. } => run,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Success { .. })
    }

    pub fn title(&self) -> String {
        match self {
            RunOutcome::Success { run } => format!("Clone completed: {}", run.job_name),
            RunOutcome::Failure { run, .. } => format!("Clone failed: {}", run.job_name),
        }
    }

    pub fn body(&self) -> String {
        match self {
            RunOutcome::Success { run } => {
                let mut body = format!(
                    "Cloned {} documents across {} collections",
                    run.documents_cloned, run.collections_processed
                );
                let failed = run.failed_collections().count();
                if failed > 0 {
                    body.push_str(&format!(" ({} collections failed)", failed));
                }
                body
            }
            RunOutcome::Failure { message, .. } => message.clone(),
        }
    }
}

/// Receives one outcome per run.
pub trait NotificationSink: Send + Sync + 'static {
    fn notify<'a>(&'a self, outcome: &'a RunOutcome) -> NotifyFuture<'a>;
}

/// Drops every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpNotifier;

impl NotificationSink for NoOpNotifier {
    fn notify<'a>(&'a self, _outcome: &'a RunOutcome) -> NotifyFuture<'a> {
        Box::pin(async { Ok(()) })
    }
}

/// Writes notifications to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl NotificationSink for LogNotifier {
    fn notify<'a>(&'a self, outcome: &'a RunOutcome) -> NotifyFuture<'a> {
        Box::pin(async move {
            let run = outcome.run();
            if outcome.is_success() {
                info!(run_id = %run.run_id, job_id = %run.job_id, title = %outcome.title(), body = %outcome.body(), "Notification");
            } else {
                warn!(run_id = %run.run_id, job_id = %run.job_id, title = %outcome.title(), body = %outcome.body(), "Notification");
            }
            Ok(())
        })
    }
}

/// Forwards outcomes over an mpsc channel for out-of-band delivery.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::Sender<RunOutcome>,
}

impl ChannelNotifier {
    /// Create a notifier and the receiving end of its channel.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<RunOutcome>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl NotificationSink for ChannelNotifier {
    fn notify<'a>(&'a self, outcome: &'a RunOutcome) -> NotifyFuture<'a> {
        Box::pin(async move {
            self.tx
                .send(outcome.clone())
                .await
                .map_err(|_| ReplicationError::Internal("notification receiver dropped".to_string()))
        })
    }
}
