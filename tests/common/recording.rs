// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Recording notification sink.
//!
//! Keeps every outcome it receives so tests can assert on count and
//! content. Can be told to fail to exercise the engine's error handling.

use db_clone_engine::notify::NotifyFuture;
use db_clone_engine::{NotificationSink, ReplicationError, RunOutcome};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

#[derive(Default)]
pub struct RecordingNotifier {
    outcomes: RwLock<Vec<RunOutcome>>,
    fail: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record outcomes but report a delivery failure.
    pub fn failing() -> Self {
        Self {
            fail: AtomicBool::new(true),
            ..Self::default()
        }
    }

    pub async fn outcomes(&self) -> Vec<RunOutcome> {
        self.outcomes.read().await.clone()
    }

    pub async fn count(&self) -> usize {
        self.outcomes.read().await.len()
    }
}

impl NotificationSink for RecordingNotifier {
    fn notify<'a>(&'a self, outcome: &'a RunOutcome) -> NotifyFuture<'a> {
        Box::pin(async move {
            self.outcomes.write().await.push(outcome.clone());
            if self.fail.load(Ordering::SeqCst) {
                return Err(ReplicationError::Internal("smtp unavailable".to_string()));
            }
            Ok(())
        })
    }
}
