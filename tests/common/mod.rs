// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Shared test utilities for engine, chaos and integration tests.
//!
//! This module provides:
//! - MongoDB testcontainer setup
//! - Memory-backed source/destination fixtures
//! - A notification sink that records every outcome
//! - A tripwire backend for deterministic mid-run cancellation

#![allow(dead_code)]

pub mod containers;
pub mod recording;
pub mod tripwire;

pub use containers::*;
pub use recording::*;
pub use tripwire::*;

use db_clone_engine::{
    EngineConfig, HistoryStore, MemoryConnector, MemoryServer, NotificationSink,
    ReplicationEngine, ReplicationJob,
};
use std::sync::Arc;

/// Source and destination servers registered as `src` and `dst`.
pub struct Fixture {
    pub connector: Arc<MemoryConnector>,
    pub source: MemoryServer,
    pub destination: MemoryServer,
}

impl Fixture {
    pub async fn new() -> Self {
        let connector = Arc::new(MemoryConnector::new());
        let source = MemoryServer::new();
        let destination = MemoryServer::new();
        connector.register("src", source.clone()).await;
        connector.register("dst", destination.clone()).await;
        Self {
            connector,
            source,
            destination,
        }
    }

    /// Engine with test config and no-op collaborators.
    pub fn engine(&self) -> ReplicationEngine<MemoryConnector> {
        ReplicationEngine::new(EngineConfig::for_testing(), self.connector.clone())
            .expect("test config is valid")
    }

    /// Engine with custom config.
    pub fn engine_with_config(&self, config: EngineConfig) -> ReplicationEngine<MemoryConnector> {
        ReplicationEngine::new(config, self.connector.clone()).expect("config is valid")
    }

    /// Engine with caller-supplied collaborators.
    pub fn engine_with(
        &self,
        history: Arc<dyn HistoryStore>,
        notifier: Arc<dyn NotificationSink>,
    ) -> ReplicationEngine<MemoryConnector> {
        ReplicationEngine::with_collaborators(
            EngineConfig::for_testing(),
            self.connector.clone(),
            history,
            notifier,
        )
        .expect("test config is valid")
    }
}

/// Job copying `src` into `dst`.
pub fn job(source_uri: &str, destination_uri: &str) -> ReplicationJob {
    ReplicationJob::new("job-test", "test job", source_uri, destination_uri)
}
