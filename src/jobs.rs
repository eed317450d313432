// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Job registry.
//!
//! Jobs are owned elsewhere (a settings database, a config file). The
//! engine only needs to look one up by id and get back ready-to-use
//! connection strings.

use crate::orchestrator::ReplicationJob;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use tokio::sync::RwLock;

/// Future returned by [`JobRegistry::get_job`].
pub type JobFuture<'a> = Pin<Box<dyn Future<Output = Option<ReplicationJob>> + Send + 'a>>;

/// Looks up jobs by id.
pub trait JobRegistry: Send + Sync {
    fn get_job<'a>(&'a self, job_id: &'a str) -> JobFuture<'a>;
}

/// Jobs held in memory.
#[derive(Debug, Default)]
pub struct MemoryJobRegistry {
    jobs: RwLock<HashMap<String, ReplicationJob>>,
}

impl MemoryJobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-filled with `jobs`.
    pub fn with_jobs(jobs: impl IntoIterator<Item = ReplicationJob>) -> Self {
        Self {
            jobs: RwLock::new(jobs.into_iter().map(|j| (j.job_id.clone(), j)).collect()),
        }
    }

    /// Insert or replace a job.
    pub async fn insert(&self, job: ReplicationJob) {
        self.jobs.write().await.insert(job.job_id.clone(), job);
    }

    pub async fn remove(&self, job_id: &str) -> Option<ReplicationJob> {
        self.jobs.write().await.remove(job_id)
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}

impl JobRegistry for MemoryJobRegistry {
    fn get_job<'a>(&'a self, job_id: &'a str) -> JobFuture<'a> {
        Box::pin(async move { self.jobs.read().await.get(job_id).cloned() })
    }
}
