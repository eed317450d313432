// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Run history.
//!
//! The engine hands every finished run to a [`HistoryStore`] exactly once.
//! A failed write is logged and counted; it never changes the run's status.
//!
//! Three stores ship:
//!
//! | Store | Use |
//! |-------|-----|
//! | [`NoOpHistory`] | Default when the caller keeps its own records |
//! | [`MemoryHistory`] | Tests and short-lived processes |
//! | [`SqliteHistory`] | Durable audit trail on local disk |
//!
//! # SQLite Busy Handling
//!
//! Several engines may share one history file. SQLITE_BUSY/SQLITE_LOCKED
//! are retried with exponential backoff (5 attempts, 10ms doubling up to
//! 500ms) before the write is reported as failed.
//!
//! Each run is stored as one row keyed by `run_id`. Writing the same run
//! twice replaces the row.

use crate::config::HistoryConfig;
use crate::error::{ReplicationError, Result};
use crate::metrics;
use crate::orchestrator::{ReplicationRun, RunStatus};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Future returned by [`HistoryStore::record_run`].
pub type HistoryFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// Append-only record of finished runs.
pub trait HistoryStore: Send + Sync + 'static {
    /// Persist a finished run.
    fn record_run<'a>(&'a self, run: &'a ReplicationRun) -> HistoryFuture<'a>;
}

/// Discards every run.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpHistory;

impl HistoryStore for NoOpHistory {
    fn record_run<'a>(&'a self, _run: &'a ReplicationRun) -> HistoryFuture<'a> {
        Box::pin(async { Ok(()) })
    }
}

// =============================================================================
// Stats
// =============================================================================

/// Summary over stored runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryStats {
    pub total_operations: u64,
    pub successful_operations: u64,
    pub failed_operations: u64,
    /// Percent of runs that completed, rounded.
    pub success_rate: u32,
    /// Mean duration of completed runs.
    pub avg_duration_ms: u64,
    /// `avg_duration_ms` as `"Xm Ys"` or `"Ys"`.
    pub avg_duration: String,
}

impl HistoryStats {
    pub fn new(total: u64, successful: u64, failed: u64, avg_duration_ms: u64) -> Self {
        let success_rate = if total > 0 {
            ((successful as f64 / total as f64) * 100.0).round() as u32
        } else {
            0
        };
        Self {
            total_operations: total,
            successful_operations: successful,
            failed_operations: failed,
            success_rate,
            avg_duration_ms,
            avg_duration: format_duration(avg_duration_ms),
        }
    }

    /// Compute stats from a slice of runs.
    pub fn from_runs(runs: &[ReplicationRun]) -> Self {
        let successful: Vec<&ReplicationRun> = runs
            .iter()
            .filter(|r| r.status == RunStatus::Completed)
            .collect();
        let failed = runs.iter().filter(|r| r.status == RunStatus::Failed).count() as u64;

        let durations: Vec<u64> = successful.iter().filter_map(|r| r.duration_ms).collect();
        let avg = if durations.is_empty() {
            0
        } else {
            durations.iter().sum::<u64>() / durations.len() as u64
        };

        Self::new(runs.len() as u64, successful.len() as u64, failed, avg)
    }
}

/// Format milliseconds as `"Xm Ys"`, or `"Ys"` under a minute.
pub fn format_duration(ms: u64) -> String {
    let seconds = ms / 1000;
    let minutes = seconds / 60;
    let remaining = seconds % 60;
    if minutes > 0 {
        format!("{}m {}s", minutes, remaining)
    } else {
        format!("{}s", remaining)
    }
}

// =============================================================================
// MemoryHistory
// =============================================================================

/// Keeps runs in process memory.
#[derive(Debug, Default)]
pub struct MemoryHistory {
    runs: RwLock<Vec<ReplicationRun>>,
    fail_writes: AtomicBool,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded runs in insertion order.
    pub async fn runs(&self) -> Vec<ReplicationRun> {
        self.runs.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.runs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.runs.read().await.is_empty()
    }

    pub async fn stats(&self) -> HistoryStats {
        HistoryStats::from_runs(&self.runs.read().await)
    }

    /// Make every subsequent write fail.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl HistoryStore for MemoryHistory {
    fn record_run<'a>(&'a self, run: &'a ReplicationRun) -> HistoryFuture<'a> {
        Box::pin(async move {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(ReplicationError::Internal(
                    "history store unavailable".to_string(),
                ));
            }
            let mut runs = self.runs.write().await;
            match runs.iter_mut().find(|r| r.run_id == run.run_id) {
                Some(existing) => *existing = run.clone(),
                None => runs.push(run.clone()),
            }
            Ok(())
        })
    }
}

// =============================================================================
// SqliteHistory
// =============================================================================

const SQLITE_RETRY_MAX_ATTEMPTS: u32 = 5;
const SQLITE_RETRY_BASE_DELAY_MS: u64 = 10;
const SQLITE_RETRY_MAX_DELAY_MS: u64 = 500;

/// SQLITE_BUSY (5) or SQLITE_LOCKED (6).
fn is_sqlite_busy_error(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db_err) => {
            if let Some(code) = db_err.code() {
                return code == "5" || code == "6";
            }
            let msg = db_err.message().to_lowercase();
            msg.contains("database is locked") || msg.contains("database is busy")
        }
        _ => false,
    }
}

/// Run a database operation, retrying on SQLITE_BUSY/SQLITE_LOCKED.
async fn execute_with_retry<F, Fut, T>(
    operation_name: &str,
    mut f: F,
) -> std::result::Result<T, sqlx::Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, sqlx::Error>>,
{
    let mut attempts = 0;
    let mut delay_ms = SQLITE_RETRY_BASE_DELAY_MS;

    loop {
        attempts += 1;
        match f().await {
            Ok(result) => {
                if attempts > 1 {
                    debug!(
                        operation = operation_name,
                        attempts, "SQLite operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(e) if is_sqlite_busy_error(&e) && attempts < SQLITE_RETRY_MAX_ATTEMPTS => {
                warn!(
                    operation = operation_name,
                    attempts,
                    max_attempts = SQLITE_RETRY_MAX_ATTEMPTS,
                    delay_ms,
                    "SQLite busy, retrying"
                );
                metrics::record_history_retry(operation_name);
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                delay_ms = (delay_ms * 2).min(SQLITE_RETRY_MAX_DELAY_MS);
            }
            Err(e) => return Err(e),
        }
    }
}

type StatsRow = (i64, Option<i64>, Option<i64>, Option<f64>);

/// Run history backed by SQLite.
pub struct SqliteHistory {
    pool: SqlitePool,
    path: String,
    wal_mode: bool,
}

impl SqliteHistory {
    /// Open (or create) a history database at `path` in WAL mode.
    pub async fn new(path: impl AsRef<Path>) -> Result<Self> {
        Self::open(&path.as_ref().to_string_lossy(), true).await
    }

    /// Open the store described by `config`. `":memory:"` keeps
    /// everything in a single private connection.
    pub async fn from_config(config: &HistoryConfig) -> Result<Self> {
        Self::open(&config.sqlite_path, config.wal_mode).await
    }

    async fn open(path: &str, wal_mode: bool) -> Result<Self> {
        info!(path = %path, wal_mode, "Initializing history store");
        let in_memory = path == ":memory:";

        let url = if in_memory {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite://{}?mode=rwc", path)
        };
        let wal_mode = wal_mode && !in_memory;
        let journal = if wal_mode {
            SqliteJournalMode::Wal
        } else {
            SqliteJournalMode::Delete
        };

        let options = SqliteConnectOptions::from_str(&url)
            .map_err(|e| ReplicationError::Config(format!("Invalid SQLite path: {}", e)))?
            .journal_mode(journal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .create_if_missing(true);

        // An in-memory database lives and dies with its single connection.
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(2)
        };
        let pool = pool_options.connect_with(options).await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS runs (
                run_id TEXT PRIMARY KEY,
                job_id TEXT NOT NULL,
                job_name TEXT NOT NULL,
                status TEXT NOT NULL,
                start_time INTEGER NOT NULL,
                end_time INTEGER,
                duration_ms INTEGER,
                source_database TEXT,
                destination_database TEXT,
                collections_total INTEGER NOT NULL,
                collections_processed INTEGER NOT NULL,
                documents_total INTEGER NOT NULL,
                documents_cloned INTEGER NOT NULL,
                error_message TEXT,
                error_kind TEXT,
                record TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS runs_job_start ON runs (job_id, start_time)")
            .execute(&pool)
            .await?;

        Ok(Self {
            pool,
            path: path.to_string(),
            wal_mode,
        })
    }

    /// Database path (for diagnostics).
    pub fn path(&self) -> &str {
        &self.path
    }

    async fn upsert(&self, run: &ReplicationRun) -> Result<()> {
        let record = serde_json::to_string(run)
            .map_err(|e| ReplicationError::Internal(format!("failed to encode run: {}", e)))?;
        let pool = &self.pool;

        execute_with_retry("history_record", || async {
            sqlx::query(
                r#"
                INSERT INTO runs (
                    run_id, job_id, job_name, status, start_time, end_time, duration_ms,
                    source_database, destination_database,
                    collections_total, collections_processed,
                    documents_total, documents_cloned,
                    error_message, error_kind, record
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(run_id) DO UPDATE SET
                    status = excluded.status,
                    end_time = excluded.end_time,
                    duration_ms = excluded.duration_ms,
                    source_database = excluded.source_database,
                    destination_database = excluded.destination_database,
                    collections_total = excluded.collections_total,
                    collections_processed = excluded.collections_processed,
                    documents_total = excluded.documents_total,
                    documents_cloned = excluded.documents_cloned,
                    error_message = excluded.error_message,
                    error_kind = excluded.error_kind,
                    record = excluded.record
                "#,
            )
            .bind(&run.run_id)
            .bind(&run.job_id)
            .bind(&run.job_name)
            .bind(run.status.as_str())
            .bind(run.start_time.timestamp_millis())
            .bind(run.end_time.map(|t| t.timestamp_millis()))
            .bind(run.duration_ms.map(|d| d as i64))
            .bind(&run.source_database_name)
            .bind(&run.destination_database_name)
            .bind(run.collections_total as i64)
            .bind(run.collections_processed as i64)
            .bind(run.documents_total as i64)
            .bind(run.documents_cloned as i64)
            .bind(&run.error_message)
            .bind(&run.error_kind)
            .bind(&record)
            .execute(pool)
            .await
        })
        .await?;

        debug!(run_id = %run.run_id, status = %run.status, "Run recorded");
        Ok(())
    }

    /// Most recent runs first.
    pub async fn list_runs(&self, limit: u32) -> Result<Vec<ReplicationRun>> {
        let pool = &self.pool;
        let rows: Vec<(String,)> = execute_with_retry("history_list", || async {
            sqlx::query_as("SELECT record FROM runs ORDER BY start_time DESC, rowid DESC LIMIT ?")
                .bind(limit as i64)
                .fetch_all(pool)
                .await
        })
        .await?;

        rows.into_iter().map(|(record,)| decode(&record)).collect()
    }

    /// Runs for one job, most recent first.
    pub async fn list_runs_for_job(&self, job_id: &str, limit: u32) -> Result<Vec<ReplicationRun>> {
        let pool = &self.pool;
        let rows: Vec<(String,)> = execute_with_retry("history_list_job", || async {
            sqlx::query_as(
                "SELECT record FROM runs WHERE job_id = ? ORDER BY start_time DESC, rowid DESC LIMIT ?",
            )
            .bind(job_id)
            .bind(limit as i64)
            .fetch_all(pool)
            .await
        })
        .await?;

        rows.into_iter().map(|(record,)| decode(&record)).collect()
    }

    /// Fetch one run by id.
    pub async fn get_run(&self, run_id: &str) -> Result<Option<ReplicationRun>> {
        let pool = &self.pool;
        let row: Option<(String,)> = execute_with_retry("history_get", || async {
            sqlx::query_as("SELECT record FROM runs WHERE run_id = ?")
                .bind(run_id)
                .fetch_optional(pool)
                .await
        })
        .await?;

        row.map(|(record,)| decode(&record)).transpose()
    }

    /// Delete one run. Returns whether a row was removed.
    pub async fn delete_run(&self, run_id: &str) -> Result<bool> {
        let pool = &self.pool;
        let result = execute_with_retry("history_delete", || async {
            sqlx::query("DELETE FROM runs WHERE run_id = ?")
                .bind(run_id)
                .execute(pool)
                .await
        })
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Summary over every stored run.
    pub async fn stats(&self) -> Result<HistoryStats> {
        let pool = &self.pool;
        let (total, successful, failed, avg): StatsRow = execute_with_retry("history_stats", || async {
            sqlx::query_as(
                r#"
                SELECT
                    COUNT(*),
                    SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END),
                    SUM(CASE WHEN status = 'failed' THEN 1 ELSE 0 END),
                    AVG(CASE WHEN status = 'completed' THEN duration_ms END)
                FROM runs
                "#,
            )
            .fetch_one(pool)
            .await
        })
        .await?;

        Ok(HistoryStats::new(
            total.max(0) as u64,
            successful.unwrap_or(0).max(0) as u64,
            failed.unwrap_or(0).max(0) as u64,
            avg.unwrap_or(0.0).max(0.0) as u64,
        ))
    }

    /// Force flush WAL to the main database file.
    pub async fn checkpoint(&self) -> Result<()> {
        if !self.wal_mode {
            return Ok(());
        }
        let pool = &self.pool;
        execute_with_retry("history_checkpoint", || async {
            sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
                .execute(pool)
                .await
        })
        .await?;

        debug!("WAL checkpoint complete");
        Ok(())
    }

    /// Checkpoint and close the pool.
    pub async fn close(&self) {
        if let Err(e) = self.checkpoint().await {
            warn!(error = %e, "Failed to checkpoint WAL on close");
        }
        self.pool.close().await;
        info!("History store closed");
    }
}

fn decode(record: &str) -> Result<ReplicationRun> {
    serde_json::from_str(record)
        .map_err(|e| ReplicationError::Internal(format!("corrupt history record: {}", e)))
}

impl HistoryStore for SqliteHistory {
    fn record_run<'a>(&'a self, run: &'a ReplicationRun) -> HistoryFuture<'a> {
        Box::pin(self.upsert(run))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::ReplicationJob;
    use chrono::Utc;
    use tempfile::tempdir;

    fn finished_run(job_id: &str, status: RunStatus, duration_ms: u64, offset_secs: i64) -> ReplicationRun {
        let job = ReplicationJob::new(job_id, "nightly", "mongodb://src/shop", "mongodb://dst");
        let mut run = ReplicationRun::new(&job);
        run.status = status;
        run.start_time = Utc::now() + chrono::Duration::seconds(offset_secs);
        run.end_time = Some(run.start_time + chrono::Duration::milliseconds(duration_ms as i64));
        run.duration_ms = Some(duration_ms);
        run.source_database_name = Some("shop".to_string());
        run.destination_database_name = Some("shop".to_string());
        if status == RunStatus::Failed {
            run.error_message = Some("Connection refused".to_string());
            run.error_kind = Some("connection".to_string());
        }
        run
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "0s");
        assert_eq!(format_duration(45_900), "45s");
        assert_eq!(format_duration(60_000), "1m 0s");
        assert_eq!(format_duration(125_000), "2m 5s");
    }

    #[test]
    fn test_stats_from_runs() {
        let runs = vec![
            finished_run("a", RunStatus::Completed, 2_000, 0),
            finished_run("a", RunStatus::Completed, 4_000, 1),
            finished_run("a", RunStatus::Failed, 100_000, 2),
        ];
        let stats = HistoryStats::from_runs(&runs);
        assert_eq!(stats.total_operations, 3);
        assert_eq!(stats.successful_operations, 2);
        assert_eq!(stats.failed_operations, 1);
        assert_eq!(stats.success_rate, 67);
        assert_eq!(stats.avg_duration_ms, 3_000);
        assert_eq!(stats.avg_duration, "3s");
    }

    #[test]
    fn test_stats_empty() {
        let stats = HistoryStats::from_runs(&[]);
        assert_eq!(stats.success_rate, 0);
        assert_eq!(stats.avg_duration, "0s");
    }

    #[tokio::test]
    async fn test_memory_history_upserts() {
        let history = MemoryHistory::new();
        let mut run = finished_run("a", RunStatus::Completed, 1_000, 0);
        history.record_run(&run).await.unwrap();
        run.documents_cloned = 42;
        history.record_run(&run).await.unwrap();

        let runs = history.runs().await;
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].documents_cloned, 42);
    }

    #[tokio::test]
    async fn test_memory_history_fail_writes() {
        let history = MemoryHistory::new();
        history.fail_writes(true);
        let run = finished_run("a", RunStatus::Completed, 1_000, 0);
        assert!(history.record_run(&run).await.is_err());
        assert!(history.is_empty().await);
    }

    #[tokio::test]
    async fn test_sqlite_history_roundtrip() {
        let dir = tempdir().unwrap();
        let store = SqliteHistory::new(dir.path().join("history.db")).await.unwrap();

        let run = finished_run("job-1", RunStatus::Failed, 1_500, 0);
        store.record_run(&run).await.unwrap();

        let loaded = store.get_run(&run.run_id).await.unwrap().unwrap();
        assert_eq!(loaded.run_id, run.run_id);
        assert_eq!(loaded.status, RunStatus::Failed);
        assert_eq!(loaded.error_kind.as_deref(), Some("connection"));
        assert!(store.get_run("missing").await.unwrap().is_none());

        store.close().await;
    }

    #[tokio::test]
    async fn test_sqlite_history_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("persist.db");
        let run = finished_run("job-1", RunStatus::Completed, 1_000, 0);

        {
            let store = SqliteHistory::new(&path).await.unwrap();
            store.record_run(&run).await.unwrap();
            store.close().await;
        }
        {
            let store = SqliteHistory::new(&path).await.unwrap();
            assert!(store.get_run(&run.run_id).await.unwrap().is_some());
            store.close().await;
        }
    }

    #[tokio::test]
    async fn test_sqlite_list_runs_newest_first() {
        let store = SqliteHistory::from_config(&HistoryConfig::in_memory()).await.unwrap();

        let older = finished_run("job-1", RunStatus::Completed, 1_000, -60);
        let newer = finished_run("job-2", RunStatus::Completed, 1_000, 0);
        store.record_run(&older).await.unwrap();
        store.record_run(&newer).await.unwrap();

        let runs = store.list_runs(10).await.unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].run_id, newer.run_id);

        let limited = store.list_runs(1).await.unwrap();
        assert_eq!(limited.len(), 1);

        let job_runs = store.list_runs_for_job("job-1", 10).await.unwrap();
        assert_eq!(job_runs.len(), 1);
        assert_eq!(job_runs[0].run_id, older.run_id);
    }

    #[tokio::test]
    async fn test_sqlite_upsert_replaces_row() {
        let store = SqliteHistory::from_config(&HistoryConfig::in_memory()).await.unwrap();
        let mut run = finished_run("job-1", RunStatus::Completed, 1_000, 0);
        store.record_run(&run).await.unwrap();
        run.documents_cloned = 7;
        store.record_run(&run).await.unwrap();

        let runs = store.list_runs(10).await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].documents_cloned, 7);
    }

    #[tokio::test]
    async fn test_sqlite_stats() {
        let store = SqliteHistory::from_config(&HistoryConfig::in_memory()).await.unwrap();
        store.record_run(&finished_run("a", RunStatus::Completed, 61_000, 0)).await.unwrap();
        store.record_run(&finished_run("a", RunStatus::Completed, 59_000, 1)).await.unwrap();
        store.record_run(&finished_run("a", RunStatus::Failed, 10, 2)).await.unwrap();
        store.record_run(&finished_run("a", RunStatus::Failed, 10, 3)).await.unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_operations, 4);
        assert_eq!(stats.successful_operations, 2);
        assert_eq!(stats.failed_operations, 2);
        assert_eq!(stats.success_rate, 50);
        assert_eq!(stats.avg_duration_ms, 60_000);
        assert_eq!(stats.avg_duration, "1m 0s");
    }

    #[tokio::test]
    async fn test_sqlite_delete_run() {
        let store = SqliteHistory::from_config(&HistoryConfig::in_memory()).await.unwrap();
        let run = finished_run("a", RunStatus::Completed, 1_000, 0);
        store.record_run(&run).await.unwrap();

        assert!(store.delete_run(&run.run_id).await.unwrap());
        assert!(!store.delete_run(&run.run_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_execute_with_retry_succeeds_immediately() {
        let mut attempt_count = 0;
        let result: std::result::Result<i32, sqlx::Error> = execute_with_retry("test_op", || {
            attempt_count += 1;
            async { Ok(42) }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempt_count, 1);
    }

    #[tokio::test]
    async fn test_execute_with_retry_fails_on_non_busy_error() {
        let mut attempt_count = 0;
        let result: std::result::Result<i32, sqlx::Error> = execute_with_retry("test_op", || {
            attempt_count += 1;
            async { Err(sqlx::Error::RowNotFound) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempt_count, 1);
    }

    #[test]
    fn test_is_sqlite_busy_error_pool_timed_out() {
        assert!(!is_sqlite_busy_error(&sqlx::Error::PoolTimedOut));
    }
}
