// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Batch copier for one collection.
//!
//! Collects documents from the source cursor into fixed-size batches and
//! writes each batch to the destination as one bulk insert.
//!
//! # Design
//!
//! ```text
//! count ──(0)──▶ Empty (destination untouched)
//!   │
//!   ▼
//! delete_all(destination)
//!   │
//!   ▼
//! find_all(source) ──▶ cancel check (before each batch after the first)
//!                          │
//!                          ▼
//!                     BatchBuffer ──(full)──▶ insert_many
//!                          │
//!                     (end of stream, non-empty)
//!                          ▼
//!                     insert_many
//! ```
//!
//! The destination collection is a full mirror: it is cleared before the
//! first write, never merged into.
//!
//! # Failure
//!
//! [`BatchCopier::copy`] never returns an error. Failures in count, clear,
//! cursor or insert end the copy and come back as a
//! [`CollectionCopyResult`] with outcome `Failed`. Cancellation ends it
//! with outcome `Cancelled`; documents already inserted stay inserted.
//!
//! Document order from the cursor is preserved within and across batches.

use crate::backend::ServerHandle;
use crate::error::ReplicationError;
use crate::metrics;
use crate::orchestrator::{CancelSignal, CollectionCopyResult, CopyOutcome};
use futures::StreamExt;
use mongodb::bson::Document;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Accumulates items until `capacity` is reached.
///
/// A buffer holding exactly `capacity` items is full; the caller takes it,
/// writes it, and keeps going with an empty buffer. A boundary-sized input
/// therefore produces one full batch and no trailing empty one.
#[derive(Debug)]
pub struct BatchBuffer<T = Document> {
    items: Vec<T>,
    capacity: usize,
}

impl<T> BatchBuffer<T> {
    /// `capacity` of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, item: T) {
        self.items.push(item);
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Take the buffered items, leaving the buffer empty.
    pub fn take(&mut self) -> Vec<T> {
        std::mem::replace(&mut self.items, Vec::with_capacity(self.capacity))
    }
}

/// Why a copy stopped early.
enum Stop {
    Failed(String),
    Cancelled,
}

#[derive(Default)]
struct Progress {
    counted: u64,
    seen: u64,
    written: u64,
    batches: usize,
}

/// Copies collections batch by batch.
#[derive(Debug, Clone)]
pub struct BatchCopier {
    batch_size: usize,
}

impl BatchCopier {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Mirror `collection` from `source_db` into `destination_db`.
    #[instrument(skip(self, source, destination, cancel), fields(batch_size = self.batch_size))]
    pub async fn copy<H: ServerHandle>(
        &self,
        source: &H,
        source_db: &str,
        destination: &H,
        destination_db: &str,
        collection: &str,
        cancel: &CancelSignal,
    ) -> CollectionCopyResult {
        let start = Instant::now();
        let mut progress = Progress::default();

        let stop = self
            .run(
                source,
                source_db,
                destination,
                destination_db,
                collection,
                cancel,
                &mut progress,
            )
            .await;

        let duration = start.elapsed();
        let (outcome, error) = match stop {
            Ok(()) if progress.counted == 0 && progress.seen == 0 => (CopyOutcome::Empty, None),
            Ok(()) if progress.seen != progress.written => (
                CopyOutcome::Failed,
                Some(format!(
                    "destination acknowledged {} of {} documents",
                    progress.written, progress.seen
                )),
            ),
            Ok(()) => (CopyOutcome::Copied, None),
            Err(Stop::Failed(message)) => (CopyOutcome::Failed, Some(message)),
            Err(Stop::Cancelled) => (
                CopyOutcome::Cancelled,
                Some(ReplicationError::Cancelled.to_string()),
            ),
        };

        match outcome {
            CopyOutcome::Copied => info!(
                documents = progress.written,
                batches = progress.batches,
                duration_ms = duration.as_millis() as u64,
                "Collection copied"
            ),
            CopyOutcome::Empty => debug!("Collection empty, skipped"),
            _ => {
                let err = ReplicationError::collection_copy(
                    collection,
                    error.clone().unwrap_or_default(),
                );
                warn!(
                    outcome = %outcome,
                    seen = progress.seen,
                    written = progress.written,
                    error = %err,
                    "Collection copy stopped"
                );
            }
        }
        metrics::record_collection_copy(outcome.as_str(), progress.written, duration);

        CollectionCopyResult {
            name: collection.to_string(),
            counted: progress.counted,
            seen: progress.seen,
            written: progress.written,
            outcome,
            error,
            duration,
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn run<H: ServerHandle>(
        &self,
        source: &H,
        source_db: &str,
        destination: &H,
        destination_db: &str,
        collection: &str,
        cancel: &CancelSignal,
        progress: &mut Progress,
    ) -> Result<(), Stop> {
        progress.counted = source
            .count_documents(source_db, collection)
            .await
            .map_err(|e| Stop::Failed(format!("failed to count documents: {}", e)))?;

        if progress.counted == 0 {
            return Ok(());
        }
        if cancel.is_cancelled() {
            return Err(Stop::Cancelled);
        }

        let removed = destination
            .delete_all(destination_db, collection)
            .await
            .map_err(|e| Stop::Failed(format!("failed to clear destination: {}", e)))?;
        debug!(removed, "Cleared destination collection");

        let mut cursor = source
            .find_all(source_db, collection)
            .await
            .map_err(|e| Stop::Failed(format!("failed to open cursor: {}", e)))?;

        let mut buffer = BatchBuffer::new(self.batch_size);
        while let Some(item) = cursor.next().await {
            // More input after a flushed batch: honor cancellation before
            // starting the next one. A drained cursor ends as `Copied`.
            if buffer.is_empty() && progress.batches > 0 && cancel.is_cancelled() {
                return Err(Stop::Cancelled);
            }
            let document = item.map_err(|e| {
                Stop::Failed(format!(
                    "cursor failed after {} documents: {}",
                    progress.seen, e
                ))
            })?;
            progress.seen += 1;
            buffer.push(document);

            if buffer.is_full() {
                self.flush(destination, destination_db, collection, &mut buffer, progress)
                    .await?;
            }
        }

        if !buffer.is_empty() {
            self.flush(destination, destination_db, collection, &mut buffer, progress)
                .await?;
        }
        Ok(())
    }

    async fn flush<H: ServerHandle>(
        &self,
        destination: &H,
        destination_db: &str,
        collection: &str,
        buffer: &mut BatchBuffer,
        progress: &mut Progress,
    ) -> Result<(), Stop> {
        let batch = buffer.take();
        let size = batch.len();
        let start = Instant::now();

        let inserted = destination
            .insert_many(destination_db, collection, batch)
            .await
            .map_err(|e| Stop::Failed(format!("failed to insert batch of {}: {}", size, e)))?;

        progress.written += inserted as u64;
        progress.batches += 1;
        metrics::record_batch_write(size, start.elapsed());
        debug!(size, inserted, total_written = progress.written, "Batch written");
        Ok(())
    }
}
