// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Backend wrapper that cancels a run after a set number of bulk writes.
//!
//! Cancelling from a separate task races the copy loop; tripping the
//! handle from inside `insert_many` makes mid-run cancellation
//! deterministic.

use db_clone_engine::backend::{
    BackendError, BoxFuture, CollectionDescriptor, DatabaseInfo, DocumentStream,
};
use db_clone_engine::connection::parse_uri;
use db_clone_engine::{
    CancelHandle, ConnectionConfig, Connector, MemoryServer, ServerHandle, Side,
};
use mongodb::bson::Document;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Fires `handle` once `after` inserts have been acknowledged.
pub struct Tripwire {
    handle: CancelHandle,
    after: usize,
    inserts: AtomicUsize,
}

impl Tripwire {
    pub fn new(handle: CancelHandle, after: usize) -> Arc<Self> {
        Arc::new(Self {
            handle,
            after,
            inserts: AtomicUsize::new(0),
        })
    }

    fn record_insert(&self) {
        if self.inserts.fetch_add(1, Ordering::SeqCst) + 1 >= self.after {
            self.handle.cancel();
        }
    }
}

#[derive(Clone)]
pub struct TripwireServer {
    inner: MemoryServer,
    tripwire: Option<Arc<Tripwire>>,
}

impl ServerHandle for TripwireServer {
    fn list_collections(&self, database: &str) -> BoxFuture<'_, Vec<CollectionDescriptor>> {
        self.inner.list_collections(database)
    }

    fn list_databases(&self) -> BoxFuture<'_, Vec<DatabaseInfo>> {
        self.inner.list_databases()
    }

    fn count_documents(&self, database: &str, collection: &str) -> BoxFuture<'_, u64> {
        self.inner.count_documents(database, collection)
    }

    fn delete_all(&self, database: &str, collection: &str) -> BoxFuture<'_, u64> {
        self.inner.delete_all(database, collection)
    }

    fn find_all(&self, database: &str, collection: &str) -> BoxFuture<'_, DocumentStream> {
        self.inner.find_all(database, collection)
    }

    fn insert_many(
        &self,
        database: &str,
        collection: &str,
        documents: Vec<Document>,
    ) -> BoxFuture<'_, usize> {
        let insert = self.inner.insert_many(database, collection, documents);
        Box::pin(async move {
            let inserted = insert.await?;
            if let Some(tripwire) = &self.tripwire {
                tripwire.record_insert();
            }
            Ok(inserted)
        })
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        self.inner.close()
    }
}

/// Serves `src` plainly and `dst` through the tripwire.
pub struct TripwireConnector {
    pub source: MemoryServer,
    pub destination: MemoryServer,
    tripwire: Arc<Tripwire>,
}

impl TripwireConnector {
    pub fn new(tripwire: Arc<Tripwire>) -> Self {
        Self {
            source: MemoryServer::new(),
            destination: MemoryServer::new(),
            tripwire,
        }
    }
}

impl Connector for TripwireConnector {
    type Handle = TripwireServer;

    fn connect(
        &self,
        uri: &str,
        _side: Side,
        _config: &ConnectionConfig,
    ) -> BoxFuture<'_, TripwireServer> {
        let hosts = parse_uri(uri).map(|p| p.hosts);
        Box::pin(async move {
            match hosts.as_deref() {
                Some("src") => Ok(TripwireServer {
                    inner: self.source.clone(),
                    tripwire: None,
                }),
                Some("dst") => Ok(TripwireServer {
                    inner: self.destination.clone(),
                    tripwire: Some(self.tripwire.clone()),
                }),
                _ => Err(BackendError::new("Connection refused (os error 111)")),
            }
        })
    }
}
