// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! In-process document server.
//!
//! [`MemoryServer`] behaves like a small MongoDB deployment: databases hold
//! ordered collections of BSON documents. [`MemoryConnector`] maps URI host
//! strings to servers, so `mongodb://src/shop` and `mongodb://dst` can point
//! at two independent servers in one process.
//!
//! Used for dry runs and tests. Every operation can be made to fail:
//!
//! ```rust
//! # async fn example() {
//! use db_clone_engine::memory::{FaultPoint, MemoryConnector, MemoryServer};
//!
//! let source = MemoryServer::new();
//! source.seed_generated("shop", "orders", 25).await;
//! source.inject("orders", FaultPoint::StreamAfter(10)).await;
//!
//! let connector = MemoryConnector::new();
//! connector.register("src", source.clone()).await;
//! # }
//! ```
//!
//! Unknown hosts are refused with a `Connection refused` message, matching
//! what the driver reports for a closed port.

use crate::backend::{
    BackendError, BoxFuture, CollectionDescriptor, CollectionKind, Connector, DatabaseInfo,
    DocumentStream, ServerHandle,
};
use crate::config::ConnectionConfig;
use crate::connection::parse_uri;
use crate::error::Side;
use mongodb::bson::{doc, Document};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Operation that should fail for a given collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    Count,
    Delete,
    Find,
    /// Every bulk insert into the collection fails.
    Insert,
    /// Cursor yields this many documents, then an error.
    StreamAfter(usize),
}

/// A recorded `insert_many` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertCall {
    pub database: String,
    pub collection: String,
    pub size: usize,
}

#[derive(Debug, Clone)]
struct MemoryCollection {
    name: String,
    kind: CollectionKind,
    documents: Vec<Document>,
}

#[derive(Default)]
struct ServerState {
    /// Database name -> collections in creation order.
    databases: BTreeMap<String, Vec<MemoryCollection>>,
    faults: HashMap<String, HashSet<FaultPoint>>,
    fail_list_collections: bool,
    fail_list_databases: bool,
    fail_close: bool,
    inserts: Vec<InsertCall>,
}

impl ServerState {
    fn collection(&self, database: &str, collection: &str) -> Option<&MemoryCollection> {
        self.databases
            .get(database)
            .and_then(|colls| colls.iter().find(|c| c.name == collection))
    }

    fn collection_mut(&mut self, database: &str, collection: &str) -> &mut MemoryCollection {
        let colls = self.databases.entry(database.to_string()).or_default();
        let index = match colls.iter().position(|c| c.name == collection) {
            Some(index) => index,
            None => {
                colls.push(MemoryCollection {
                    name: collection.to_string(),
                    kind: CollectionKind::Collection,
                    documents: Vec::new(),
                });
                colls.len() - 1
            }
        };
        &mut colls[index]
    }

    fn has_fault(&self, collection: &str, point: FaultPoint) -> bool {
        self.faults
            .get(collection)
            .map(|points| points.contains(&point))
            .unwrap_or(false)
    }

    fn stream_fault(&self, collection: &str) -> Option<usize> {
        self.faults.get(collection)?.iter().find_map(|p| match p {
            FaultPoint::StreamAfter(n) => Some(*n),
            _ => None,
        })
    }
}

/// In-process document server. Cloning shares the same data.
#[derive(Clone, Default)]
pub struct MemoryServer {
    state: Arc<RwLock<ServerState>>,
    closes: Arc<AtomicUsize>,
}

impl MemoryServer {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Seeding
    // =========================================================================

    /// Create an empty collection.
    pub async fn create_collection(&self, database: &str, collection: &str) {
        self.state.write().await.collection_mut(database, collection);
    }

    /// Create a view (listed with `kind = view`, no documents).
    pub async fn create_view(&self, database: &str, name: &str) {
        let mut state = self.state.write().await;
        state.collection_mut(database, name).kind = CollectionKind::View;
    }

    /// Append documents to a collection, creating it if needed.
    pub async fn seed(&self, database: &str, collection: &str, documents: Vec<Document>) {
        let mut state = self.state.write().await;
        state
            .collection_mut(database, collection)
            .documents
            .extend(documents);
    }

    /// Append `count` documents of the form `{ _id: i, seq: i, collection }`.
    pub async fn seed_generated(&self, database: &str, collection: &str, count: usize) {
        let documents = (0..count)
            .map(|i| doc! { "_id": i as i64, "seq": i as i64, "collection": collection })
            .collect();
        self.seed(database, collection, documents).await;
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// Snapshot of a collection's documents in storage order.
    pub async fn documents(&self, database: &str, collection: &str) -> Vec<Document> {
        self.state
            .read()
            .await
            .collection(database, collection)
            .map(|c| c.documents.clone())
            .unwrap_or_default()
    }

    /// Number of documents in a collection (0 if missing).
    pub async fn count(&self, database: &str, collection: &str) -> usize {
        self.state
            .read()
            .await
            .collection(database, collection)
            .map(|c| c.documents.len())
            .unwrap_or(0)
    }

    /// Names of collections in a database, in creation order.
    pub async fn collection_names(&self, database: &str) -> Vec<String> {
        self.state
            .read()
            .await
            .databases
            .get(database)
            .map(|colls| colls.iter().map(|c| c.name.clone()).collect())
            .unwrap_or_default()
    }

    /// Every bulk insert received so far.
    pub async fn insert_calls(&self) -> Vec<InsertCall> {
        self.state.read().await.inserts.clone()
    }

    /// How many times `close()` was called on any handle to this server.
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    // =========================================================================
    // Failure injection
    // =========================================================================

    /// Make `point` fail for every collection with this name.
    pub async fn inject(&self, collection: &str, point: FaultPoint) {
        self.state
            .write()
            .await
            .faults
            .entry(collection.to_string())
            .or_default()
            .insert(point);
    }

    /// Remove all faults for a collection.
    pub async fn clear_faults(&self, collection: &str) {
        self.state.write().await.faults.remove(collection);
    }

    /// Make `list_collections` fail.
    pub async fn fail_collection_listing(&self) {
        self.state.write().await.fail_list_collections = true;
    }

    /// Make `list_databases` fail.
    pub async fn fail_database_listing(&self) {
        self.state.write().await.fail_list_databases = true;
    }

    /// Make `close()` fail (the close is still counted).
    pub async fn fail_close(&self) {
        self.state.write().await.fail_close = true;
    }
}

fn approximate_size(documents: &[Document]) -> u64 {
    documents
        .iter()
        .map(|d| mongodb::bson::to_vec(d).map(|bytes| bytes.len() as u64).unwrap_or(0))
        .sum()
}

impl ServerHandle for MemoryServer {
    fn list_collections(&self, database: &str) -> BoxFuture<'_, Vec<CollectionDescriptor>> {
        let database = database.to_string();
        Box::pin(async move {
            let state = self.state.read().await;
            if state.fail_list_collections {
                return Err(BackendError::new("listCollections failed: not authorized on database"));
            }
            Ok(state
                .databases
                .get(&database)
                .map(|colls| {
                    colls
                        .iter()
                        .map(|c| CollectionDescriptor::new(c.name.clone(), c.kind.clone()))
                        .collect()
                })
                .unwrap_or_default())
        })
    }

    fn list_databases(&self) -> BoxFuture<'_, Vec<DatabaseInfo>> {
        Box::pin(async move {
            let state = self.state.read().await;
            if state.fail_list_databases {
                return Err(BackendError::new("listDatabases failed: not authorized on admin"));
            }
            Ok(state
                .databases
                .iter()
                .map(|(name, colls)| {
                    let size_on_disk = colls.iter().map(|c| approximate_size(&c.documents)).sum();
                    DatabaseInfo {
                        name: name.clone(),
                        size_on_disk,
                        empty: colls.iter().all(|c| c.documents.is_empty()),
                    }
                })
                .collect())
        })
    }

    fn count_documents(&self, database: &str, collection: &str) -> BoxFuture<'_, u64> {
        let database = database.to_string();
        let collection = collection.to_string();
        Box::pin(async move {
            let state = self.state.read().await;
            if state.has_fault(&collection, FaultPoint::Count) {
                return Err(BackendError::new(format!("count failed for {}", collection)));
            }
            Ok(state
                .collection(&database, &collection)
                .map(|c| c.documents.len() as u64)
                .unwrap_or(0))
        })
    }

    fn delete_all(&self, database: &str, collection: &str) -> BoxFuture<'_, u64> {
        let database = database.to_string();
        let collection = collection.to_string();
        Box::pin(async move {
            let mut state = self.state.write().await;
            if state.has_fault(&collection, FaultPoint::Delete) {
                return Err(BackendError::new(format!("deleteMany failed for {}", collection)));
            }
            let exists = state.collection(&database, &collection).is_some();
            if !exists {
                return Ok(0);
            }
            let coll = state.collection_mut(&database, &collection);
            let removed = coll.documents.len() as u64;
            coll.documents.clear();
            Ok(removed)
        })
    }

    fn find_all(&self, database: &str, collection: &str) -> BoxFuture<'_, DocumentStream> {
        let database = database.to_string();
        let collection = collection.to_string();
        Box::pin(async move {
            let state = self.state.read().await;
            if state.has_fault(&collection, FaultPoint::Find) {
                return Err(BackendError::new(format!("find failed for {}", collection)));
            }

            let snapshot = state
                .collection(&database, &collection)
                .map(|c| c.documents.clone())
                .unwrap_or_default();

            let items: Vec<Result<Document, BackendError>> = match state.stream_fault(&collection) {
                Some(after) => snapshot
                    .into_iter()
                    .take(after)
                    .map(Ok)
                    .chain(std::iter::once(Err(BackendError::new(format!(
                        "cursor interrupted for {}",
                        collection
                    )))))
                    .collect(),
                None => snapshot.into_iter().map(Ok).collect(),
            };

            let stream: DocumentStream = Box::pin(futures::stream::iter(items));
            Ok(stream)
        })
    }

    fn insert_many(
        &self,
        database: &str,
        collection: &str,
        documents: Vec<Document>,
    ) -> BoxFuture<'_, usize> {
        let database = database.to_string();
        let collection = collection.to_string();
        Box::pin(async move {
            let mut state = self.state.write().await;
            state.inserts.push(InsertCall {
                database: database.clone(),
                collection: collection.clone(),
                size: documents.len(),
            });
            if state.has_fault(&collection, FaultPoint::Insert) {
                return Err(BackendError::new(format!("insertMany failed for {}", collection)));
            }
            let inserted = documents.len();
            state
                .collection_mut(&database, &collection)
                .documents
                .extend(documents);
            Ok(inserted)
        })
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.closes.fetch_add(1, Ordering::SeqCst);
            if self.state.read().await.fail_close {
                return Err(BackendError::new("close failed: socket already shut down"));
            }
            Ok(())
        })
    }
}

/// Maps URI hosts to [`MemoryServer`]s.
#[derive(Default)]
pub struct MemoryConnector {
    servers: RwLock<HashMap<String, MemoryServer>>,
    hanging: RwLock<HashSet<String>>,
    connects: AtomicUsize,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `server` for URIs whose host list equals `hosts`.
    pub async fn register(&self, hosts: &str, server: MemoryServer) {
        self.servers.write().await.insert(hosts.to_string(), server);
    }

    /// Never answer connection attempts to `hosts`.
    pub async fn hang(&self, hosts: &str) {
        self.hanging.write().await.insert(hosts.to_string());
    }

    /// Number of successful connects.
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

impl Connector for MemoryConnector {
    type Handle = MemoryServer;

    fn connect(
        &self,
        uri: &str,
        side: Side,
        _config: &ConnectionConfig,
    ) -> BoxFuture<'_, MemoryServer> {
        let parsed = parse_uri(uri);
        Box::pin(async move {
            let parsed = parsed.ok_or_else(|| {
                BackendError::new("invalid connection string: missing scheme or host")
            })?;

            if self.hanging.read().await.contains(&parsed.hosts) {
                std::future::pending::<()>().await;
            }

            match self.servers.read().await.get(&parsed.hosts) {
                Some(server) => {
                    self.connects.fetch_add(1, Ordering::SeqCst);
                    debug!(side = %side, hosts = %parsed.hosts, "Connected to memory server");
                    Ok(server.clone())
                }
                None => Err(BackendError::new(format!(
                    "{}: Connection refused (os error 111)",
                    parsed.hosts
                ))),
            }
        })
    }
}
