// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Storage backend traits.
//!
//! Defines what the engine needs from a document database. The engine is
//! written against these traits only, so the MongoDB driver
//! ([`crate::mongo`]) and the in-process server ([`crate::memory`]) are
//! interchangeable.
//!
//! # Example
//!
//! ```rust,no_run
//! use db_clone_engine::backend::{BoxFuture, CollectionDescriptor, DatabaseInfo, DocumentStream, ServerHandle};
//! use mongodb::bson::Document;
//!
//! struct ReadOnly;
//!
//! impl ServerHandle for ReadOnly {
//!     fn list_collections(&self, _db: &str) -> BoxFuture<'_, Vec<CollectionDescriptor>> {
//!         Box::pin(async { Ok(vec![]) })
//!     }
//!     fn list_databases(&self) -> BoxFuture<'_, Vec<DatabaseInfo>> {
//!         Box::pin(async { Ok(vec![]) })
//!     }
//!     fn count_documents(&self, _db: &str, _coll: &str) -> BoxFuture<'_, u64> {
//!         Box::pin(async { Ok(0) })
//!     }
//!     fn delete_all(&self, _db: &str, _coll: &str) -> BoxFuture<'_, u64> {
//!         Box::pin(async { Ok(0) })
//!     }
//!     fn find_all(&self, _db: &str, _coll: &str) -> BoxFuture<'_, DocumentStream> {
//!         Box::pin(async { Ok(Box::pin(futures::stream::empty()) as DocumentStream) })
//!     }
//!     fn insert_many(&self, _db: &str, _coll: &str, docs: Vec<Document>) -> BoxFuture<'_, usize> {
//!         Box::pin(async move { Ok(docs.len()) })
//!     }
//!     fn close(&self) -> BoxFuture<'_, ()> {
//!         Box::pin(async { Ok(()) })
//!     }
//! }
//! ```

use crate::config::ConnectionConfig;
use crate::error::Side;
use futures::Stream;
use mongodb::bson::Document;
use std::future::Future;
use std::pin::Pin;

/// Result type for backend operations.
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Type alias for boxed async futures (reduces trait signature complexity).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = BackendResult<T>> + Send + 'a>>;

/// A server-side cursor over a collection.
///
/// Lazy, finite, and consumed once. There is no way to rewind it.
pub type DocumentStream = Pin<Box<dyn Stream<Item = BackendResult<Document>> + Send>>;

/// Simplified error for backend operations.
///
/// Carries the driver's message verbatim so it can be classified later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendError(pub String);

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for BackendError {}

impl From<mongodb::error::Error> for BackendError {
    fn from(e: mongodb::error::Error) -> Self {
        Self(e.to_string())
    }
}

/// Declared type of a collection as reported by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionKind {
    Collection,
    View,
    Timeseries,
    Other(String),
}

impl std::fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollectionKind::Collection => write!(f, "collection"),
            CollectionKind::View => write!(f, "view"),
            CollectionKind::Timeseries => write!(f, "timeseries"),
            CollectionKind::Other(kind) => write!(f, "{}", kind),
        }
    }
}

/// Prefix reserved for database-internal collections.
pub const SYSTEM_COLLECTION_PREFIX: &str = "system.";

/// One entry of a collection listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionDescriptor {
    pub name: String,
    pub kind: CollectionKind,
}

impl CollectionDescriptor {
    pub fn new(name: impl Into<String>, kind: CollectionKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// Shorthand for a plain collection.
    pub fn collection(name: impl Into<String>) -> Self {
        Self::new(name, CollectionKind::Collection)
    }

    /// Whether this is a database-internal collection.
    pub fn is_system(&self) -> bool {
        self.name.starts_with(SYSTEM_COLLECTION_PREFIX)
    }
}

/// One entry of a server's database listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseInfo {
    pub name: String,
    pub size_on_disk: u64,
    pub empty: bool,
}

/// An open connection to one database server.
///
/// Every method is a network round trip (a suspension point). Futures
/// own their arguments, so implementations copy `database`/`collection`
/// before moving into the async block.
pub trait ServerHandle: Send + Sync + 'static {
    /// List collections of `database` in server order.
    fn list_collections(&self, database: &str) -> BoxFuture<'_, Vec<CollectionDescriptor>>;

    /// List every database on the server.
    fn list_databases(&self) -> BoxFuture<'_, Vec<DatabaseInfo>>;

    /// Count documents in a collection.
    fn count_documents(&self, database: &str, collection: &str) -> BoxFuture<'_, u64>;

    /// Delete every document in a collection. Returns the number removed.
    fn delete_all(&self, database: &str, collection: &str) -> BoxFuture<'_, u64>;

    /// Open a cursor over every document in a collection.
    fn find_all(&self, database: &str, collection: &str) -> BoxFuture<'_, DocumentStream>;

    /// Insert documents as one bulk write. Returns the number inserted.
    fn insert_many(
        &self,
        database: &str,
        collection: &str,
        documents: Vec<Document>,
    ) -> BoxFuture<'_, usize>;

    /// Close the connection. Safe to call once per handle.
    fn close(&self) -> BoxFuture<'_, ()>;
}

/// Opens [`ServerHandle`]s from connection strings.
pub trait Connector: Send + Sync + 'static {
    type Handle: ServerHandle + Clone;

    /// Connect and verify the server is reachable.
    ///
    /// Implementations should honor the timeouts in `config`; the
    /// connection manager also applies an outer deadline.
    fn connect(
        &self,
        uri: &str,
        side: Side,
        config: &ConnectionConfig,
    ) -> BoxFuture<'_, Self::Handle>;
}
