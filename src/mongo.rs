// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! MongoDB backend.
//!
//! Wraps the official driver behind [`Connector`]/[`ServerHandle`].
//!
//! The driver's `Client` connects lazily, so [`MongoConnector::connect`]
//! issues a `ping` against `admin` to surface refused connections, bad
//! credentials and DNS failures at acquisition time instead of at the
//! first collection listing.

use crate::backend::{
    BackendError, BoxFuture, CollectionDescriptor, CollectionKind, Connector, DatabaseInfo,
    DocumentStream, ServerHandle,
};
use crate::config::ConnectionConfig;
use crate::connection::redact_uri;
use crate::error::Side;
use futures::TryStreamExt;
use mongodb::bson::{doc, Document};
use mongodb::options::ClientOptions;
use mongodb::results::CollectionType;
use mongodb::Client;
use tracing::{debug, info};

/// Opens MongoDB connections.
#[derive(Debug, Clone, Default)]
pub struct MongoConnector;

impl MongoConnector {
    pub fn new() -> Self {
        Self
    }
}

impl Connector for MongoConnector {
    type Handle = MongoServer;

    fn connect(
        &self,
        uri: &str,
        side: Side,
        config: &ConnectionConfig,
    ) -> BoxFuture<'_, MongoServer> {
        let uri = uri.to_string();
        let server_selection_timeout = config.server_selection_timeout_duration();
        let connect_timeout = config.connect_timeout_duration();
        let app_name = config.app_name.clone();

        Box::pin(async move {
            debug!(side = %side, uri = %redact_uri(&uri), "Parsing client options");
            let mut options = ClientOptions::parse(&uri).await?;
            options.server_selection_timeout = Some(server_selection_timeout);
            options.connect_timeout = Some(connect_timeout);
            if app_name.is_some() {
                options.app_name = app_name;
            }

            let client = Client::with_options(options)?;
            client
                .database("admin")
                .run_command(doc! { "ping": 1 }, None)
                .await?;

            info!(side = %side, uri = %redact_uri(&uri), "Connected");
            Ok(MongoServer { client, side })
        })
    }
}

/// A verified connection to one MongoDB deployment.
#[derive(Debug, Clone)]
pub struct MongoServer {
    client: Client,
    side: Side,
}

impl MongoServer {
    /// Which side of the run this server serves.
    pub fn side(&self) -> Side {
        self.side
    }

    /// Underlying driver client.
    pub fn client(&self) -> &Client {
        &self.client
    }
}

fn collection_kind(kind: &CollectionType) -> CollectionKind {
    match kind {
        CollectionType::Collection => CollectionKind::Collection,
        CollectionType::View => CollectionKind::View,
        CollectionType::Timeseries => CollectionKind::Timeseries,
        #[allow(unreachable_patterns)]
        other => CollectionKind::Other(format!("{:?}", other).to_lowercase()),
    }
}

impl ServerHandle for MongoServer {
    fn list_collections(&self, database: &str) -> BoxFuture<'_, Vec<CollectionDescriptor>> {
        let db = self.client.database(database);
        Box::pin(async move {
            let specs: Vec<_> = db.list_collections(None, None).await?.try_collect().await?;
            Ok(specs
                .into_iter()
                .map(|spec| CollectionDescriptor::new(spec.name, collection_kind(&spec.collection_type)))
                .collect())
        })
    }

    fn list_databases(&self) -> BoxFuture<'_, Vec<DatabaseInfo>> {
        Box::pin(async move {
            let specs = self.client.list_databases(None, None).await?;
            Ok(specs
                .into_iter()
                .map(|spec| DatabaseInfo {
                    name: spec.name,
                    size_on_disk: spec.size_on_disk,
                    empty: spec.empty,
                })
                .collect())
        })
    }

    fn count_documents(&self, database: &str, collection: &str) -> BoxFuture<'_, u64> {
        let coll = self.client.database(database).collection::<Document>(collection);
        Box::pin(async move { Ok(coll.count_documents(None, None).await?) })
    }

    fn delete_all(&self, database: &str, collection: &str) -> BoxFuture<'_, u64> {
        let coll = self.client.database(database).collection::<Document>(collection);
        Box::pin(async move {
            let result = coll.delete_many(doc! {}, None).await?;
            Ok(result.deleted_count)
        })
    }

    fn find_all(&self, database: &str, collection: &str) -> BoxFuture<'_, DocumentStream> {
        let coll = self.client.database(database).collection::<Document>(collection);
        Box::pin(async move {
            let cursor = coll.find(None, None).await?;
            let stream: DocumentStream = Box::pin(cursor.map_err(BackendError::from));
            Ok(stream)
        })
    }

    fn insert_many(
        &self,
        database: &str,
        collection: &str,
        documents: Vec<Document>,
    ) -> BoxFuture<'_, usize> {
        let coll = self.client.database(database).collection::<Document>(collection);
        Box::pin(async move {
            if documents.is_empty() {
                return Ok(0);
            }
            let result = coll.insert_many(documents, None).await?;
            Ok(result.inserted_ids.len())
        })
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        let client = self.client.clone();
        let side = self.side;
        Box::pin(async move {
            client.shutdown().await;
            debug!(side = %side, "Connection closed");
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_kind_mapping() {
        assert_eq!(collection_kind(&CollectionType::Collection), CollectionKind::Collection);
        assert_eq!(collection_kind(&CollectionType::View), CollectionKind::View);
        assert_eq!(collection_kind(&CollectionType::Timeseries), CollectionKind::Timeseries);
    }

    #[tokio::test]
    async fn test_connect_rejects_malformed_uri() {
        let connector = MongoConnector::new();
        let result = connector
            .connect("not-a-uri", Side::Source, &ConnectionConfig::for_testing())
            .await;
        assert!(result.is_err());
    }
}
