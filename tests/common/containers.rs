// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Testcontainers setup for MongoDB.
//!
//! Provides helpers to spin up MongoDB containers for integration tests.

use mongodb::bson::{doc, Document};
use mongodb::Client;
use testcontainers::{clients::Cli, core::WaitFor, Container, GenericImage};

/// Create a standalone MongoDB container.
///
/// Uses the official mongo:7 image. Waits for "Waiting for connections".
pub fn mongo_container(docker: &Cli) -> Container<'_, GenericImage> {
    let image = GenericImage::new("mongo", "7")
        .with_exposed_port(27017)
        .with_wait_for(WaitFor::message_on_stdout("Waiting for connections"));
    docker.run(image)
}

/// Connection string for a container, without a database path.
pub fn mongo_url(container: &Container<'_, GenericImage>) -> String {
    let port = container.get_host_port_ipv4(27017);
    format!("mongodb://127.0.0.1:{}", port)
}

/// A MongoDB server under test.
pub struct TestMongo<'a> {
    #[allow(dead_code)] // Kept alive for container lifetime
    container: Container<'a, GenericImage>,
    pub url: String,
}

impl<'a> TestMongo<'a> {
    pub fn new(docker: &'a Cli) -> Self {
        let container = mongo_container(docker);
        let url = mongo_url(&container);
        Self { container, url }
    }

    /// Connection string pointing at `database`.
    pub fn url_for(&self, database: &str) -> String {
        format!("{}/{}", self.url, database)
    }

    pub async fn client(&self) -> Client {
        Client::with_uri_str(&self.url).await.expect("valid mongo url")
    }

    /// Insert `count` documents `{ seq: i }` into a collection.
    pub async fn seed(&self, database: &str, collection: &str, count: usize) {
        if count == 0 {
            self.client()
                .await
                .database(database)
                .create_collection(collection, None)
                .await
                .expect("create collection");
            return;
        }
        let docs: Vec<Document> = (0..count).map(|i| doc! { "seq": i as i64 }).collect();
        self.client()
            .await
            .database(database)
            .collection::<Document>(collection)
            .insert_many(docs, None)
            .await
            .expect("seed documents");
    }

    pub async fn count(&self, database: &str, collection: &str) -> u64 {
        self.client()
            .await
            .database(database)
            .collection::<Document>(collection)
            .count_documents(None, None)
            .await
            .expect("count documents")
    }
}
