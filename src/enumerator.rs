// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Collection enumeration on the source database.
//!
//! [`CollectionEnumerator::list`] returns the server's listing in order,
//! with `system.*` entries still present but tagged via
//! [`CollectionDescriptor::is_system`]. The orchestrator counts those as
//! processed without copying them.
//!
//! # Empty Databases
//!
//! A database with no user collections fails with
//! [`ReplicationError::EmptySource`]. When the name came from the
//! configured default (the URI had no path), the enumerator also lists
//! every database on the server and reports non-empty ones as candidates:
//!
//! ```text
//! No collections found in source database 'test'. Databases with data on
//! this server: shop, analytics. Did you mean to include one of them in the
//! connection string?
//! ```
//!
//! The candidate listing is diagnostic only. The run never switches
//! databases on its own.

use crate::backend::{CollectionDescriptor, DatabaseInfo, ServerHandle};
use crate::error::{ReplicationError, Result};
use tracing::{debug, info, instrument, warn};

/// Databases that never count as candidates.
const RESERVED_DATABASES: &[&str] = &["admin", "local", "config"];

/// Lists collections on the source side.
#[derive(Debug, Clone)]
pub struct CollectionEnumerator {
    default_database: String,
}

impl CollectionEnumerator {
    pub fn new(default_database: impl Into<String>) -> Self {
        Self {
            default_database: default_database.into(),
        }
    }

    /// List collections of `database` in server order.
    ///
    /// Every call re-lists; nothing is cached.
    #[instrument(skip(self, source), fields(database = %database))]
    pub async fn list<H: ServerHandle>(
        &self,
        source: &H,
        database: &str,
        source_is_default: bool,
    ) -> Result<Vec<CollectionDescriptor>> {
        let listing = source
            .list_collections(database)
            .await
            .map_err(|e| ReplicationError::Enumeration {
                database: database.to_string(),
                message: e.to_string(),
            })?;

        let user_collections = listing.iter().filter(|c| !c.is_system()).count();
        debug!(
            total = listing.len(),
            user_collections,
            "Listed source collections"
        );

        if user_collections == 0 {
            let candidates = if source_is_default {
                self.candidate_databases(source).await
            } else {
                Vec::new()
            };
            warn!(
                database = %database,
                candidates = ?candidates,
                "Source database has no collections"
            );
            return Err(ReplicationError::EmptySource {
                database: database.to_string(),
                candidates,
            });
        }

        Ok(listing)
    }

    /// Non-empty databases on the server worth suggesting to the operator.
    ///
    /// A failing listing is logged and yields no candidates.
    pub async fn candidate_databases<H: ServerHandle>(&self, source: &H) -> Vec<String> {
        match source.list_databases().await {
            Ok(databases) => {
                let candidates: Vec<String> = databases
                    .into_iter()
                    .filter(|db| self.is_candidate(db))
                    .map(|db| db.name)
                    .collect();
                info!(count = candidates.len(), "Found candidate databases");
                candidates
            }
            Err(e) => {
                warn!(error = %e, "Could not list databases for diagnostics");
                Vec::new()
            }
        }
    }

    fn is_candidate(&self, db: &DatabaseInfo) -> bool {
        if db.empty || db.name == self.default_database {
            return false;
        }
        if RESERVED_DATABASES.contains(&db.name.as_str()) {
            return false;
        }
        !is_test_named(&db.name)
    }
}

/// `test` itself or anything named `test_*`.
fn is_test_named(name: &str) -> bool {
    name == "test" || name.starts_with("test_")
}
