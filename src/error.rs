// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error types for the clone engine.
//!
//! Errors are split by how far they are allowed to travel:
//!
//! | Error Type | Fatal to run | Description |
//! |------------|--------------|-------------|
//! | `Connection` | Yes | Connect, auth or timeout failure on one side |
//! | `Enumeration` | Yes | Listing the source database failed (e.g. not authorized) |
//! | `EmptySource` | Yes | Resolved database has no usable collections |
//! | `CollectionCopy` | No | Failure isolated to a single collection |
//! | `Cancelled` | Yes | Caller aborted the run |
//! | `JobNotFound` | Yes | Job registry has no such job (no run created) |
//! | `History` | No | History store write failed (logged only) |
//! | `Config` | Yes | Configuration invalid |
//! | `Internal` | Yes | Unexpected internal error |
//!
//! `CollectionCopy` never propagates past the orchestrator loop; it is
//! converted into a per-collection result instead.

use std::fmt;
use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, ReplicationError>;

/// Which end of the clone a connection belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Source,
    Destination,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Source => write!(f, "source"),
            Side::Destination => write!(f, "destination"),
        }
    }
}

/// Errors that can occur during a clone run.
#[derive(Error, Debug)]
pub enum ReplicationError {
    /// Could not establish a connection to one side.
    ///
    /// No collections are touched when this occurs.
    #[error("Connection error ({side}): {message}")]
    Connection { side: Side, message: String },

    /// The source server is reachable but refused or failed the listing.
    #[error("Failed to list collections in '{database}': {message}")]
    Enumeration { database: String, message: String },

    /// The resolved source database has nothing to copy.
    ///
    /// `candidates` lists non-empty sibling databases found on the
    /// source server, for operator remediation.
    #[error("{}", empty_source_message(.database, .candidates))]
    EmptySource {
        database: String,
        candidates: Vec<String>,
    },

    /// A single collection failed to copy.
    #[error("Collection copy error ({collection}): {message}")]
    CollectionCopy { collection: String, message: String },

    /// The caller cancelled the run.
    #[error("Replication cancelled")]
    Cancelled,

    /// The job registry returned nothing for the requested id.
    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// History persistence failed.
    #[error("History store error: {0}")]
    History(#[from] sqlx::Error),

    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

fn empty_source_message(database: &str, candidates: &[String]) -> String {
    if candidates.is_empty() {
        format!("No collections found in source database '{}'", database)
    } else {
        format!(
            "No collections found in source database '{}'. Databases with data on this server: {}. Did you mean to include one of them in the connection string?",
            database,
            candidates.join(", ")
        )
    }
}

impl ReplicationError {
    /// Create a connection error for the given side.
    pub fn connection(side: Side, message: impl Into<String>) -> Self {
        Self::Connection {
            side,
            message: message.into(),
        }
    }

    /// Create a collection copy error.
    pub fn collection_copy(collection: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CollectionCopy {
            collection: collection.into(),
            message: message.into(),
        }
    }

    /// Whether this error terminates the whole run.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Connection { .. } => true,
            Self::Enumeration { .. } => true,
            Self::EmptySource { .. } => true,
            Self::CollectionCopy { .. } => false,
            Self::Cancelled => true,
            Self::JobNotFound(_) => true,
            Self::History(_) => false, // Logged, never fails a run
            Self::Config(_) => true,
            Self::Internal(_) => true,
        }
    }

    /// Stable label for metrics and run records.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connection { .. } => "connection",
            Self::Enumeration { .. } => "enumeration",
            Self::EmptySource { .. } => "empty_source",
            Self::CollectionCopy { .. } => "collection_copy",
            Self::Cancelled => "cancelled",
            Self::JobNotFound(_) => "job_not_found",
            Self::History(_) => "history",
            Self::Config(_) => "config",
            Self::Internal(_) => "internal",
        }
    }
}
