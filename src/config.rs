// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Configuration for the clone engine.
//!
//! This module defines all configuration types needed to run the engine.
//! Configuration is passed to [`ReplicationEngine::new()`](crate::ReplicationEngine::new)
//! and can be constructed programmatically or deserialized with serde.
//!
//! # Quick Start
//!
//! ```rust
//! use db_clone_engine::config::{EngineConfig, CopyConfig};
//!
//! let config = EngineConfig {
//!     copy: CopyConfig { batch_size: 500 },
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//! ```
//!
//! # Configuration Structure
//!
//! ```text
//! EngineConfig
//! ├── connection: ConnectionConfig  # Timeouts and default database
//! ├── copy: CopyConfig              # Batch sizing
//! └── history: HistoryConfig        # SQLite run history
//! ```
//!
//! # YAML Example
//!
//! ```yaml
//! connection:
//!   server_selection_timeout: "10s"
//!   connect_timeout: "15s"
//!   default_database: "test"
//!
//! copy:
//!   batch_size: 1000
//!
//! history:
//!   sqlite_path: "/var/lib/app/clone_history.db"
//! ```

use crate::error::{ReplicationError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ═══════════════════════════════════════════════════════════════════════════════
// Top-level config
// ═══════════════════════════════════════════════════════════════════════════════

/// The top-level config object passed to `ReplicationEngine::new()`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Connection timeouts and database name fallback.
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Per-collection copy settings.
    #[serde(default)]
    pub copy: CopyConfig,

    /// Run history persistence settings.
    #[serde(default)]
    pub history: HistoryConfig,
}

impl EngineConfig {
    /// Create a config with short timeouts and small batches for tests.
    pub fn for_testing() -> Self {
        Self {
            connection: ConnectionConfig::for_testing(),
            copy: CopyConfig::testing(),
            history: HistoryConfig::in_memory(),
        }
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.copy.batch_size == 0 {
            return Err(ReplicationError::Config(
                "copy.batch_size must be greater than zero".to_string(),
            ));
        }
        if self.connection.default_database.trim().is_empty() {
            return Err(ReplicationError::Config(
                "connection.default_database must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ConnectionConfig
// ═══════════════════════════════════════════════════════════════════════════════

/// Connection settings applied to both sides of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// How long the driver may spend finding a usable server, e.g. `"10s"`.
    #[serde(default = "default_server_selection_timeout")]
    pub server_selection_timeout: String,

    /// TCP/handshake timeout per connection attempt, e.g. `"15s"`.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: String,

    /// Database used when the source URI has no path component.
    #[serde(default = "default_database")]
    pub default_database: String,

    /// Optional application name reported to the server.
    #[serde(default)]
    pub app_name: Option<String>,
}

fn default_server_selection_timeout() -> String {
    "10s".to_string()
}

fn default_connect_timeout() -> String {
    "15s".to_string()
}

fn default_database() -> String {
    "test".to_string()
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            server_selection_timeout: "10s".to_string(),
            connect_timeout: "15s".to_string(),
            default_database: "test".to_string(),
            app_name: None,
        }
    }
}

impl ConnectionConfig {
    /// Fast-fail timeouts for tests.
    pub fn for_testing() -> Self {
        Self {
            server_selection_timeout: "500ms".to_string(),
            connect_timeout: "500ms".to_string(),
            default_database: "testdb".to_string(),
            app_name: Some("db-clone-engine-tests".to_string()),
        }
    }

    /// Parse the server selection timeout, falling back to 10 seconds.
    pub fn server_selection_timeout_duration(&self) -> Duration {
        humantime::parse_duration(&self.server_selection_timeout)
            .unwrap_or(Duration::from_secs(10))
    }

    /// Parse the connect timeout, falling back to 15 seconds.
    pub fn connect_timeout_duration(&self) -> Duration {
        humantime::parse_duration(&self.connect_timeout).unwrap_or(Duration::from_secs(15))
    }

    /// Upper bound for acquiring one side.
    pub fn acquire_deadline(&self) -> Duration {
        self.connect_timeout_duration() + self.server_selection_timeout_duration()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CopyConfig
// ═══════════════════════════════════════════════════════════════════════════════

/// Per-collection copy settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyConfig {
    /// Documents per bulk insert.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_batch_size() -> usize {
    1000
}

impl Default for CopyConfig {
    fn default() -> Self {
        Self { batch_size: 1000 }
    }
}

impl CopyConfig {
    /// Small batches so tests exercise several flushes.
    pub fn testing() -> Self {
        Self { batch_size: 10 }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// HistoryConfig
// ═══════════════════════════════════════════════════════════════════════════════

/// Run history persistence configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Path to SQLite database for run history.
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,

    /// Whether to use WAL mode for SQLite (recommended).
    #[serde(default = "default_true")]
    pub wal_mode: bool,
}

fn default_sqlite_path() -> String {
    "clone_history.db".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            sqlite_path: "clone_history.db".to_string(),
            wal_mode: true,
        }
    }
}

impl HistoryConfig {
    /// Create an in-memory config for testing.
    pub fn in_memory() -> Self {
        Self {
            sqlite_path: ":memory:".to_string(),
            wal_mode: false,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
