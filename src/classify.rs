// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! User-facing classification of fatal run errors.
//!
//! Driver errors arrive as free text. The run record needs something an
//! operator can act on, so the raw cause is matched against a small closed
//! table of known substrings. Anything unmatched falls back to a generic
//! message with the raw cause appended.
//!
//! | Class | Matches (case-insensitive) |
//! |-------|----------------------------|
//! | `AuthenticationFailed` | `authentication failed`, `auth failed`, `bad auth`, `unauthorized` |
//! | `ConnectionRefused` | `connection refused`, `econnrefused` |
//! | `HostNotFound` | `enotfound`, `failed to lookup address`, `no such host`, `name or service not known` |
//! | `Timeout` | `timed out`, `timeout` |
//!
//! Order matters: authentication is checked first because auth failures
//! often also mention the server selection that failed.

use crate::error::ReplicationError;

/// Known categories of fatal errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    ConnectionRefused,
    AuthenticationFailed,
    Timeout,
    HostNotFound,
    Generic,
}

const PATTERNS: &[(ErrorClass, &[&str])] = &[
    (
        ErrorClass::AuthenticationFailed,
        &["authentication failed", "auth failed", "bad auth", "unauthorized"],
    ),
    (
        ErrorClass::ConnectionRefused,
        &["connection refused", "econnrefused"],
    ),
    (
        ErrorClass::HostNotFound,
        &[
            "enotfound",
            "failed to lookup address",
            "no such host",
            "name or service not known",
        ],
    ),
    (ErrorClass::Timeout, &["timed out", "timeout"]),
];

impl ErrorClass {
    /// Classify a raw cause string.
    pub fn of(cause: &str) -> Self {
        let lowered = cause.to_lowercase();
        PATTERNS
            .iter()
            .find(|(_, needles)| needles.iter().any(|n| lowered.contains(n)))
            .map(|(class, _)| *class)
            .unwrap_or(ErrorClass::Generic)
    }

    /// Fixed human-readable summary for this class.
    pub fn summary(&self) -> &'static str {
        match self {
            ErrorClass::ConnectionRefused => {
                "Connection refused. Check that the database server is running and reachable"
            }
            ErrorClass::AuthenticationFailed => {
                "Authentication failed. Check the username and password in the connection string"
            }
            ErrorClass::Timeout => {
                "Connection timed out. The server did not respond within the configured timeout"
            }
            ErrorClass::HostNotFound => {
                "Host not found. Check the hostname in the connection string"
            }
            ErrorClass::Generic => "Replication failed",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::ConnectionRefused => "connection_refused",
            ErrorClass::AuthenticationFailed => "authentication_failed",
            ErrorClass::Timeout => "timeout",
            ErrorClass::HostNotFound => "host_not_found",
            ErrorClass::Generic => "generic",
        }
    }
}

/// Build the `errorMessage` stored on a failed run.
///
/// Connection errors are classified; empty-source and cancellation errors
/// already carry operator-ready text and are used as-is.
pub fn classify_error(err: &ReplicationError) -> String {
    match err {
        ReplicationError::Connection { side, message } => {
            let class = ErrorClass::of(message);
            match class {
                ErrorClass::Generic => {
                    format!("{} ({} connection): {}", class.summary(), side, message)
                }
                _ => format!("{} ({} connection)", class.summary(), side),
            }
        }
        ReplicationError::EmptySource { .. } | ReplicationError::Cancelled => err.to_string(),
        other => {
            let raw = other.to_string();
            let class = ErrorClass::of(&raw);
            match class {
                ErrorClass::Generic => format!("{}: {}", class.summary(), raw),
                _ => class.summary().to_string(),
            }
        }
    }
}
