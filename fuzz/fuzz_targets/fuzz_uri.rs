//! Fuzz target for connection string handling.
//!
//! Parsing and redaction run on every job before any connection is made,
//! so they must never panic on arbitrary input.

#![no_main]

use db_clone_engine::connection::{parse_uri, redact_uri, resolve_database_names};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: (&str, &str)| {
    let (source, destination) = data;

    // Should never panic
    let parsed = parse_uri(source);
    let redacted = redact_uri(source);

    // Redaction is idempotent
    assert_eq!(redact_uri(&redacted), redacted);

    // A parsed URI always has hosts
    if let Some(parsed) = parsed {
        assert!(!parsed.hosts.is_empty());
    }

    // Destination falls back to the source name
    let names = resolve_database_names(source, destination, "test");
    assert!(!names.source.is_empty());
    if parse_uri(destination).and_then(|p| p.database).is_none() {
        assert_eq!(names.destination, names.source);
    }
});
