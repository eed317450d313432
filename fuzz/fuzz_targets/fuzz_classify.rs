//! Fuzz target for error classification.
//!
//! Driver error text is arbitrary; the stored message must always be
//! produced and always lead with the class summary.

#![no_main]

use db_clone_engine::{classify_error, ErrorClass, ReplicationError, Side};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: (&str, bool)| {
    let (cause, source) = data;
    let side = if source { Side::Source } else { Side::Destination };

    let class = ErrorClass::of(cause);
    let message = classify_error(&ReplicationError::connection(side, cause));

    assert!(message.starts_with(class.summary()));
    assert!(!message.is_empty());
});
