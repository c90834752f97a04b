//! Fuzz target for persisted pairing records
//!
//! Records come from disk and may be truncated, hand-edited or written by an
//! older version.
//!
//! # Strategy
//!
//! - Raw bytes: arbitrary input straight into the decoder
//! - Restore: every record that decodes is restored into a coordinator
//! - Re-encode: the restored coordinator is written and decoded again
//!
//! # Invariants
//!
//! - NEVER panic on malformed input
//! - A decoded record always carries the current version
//! - Restoring, writing and restoring again is a fixed point

#![no_main]

use libfuzzer_sys::fuzz_target;
use pairnet_core::{Coordinator, CoordinatorConfig, RECORD_VERSION, persist};

fuzz_target!(|data: &[u8]| {
    let Ok(record) = persist::decode(data) else {
        return;
    };
    assert_eq!(record.version, RECORD_VERSION);

    let coordinator = Coordinator::from_record(CoordinatorConfig::default(), record);
    let written = coordinator.write();
    let bytes = persist::encode(&written).expect("restored state must encode");
    let reread = persist::decode(&bytes).expect("encoded state must decode");

    let again = Coordinator::from_record(CoordinatorConfig::default(), reread);
    assert_eq!(again.write(), written, "restore is not a fixed point");
});
