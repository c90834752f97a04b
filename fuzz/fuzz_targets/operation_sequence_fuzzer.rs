//! Fuzz target for coordinator operation sequences
//!
//! # Strategy
//!
//! - Player count: 1 to 8 players, each owning one device
//! - Config: global or independent start, small session limits
//! - Event sequences: arbitrary host callbacks, including device
//!   destruction, relocation and save/reload mid-sequence
//!
//! # Invariants
//!
//! - At most one main connection per player per role
//! - Server waiting maps are disjoint
//! - No two connections share a client/server pair
//! - Every connection belongs to exactly one session
//! - A second consistency pass changes nothing
//! - NEVER panic

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use pairnet_core::CoordinatorConfig;
use pairnet_harness::{Operation, SimWorld, check_invariants};

#[derive(Debug, Clone, Arbitrary)]
struct FuzzInput {
    players: u8,
    global_session: bool,
    max_session_players: u8,
    ops: Vec<Operation>,
}

fuzz_target!(|input: FuzzInput| {
    let players = usize::from(input.players % 8) + 1;
    let config = CoordinatorConfig {
        global_session: input.global_session,
        max_session_players: usize::from(input.max_session_players % 6) + 1,
        ..CoordinatorConfig::default()
    };
    let mut world = SimWorld::new(players, config);

    for op in input.ops {
        let op = op.clamped(players);
        if let Err(e) = world.apply(&op) {
            panic!("{op:?} failed: {e}");
        }
        if let Err(violation) = check_invariants(world.coordinator()) {
            panic!("{violation:?} after {op:?}");
        }
    }

    let first = world.repair();
    let second = world.repair();
    assert_eq!(first, second, "consistency pass is not idempotent");
});
