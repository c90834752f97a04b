//! Simulation harness for pairnet coordinator testing.
//!
//! A [`SimWorld`] pairs a real coordinator with an in-memory device world in
//! which every simulated player owns one device. Random [`Operation`]
//! sequences drive the world, and the oracles in [`model::oracle`] check the
//! coordinator's invariants after every step.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod model;

pub use model::{Operation, PlayerId, SimWorld, Violation, check_invariants, membership};
