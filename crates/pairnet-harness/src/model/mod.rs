//! Operation model and oracles.
//!
//! # Design Principles
//!
//! - Operations mirror host callbacks one to one
//! - The world, not the operation generator, decides what a player id means
//! - Oracles only read public coordinator state

pub mod operation;
pub mod oracle;
mod world;

pub use operation::{Operation, PlayerId};
pub use oracle::{Violation, check_invariants, membership};
pub use world::SimWorld;
