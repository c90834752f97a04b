//! Pairnet: server-authoritative device pairing coordinator.
//!
//! Players own in-world devices. A device advertises its owner as an open
//! server, a resuming server or a resuming client, and the coordinator
//! matches advertisements into client/server connections, groups the
//! resulting connections into sessions and persists the whole network across
//! server restarts.
//!
//! ## Architecture
//!
//! ```text
//! pairnet-core
//!   ├─ ServerBinding       (per-server-instance lifecycle)
//!   ├─ Coordinator         (pairing state store + protocol)
//!   │    ├─ pairing        (request / connect / close / relocate)
//!   │    ├─ entry          (items, entry preparation and completion)
//!   │    ├─ check          (consistency checker)
//!   │    └─ notify         (device fan-out + network broadcast)
//!   ├─ Roster              (session merge engine)
//!   ├─ persist             (versioned CBOR record)
//!   └─ DeviceDirectory     (host-provided device lookup)
//! ```
//!
//! The coordinator never performs I/O. Device state is read and written
//! through a [`DeviceDirectory`] supplied by the caller, and everything
//! external subscribers care about is queued as [`PairingEvent`]s that the
//! host drains after each call.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod connection;
pub mod coordinator;
pub mod device;
pub mod error;
pub mod event;
pub mod identifier;
pub mod land;
pub mod lifecycle;
pub mod persist;
pub mod session;

pub use config::CoordinatorConfig;
pub use connection::{Connection, ConnectionId, ConnectionKind, ConnectionTable, SessionJoin};
pub use coordinator::{Coordinator, Queue, RequestOutcome};
pub use device::{
    Device, DeviceDirectory, DeviceLocation, MemoryDirectory, RegionId, Role, RoleSlot,
    StatusMessage,
};
pub use error::PairingError;
pub use event::{ConnectionSummary, NetworkSnapshot, PairingEvent};
pub use identifier::{IdentifierRegistry, Identifier, IdentityEntry};
pub use land::{LandAllocator, LandInfo, RotatingLands};
pub use lifecycle::{ServerBinding, ServerInstance};
pub use persist::{PairingRecord, RECORD_VERSION};
pub use session::{MergeRejection, MergeResult, Roster, Session, SessionId, SessionMode};
