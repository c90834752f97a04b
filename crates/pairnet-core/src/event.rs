//! Events published by the coordinator.
//!
//! The coordinator never calls out to subscribers. Events are queued in an
//! outbox that the host drains after each operation with
//! [`Coordinator::drain_events`](crate::Coordinator::drain_events) and
//! forwards to its event bus.

use crate::{
    connection::{ConnectionKind, SessionJoin},
    device::RegionId,
    identifier::Identifier,
    session::SessionId,
};

/// Something external subscribers may react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingEvent {
    /// Two devices were linked.
    ConnectionCreated {
        /// Client player.
        client: Identifier,
        /// Server player.
        server: Identifier,
        /// Session of the client after the link.
        session: Option<SessionId>,
        /// Regular, secondary or resume.
        kind: ConnectionKind,
        /// How the link related to existing sessions.
        join: SessionJoin,
    },

    /// An active link was closed or repaired away.
    ConnectionClosed {
        /// Client player.
        client: Identifier,
        /// Server player.
        server: Option<Identifier>,
        /// Session of the client after the close.
        session: Option<SessionId>,
        /// Regular or secondary.
        kind: ConnectionKind,
    },

    /// A connection was promoted to main; the host grants starting items.
    FirstItemsGiven {
        /// Client player.
        client: Identifier,
        /// Server player, absent for a player entering alone.
        server: Option<Identifier>,
    },

    /// A land was assigned ahead of entry.
    EntryPrepared {
        /// Entering player.
        client: Identifier,
        /// Destination region.
        dimension: RegionId,
    },

    /// Entry transport finished.
    EntryCompleted {
        /// Entering player.
        client: Identifier,
        /// Region entered, if a land was assigned.
        dimension: Option<RegionId>,
    },

    /// Land chains must be recomputed by the host.
    LandChainsChanged,

    /// Every given-item record was cleared.
    GivenItemsReset,

    /// The observable network differs from the last broadcast.
    NetworkChanged(NetworkSnapshot),
}

/// One connection as seen by players.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSummary {
    /// Client player.
    pub client: Identifier,
    /// Server player.
    pub server: Option<Identifier>,
    /// Devices are linked.
    pub active: bool,
    /// Canonical connection.
    pub main: bool,
    /// Session the connection belongs to.
    pub session: Option<SessionId>,
    /// Assigned land.
    pub dimension: Option<RegionId>,
}

/// Player-visible view of the whole network.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkSnapshot {
    /// Players with an open server.
    pub open_servers: Vec<Identifier>,
    /// Clients waiting to resume.
    pub resuming_clients: Vec<Identifier>,
    /// Servers waiting to resume.
    pub resuming_servers: Vec<Identifier>,
    /// Every connection in handle order.
    pub connections: Vec<ConnectionSummary>,
}
