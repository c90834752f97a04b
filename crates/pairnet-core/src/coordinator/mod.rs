//! Pairing Coordinator
//!
//! Authoritative state for the device pairing network of one running server.
//!
//! ## Responsibilities
//!
//! - Waiting maps: players whose device advertises an open server, a
//!   resuming client or a resuming server
//! - Connections: every client/server pairing, active or historical
//! - Sessions: delegated to the [`Roster`] merge engine
//! - Repair: the consistency pass reconciles state with the device world
//! - Fan-out: device slot writes and the [`PairingEvent`] outbox
//!
//! ## Design
//!
//! - Single owner: all mutation goes through `&mut self` on the host tick
//! - Devices are never owned: every operation that touches them borrows a
//!   [`DeviceDirectory`](crate::DeviceDirectory) from the host
//! - Typed outcomes: rejected requests and merge denials are values, errors
//!   are reserved for persistence and broken host contracts
//! - One connection table: sessions and land lookups hold handles into it

mod check;
mod entry;
mod notify;
mod pairing;
mod record;

use std::collections::{BTreeMap, BTreeSet};

use crate::{
    config::CoordinatorConfig,
    connection::{Connection, ConnectionId, ConnectionKind, ConnectionTable, SessionJoin},
    device::{DeviceLocation, RegionId, Role},
    event::{NetworkSnapshot, PairingEvent},
    identifier::{Identifier, IdentifierRegistry},
    land::LandInfo,
    session::{MergeRejection, Roster, Session, SessionMode},
};

/// One of the three waiting maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Queue {
    /// Servers accepting any client.
    OpenServers,
    /// Clients waiting for their main server.
    ResumingClients,
    /// Servers waiting for their main client.
    ResumingServers,
}

impl Queue {
    /// Every queue, in persistence order.
    pub const ALL: [Self; 3] = [Self::OpenServers, Self::ResumingClients, Self::ResumingServers];

    /// Device slot a waiting entry occupies.
    pub const fn role(self) -> Role {
        match self {
            Self::ResumingClients => Role::Client,
            Self::OpenServers | Self::ResumingServers => Role::Server,
        }
    }
}

/// Result of a connection request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// Ineligible device or busy role. Nothing changed.
    Rejected,
    /// The device now waits in a queue.
    Waiting(Queue),
    /// Both devices were linked.
    Connected {
        /// Regular, secondary or resume.
        kind: ConnectionKind,
        /// How the link related to existing sessions.
        join: SessionJoin,
    },
    /// The merge engine refused the link. The counterpart keeps waiting.
    Denied(MergeRejection),
    /// The waiting counterpart's device no longer resolves.
    CounterpartGone,
}

impl RequestOutcome {
    /// Whether the request was handled, even if no link resulted.
    pub fn is_accepted(self) -> bool {
        !matches!(self, Self::Rejected)
    }
}

/// The pairing state store.
#[derive(Debug)]
pub struct Coordinator {
    config: CoordinatorConfig,
    identifiers: IdentifierRegistry,
    open_servers: BTreeMap<Identifier, DeviceLocation>,
    resuming_clients: BTreeMap<Identifier, DeviceLocation>,
    resuming_servers: BTreeMap<Identifier, DeviceLocation>,
    connections: ConnectionTable,
    next_connection: u64,
    roster: Roster,
    /// Devices relocated this tick; cleared by the host at tick end
    moving: BTreeSet<DeviceLocation>,
    events: Vec<PairingEvent>,
    last_snapshot: Option<NetworkSnapshot>,
}

impl Coordinator {
    /// Create an empty coordinator.
    pub fn new(config: CoordinatorConfig) -> Self {
        let roster = Roster::new(config.initial_mode(), config.max_session_players);
        Self::with_parts(config, IdentifierRegistry::new(), roster)
    }

    fn with_parts(config: CoordinatorConfig, identifiers: IdentifierRegistry, roster: Roster) -> Self {
        Self {
            config,
            identifiers,
            open_servers: BTreeMap::new(),
            resuming_clients: BTreeMap::new(),
            resuming_servers: BTreeMap::new(),
            connections: ConnectionTable::new(),
            next_connection: 0,
            roster,
            moving: BTreeSet::new(),
            events: Vec::new(),
            last_snapshot: None,
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Player identity registry.
    pub fn identifiers(&self) -> &IdentifierRegistry {
        &self.identifiers
    }

    /// Issue (or look up) the identifier for a host player key.
    pub fn identify(&mut self, key: &str, name: &str) -> Identifier {
        self.identifiers.issue(key, name)
    }

    /// Session roster.
    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// Entries of one waiting map.
    pub fn queue(&self, queue: Queue) -> &BTreeMap<Identifier, DeviceLocation> {
        match queue {
            Queue::OpenServers => &self.open_servers,
            Queue::ResumingClients => &self.resuming_clients,
            Queue::ResumingServers => &self.resuming_servers,
        }
    }

    fn queue_mut(&mut self, queue: Queue) -> &mut BTreeMap<Identifier, DeviceLocation> {
        match queue {
            Queue::OpenServers => &mut self.open_servers,
            Queue::ResumingClients => &mut self.resuming_clients,
            Queue::ResumingServers => &mut self.resuming_servers,
        }
    }

    /// Whether `player` waits in `queue`.
    pub fn is_waiting(&self, player: Identifier, queue: Queue) -> bool {
        self.queue(queue).contains_key(&player)
    }

    /// Every connection in handle order.
    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    /// Active connection with `client` as its client.
    pub fn active_connection(&self, client: Identifier) -> Option<&Connection> {
        self.active_connection_id(client).and_then(|id| self.connections.get(&id))
    }

    fn active_connection_id(&self, client: Identifier) -> Option<ConnectionId> {
        self.connections
            .values()
            .find(|c| c.is_active() && c.client() == client)
            .map(Connection::id)
    }

    /// Main connection where `player` holds `role`.
    pub fn main_connection(&self, player: Identifier, role: Role) -> Option<&Connection> {
        self.main_connection_id(player, role).and_then(|id| self.connections.get(&id))
    }

    fn main_connection_id(&self, player: Identifier, role: Role) -> Option<ConnectionId> {
        self.connections
            .values()
            .find(|c| {
                c.is_main()
                    && match role {
                        Role::Client => c.client() == player,
                        Role::Server => c.server() == Some(player),
                    }
            })
            .map(Connection::id)
    }

    /// Counterpart of `player`'s main connection in `role`.
    ///
    /// A main client connection without a server player has no partner.
    pub fn associated_partner(&self, player: Identifier, role: Role) -> Option<Identifier> {
        let main = self.main_connection(player, role)?;
        match role {
            Role::Client => main.server(),
            Role::Server => Some(main.client()),
        }
    }

    /// Connection between `client` and `server`.
    pub fn connection(&self, client: Identifier, server: Identifier) -> Option<&Connection> {
        self.connection_id(client, server).and_then(|id| self.connections.get(&id))
    }

    fn connection_id(&self, client: Identifier, server: Identifier) -> Option<ConnectionId> {
        self.connections
            .values()
            .find(|c| c.client() == client && c.server() == Some(server))
            .map(Connection::id)
    }

    /// Active connection served from the device at `location`.
    pub fn server_connection(&self, location: &DeviceLocation) -> Option<&Connection> {
        self.connections.values().find(|c| c.server_device() == Some(location))
    }

    /// Session containing a connection involving `player`.
    pub fn session_of(&self, player: Identifier) -> Option<&Session> {
        self.roster
            .session_of(player, &self.connections)
            .and_then(|id| self.roster.session(id))
    }

    /// Member connections of `session`.
    pub fn session_connections<'a>(&'a self, session: &'a Session) -> impl Iterator<Item = &'a Connection> {
        session.members(&self.connections)
    }

    /// Land assigned to the connection whose client lives in `dimension`.
    pub fn land_info_for_dimension(&self, dimension: &RegionId) -> Option<&LandInfo> {
        self.connections
            .values()
            .filter_map(Connection::land)
            .find(|land| &land.dimension == dimension)
    }

    /// Switch session mode live.
    pub fn set_session_mode(&mut self, mode: SessionMode) {
        self.roster.set_mode(mode, &self.connections);
    }

    /// Take every event published since the last drain.
    pub fn drain_events(&mut self) -> Vec<PairingEvent> {
        std::mem::take(&mut self.events)
    }

    fn allocate_connection(&mut self) -> ConnectionId {
        self.next_connection += 1;
        ConnectionId::from_raw(self.next_connection)
    }

    fn admit(&mut self, id: ConnectionId) -> Result<(), MergeRejection> {
        match self.connections.get(&id) {
            Some(connection) => self.roster.admit(connection, &self.connections),
            None => Ok(()),
        }
    }
}
