//! Main connection promotion and the two-phase entry flow.

use super::Coordinator;
use crate::{
    connection::{Connection, ConnectionId},
    device::{DeviceDirectory, RegionId, Role},
    event::PairingEvent,
    identifier::Identifier,
    land::LandAllocator,
    session::SessionMode,
};

impl Coordinator {
    /// Promote `player`'s active connection to main.
    ///
    /// Refused if the connection already is main, or if its client already
    /// has a main client connection, or its server a main server connection.
    pub fn give_items(&mut self, devices: &mut impl DeviceDirectory, player: Identifier) -> bool {
        let Some(id) = self.active_connection_id(player) else {
            return false;
        };
        let Some(connection) = self.connections.get(&id) else {
            return false;
        };
        let client = connection.client();
        let server = connection.server();

        if connection.is_main()
            || self.main_connection_id(client, Role::Client).is_some()
            || server.is_some_and(|s| self.main_connection_id(s, Role::Server).is_some())
        {
            return false;
        }

        if let Some(connection) = self.connections.get_mut(&id) {
            connection.set_main();
            for location in [connection.client_device(), connection.server_device()].into_iter().flatten() {
                if let Some(device) = devices.device_mut(location) {
                    device.mark_dirty();
                }
            }
        }
        tracing::info!(%client, ?server, "connection promoted to main");
        self.events.push(PairingEvent::FirstItemsGiven { client, server });
        self.broadcast();
        true
    }

    /// First phase of entry: make sure `target` has a connection and a land.
    ///
    /// Returns the destination region, or `None` if entry cannot proceed.
    /// An active connection is promoted to main; if its server already has a
    /// main server connection, entry is refused. A player with no connection
    /// at all gets a main connection of their own, admitted into a session.
    /// If admission fails in global mode the global session is split and
    /// admission retried; if that also fails every session is merged back
    /// and entry is refused.
    pub fn prepare_entry(
        &mut self,
        devices: &mut impl DeviceDirectory,
        lands: &mut impl LandAllocator,
        target: Identifier,
    ) -> Option<RegionId> {
        let id = match self.main_connection_id(target, Role::Client) {
            Some(id) => id,
            None => match self.active_connection_id(target) {
                Some(id) => {
                    if !self.give_items(devices, target) {
                        tracing::warn!(%target, "active connection cannot become main, entry refused");
                        return None;
                    }
                    id
                },
                None => self.create_entry_connection(target)?,
            },
        };

        if let Some(land) = self.connections.get(&id).and_then(Connection::land) {
            return Some(land.dimension.clone());
        }

        let session = self.roster.session_of_connection(id);
        let Some(land) = lands.prepare_land(target, session) else {
            tracing::warn!(%target, "no land could be prepared, entry refused");
            return None;
        };
        let dimension = land.dimension.clone();
        if let Some(connection) = self.connections.get_mut(&id) {
            connection.set_land(land);
        }

        tracing::info!(%target, %dimension, "entry prepared");
        self.events.push(PairingEvent::EntryPrepared { client: target, dimension: dimension.clone() });
        Some(dimension)
    }

    fn create_entry_connection(&mut self, target: Identifier) -> Option<ConnectionId> {
        tracing::info!(%target, "player entering without connection, creating one");
        let id = self.allocate_connection();
        self.connections.insert(id, Connection::self_link(id, target));

        if let Err(first) = self.admit(id) {
            if self.roster.mode() != SessionMode::Global {
                tracing::error!(%target, reason = %first, "could not create connection, stopping entry");
                self.connections.remove(&id);
                return None;
            }

            tracing::warn!(%target, reason = %first, "could not create connection, retrying with global session disabled");
            self.roster.split_global_session(&self.connections);

            if let Err(second) = self.admit(id) {
                self.connections.remove(&id);
                self.roster.merge_all();
                tracing::error!(%target, reason = %second, "could not create connection, stopping entry");
                return None;
            }
        }

        self.events.push(PairingEvent::FirstItemsGiven { client: target, server: None });
        Some(id)
    }

    /// Second phase of entry, called once entry transport succeeded.
    pub fn on_entry(&mut self, devices: &mut impl DeviceDirectory, target: Identifier) {
        let Some(id) = self.main_connection_id(target, Role::Client) else {
            tracing::error!(%target, "finished entry without a main connection");
            return;
        };

        let mut dimension = None;
        if let Some(connection) = self.connections.get_mut(&id) {
            connection.set_entered();
            connection.clear_coordinate_override();
            dimension = connection.land().map(|l| l.dimension.clone());
        }
        self.events.push(PairingEvent::EntryCompleted { client: target, dimension });

        self.update_all(devices);
        self.events.push(PairingEvent::LandChainsChanged);
    }

    /// Center the next entry of `client` on the given coordinates.
    pub fn set_entry_center(&mut self, client: Identifier, center_x: i32, center_z: i32) -> bool {
        let Some(id) = self.main_connection_id(client, Role::Client) else {
            return false;
        };
        self.connections
            .get_mut(&id)
            .map(|c| c.set_coordinate_override(center_x, center_z))
            .is_some()
    }

    /// Remember that `item` was given to `client` through their main
    /// connection. Returns `false` if there is no main connection or the
    /// item was already given.
    pub fn record_given_item(&mut self, client: Identifier, item: &str) -> bool {
        let Some(id) = self.main_connection_id(client, Role::Client) else {
            return false;
        };
        self.connections.get_mut(&id).is_some_and(|c| c.give_item(item))
    }

    /// Clear every connection's given-item record.
    pub fn reset_given_items(&mut self) {
        for connection in self.connections.values_mut() {
            connection.reset_given_items();
        }
        tracing::info!(connections = self.connections.len(), "given items reset");
        self.events.push(PairingEvent::GivenItemsReset);
    }
}
