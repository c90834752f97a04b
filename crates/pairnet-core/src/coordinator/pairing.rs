//! Connect, disconnect and resume protocol.

use super::{Coordinator, Queue, RequestOutcome, notify::write_device};
use crate::{
    connection::{Connection, ConnectionId, ConnectionKind},
    device::{DeviceDirectory, DeviceLocation, Role, StatusMessage},
    error::PairingError,
    event::PairingEvent,
    identifier::Identifier,
    session::MergeRejection,
};

/// Waiting entry taken out of a queue by a link in progress.
struct Claimed {
    player: Identifier,
    location: DeviceLocation,
    queue: Queue,
}

impl Coordinator {
    /// Handle a player asking to pair through their device.
    ///
    /// `other` is the explicitly chosen counterpart, if any. On any accepted
    /// outcome the device is marked dirty and the network updated.
    pub fn request_connection(
        &mut self,
        devices: &mut impl DeviceDirectory,
        player: Identifier,
        location: &DeviceLocation,
        other: Option<Identifier>,
        role: Role,
    ) -> RequestOutcome {
        if self.config.is_excluded(&location.region) {
            tracing::debug!(%player, %location, "request from excluded region");
            return RequestOutcome::Rejected;
        }
        match devices.device(location) {
            Some(device) if device.owner() == player => {},
            Some(_) => {
                tracing::debug!(%player, %location, "request through a device owned by someone else");
                return RequestOutcome::Rejected;
            },
            None => {
                tracing::debug!(%player, %location, "request from unresolved device");
                return RequestOutcome::Rejected;
            },
        }

        let outcome = match role {
            Role::Client => self.connect_by_client(devices, player, location, other),
            Role::Server => self.connect_by_server(devices, player, location, other),
        };

        if outcome.is_accepted() {
            if let Some(device) = devices.device_mut(location) {
                device.mark_dirty();
            }
            self.update_all(devices);
        } else {
            tracing::debug!(%player, ?role, ?other, "connection request rejected");
        }
        outcome
    }

    fn connect_by_client(
        &mut self,
        devices: &mut impl DeviceDirectory,
        player: Identifier,
        location: &DeviceLocation,
        other: Option<Identifier>,
    ) -> RequestOutcome {
        if self.active_connection_id(player).is_some() || self.resuming_clients.contains_key(&player) {
            return RequestOutcome::Rejected;
        }

        match self.associated_partner(player, Role::Client) {
            Some(partner) if other.is_none_or(|o| o == partner) => {
                if self.resuming_servers.contains_key(&partner) {
                    self.connect_to(devices, player, location, Role::Client, partner, Queue::ResumingServers)
                } else if self.open_servers.contains_key(&partner) {
                    self.connect_to(devices, player, location, Role::Client, partner, Queue::OpenServers)
                } else {
                    self.wait(devices, player, location, Queue::ResumingClients)
                }
            },
            _ => match other {
                Some(other) if self.open_servers.contains_key(&other) => {
                    self.connect_to(devices, player, location, Role::Client, other, Queue::OpenServers)
                },
                _ => RequestOutcome::Rejected,
            },
        }
    }

    fn connect_by_server(
        &mut self,
        devices: &mut impl DeviceDirectory,
        player: Identifier,
        location: &DeviceLocation,
        other: Option<Identifier>,
    ) -> RequestOutcome {
        if self.open_servers.contains_key(&player) || self.resuming_servers.contains_key(&player) {
            return RequestOutcome::Rejected;
        }
        let partner = self.associated_partner(player, Role::Server);

        match other {
            None => match partner.filter(|p| self.resuming_clients.contains_key(p)) {
                Some(partner) => {
                    self.connect_to(devices, player, location, Role::Server, partner, Queue::ResumingClients)
                },
                None => self.wait(devices, player, location, Queue::OpenServers),
            },
            Some(other) if Some(other) == partner => {
                if self.resuming_clients.contains_key(&other) {
                    self.connect_to(devices, player, location, Role::Server, other, Queue::ResumingClients)
                } else {
                    self.wait(devices, player, location, Queue::ResumingServers)
                }
            },
            Some(_) => RequestOutcome::Rejected,
        }
    }

    fn wait(
        &mut self,
        devices: &mut impl DeviceDirectory,
        player: Identifier,
        location: &DeviceLocation,
        queue: Queue,
    ) -> RequestOutcome {
        write_device(devices, location, player, |d| d.set_waiting(queue.role(), true));
        self.queue_mut(queue).insert(player, location.clone());
        tracing::debug!(%player, %location, ?queue, "device waiting");
        RequestOutcome::Waiting(queue)
    }

    /// Link `player`'s device with the device `other` is waiting on in
    /// `queue`.
    fn connect_to(
        &mut self,
        devices: &mut impl DeviceDirectory,
        player: Identifier,
        location: &DeviceLocation,
        role: Role,
        other: Identifier,
        queue: Queue,
    ) -> RequestOutcome {
        let Some(other_location) = self.queue(queue).get(&other).cloned() else {
            return RequestOutcome::CounterpartGone;
        };
        if devices.device(&other_location).is_none() {
            tracing::warn!(%other, location = %other_location, ?queue, "waiting device vanished");
            self.queue_mut(queue).remove(&other);
            return RequestOutcome::CounterpartGone;
        }

        let (client, server) = match role {
            Role::Client => (player, other),
            Role::Server => (other, player),
        };
        let (client_device, server_device) = match role {
            Role::Client => (location.clone(), other_location.clone()),
            Role::Server => (other_location.clone(), location.clone()),
        };

        let (mut id, fresh) = match self.connection_id(client, server) {
            Some(id) => (id, false),
            None if role == Role::Client => {
                let id = self.allocate_connection();
                self.connections.insert(id, Connection::new(id, client, server));
                (id, true)
            },
            // Servers only ever resume.
            None => return RequestOutcome::Rejected,
        };
        self.queue_mut(queue).remove(&other);
        if let Some(connection) = self.connections.get_mut(&id) {
            connection.activate(client_device.clone(), server_device.clone());
        }

        let join = self.roster.join_type(client, Some(server), &self.connections);
        let mut kind = if fresh { ConnectionKind::Regular } else { ConnectionKind::Resume };
        let mut reload_lands = false;

        if fresh {
            let main = self.main_connection_id(client, Role::Client);
            let reusable = main
                .filter(|m| self.connections.get(m).is_some_and(|c| !c.has_server()))
                .filter(|_| self.main_connection_id(server, Role::Server).is_none());

            if let Some(main_id) = reusable {
                self.connections.remove(&id);
                if let Some(main) = self.connections.get_mut(&main_id) {
                    main.attach_server(server);
                    main.activate(client_device.clone(), server_device.clone());
                }
                if let Err(rejection) = self.roster.rejoin(main_id, &self.connections) {
                    if let Some(main) = self.connections.get_mut(&main_id) {
                        main.detach_server();
                        main.deactivate();
                    }
                    return self.deny(
                        devices,
                        (client, &client_device),
                        server,
                        Claimed { player: other, location: other_location, queue },
                        rejection,
                    );
                }
                id = main_id;
                kind = ConnectionKind::Resume;
                reload_lands = true;
            } else {
                if let Err(rejection) = self.admit(id) {
                    self.connections.remove(&id);
                    return self.deny(
                        devices,
                        (client, &client_device),
                        server,
                        Claimed { player: other, location: other_location, queue },
                        rejection,
                    );
                }
                if let Some(main) = main.and_then(|m| self.connections.get(&m)).cloned() {
                    if let Some(connection) = self.connections.get_mut(&id) {
                        connection.copy_from(&main);
                    }
                    kind = ConnectionKind::Secondary;
                }
            }
        }

        write_device(devices, location, player, |d| d.connected(role, other));
        write_device(devices, &other_location, other, |d| d.connected(role.opposite(), player));

        let session = self.roster.session_of_connection(id);
        tracing::info!(%client, %server, ?kind, ?join, "connection created");
        self.events.push(PairingEvent::ConnectionCreated { client, server, session, kind, join });
        if reload_lands {
            self.events.push(PairingEvent::LandChainsChanged);
        }
        RequestOutcome::Connected { kind, join }
    }

    /// Roll back a refused link: the counterpart waits again and the client
    /// device shows the reason.
    fn deny(
        &mut self,
        devices: &mut impl DeviceDirectory,
        (client, client_device): (Identifier, &DeviceLocation),
        server: Identifier,
        claimed: Claimed,
        rejection: MergeRejection,
    ) -> RequestOutcome {
        tracing::warn!(%client, %server, reason = %rejection, "session merge denied connection");
        self.queue_mut(claimed.queue).insert(claimed.player, claimed.location);
        write_device(devices, client_device, client, |d| {
            d.post(Role::Client, StatusMessage::Rejected(rejection));
        });
        RequestOutcome::Denied(rejection)
    }

    /// Close a link or cancel a wait.
    ///
    /// Without `other`, cancels `player`'s own waiting entry for `role`.
    /// With `other`, closes the connection between the two, or cancels a
    /// pending resume towards the main partner.
    pub fn close_connection(
        &mut self,
        devices: &mut impl DeviceDirectory,
        player: Identifier,
        other: Option<Identifier>,
        role: Role,
    ) {
        let proceed = match other {
            None => self.cancel_waiting(devices, player, role),
            Some(other) => self.close_with(devices, player, other, role),
        };
        if proceed {
            self.update_all(devices);
        }
    }

    /// Returns `false` if the device is mid-relocation and nothing happened.
    fn cancel_waiting(&mut self, devices: &mut impl DeviceDirectory, player: Identifier, role: Role) -> bool {
        let candidates: &[Queue] = match role {
            Role::Client => &[Queue::ResumingClients],
            Role::Server => &[Queue::OpenServers, Queue::ResumingServers],
        };
        let Some(queue) = candidates.iter().copied().find(|q| self.is_waiting(player, *q)) else {
            tracing::warn!(%player, ?role, "cancel request but nothing is waiting");
            return true;
        };
        self.cancel_entry(devices, player, queue)
    }

    fn cancel_entry(&mut self, devices: &mut impl DeviceDirectory, player: Identifier, queue: Queue) -> bool {
        if self.queue(queue).get(&player).is_some_and(|l| self.moving.contains(l)) {
            return false;
        }
        let Some(location) = self.queue_mut(queue).remove(&player) else {
            return true;
        };

        let message = match queue {
            Queue::OpenServers => StatusMessage::ClosedServer,
            Queue::ResumingClients | Queue::ResumingServers => StatusMessage::StopResume,
        };
        write_device(devices, &location, player, |d| {
            d.set_waiting(queue.role(), false);
            d.post(queue.role(), message);
        });
        tracing::debug!(%player, ?queue, "waiting entry cancelled");
        true
    }

    fn close_with(
        &mut self,
        devices: &mut impl DeviceDirectory,
        player: Identifier,
        other: Identifier,
        role: Role,
    ) -> bool {
        let (client, server) = match role {
            Role::Client => (player, other),
            Role::Server => (other, player),
        };
        let Some(connection) = self.connection(client, server) else {
            return true;
        };

        if connection.is_active() {
            let own = match role {
                Role::Client => connection.client_device(),
                Role::Server => connection.server_device(),
            };
            if own.is_some_and(|l| self.moving.contains(l)) {
                return false;
            }
            let id = connection.id();
            self.tear_down(devices, id, StatusMessage::Closed);
            true
        } else if self.associated_partner(player, role) == Some(other) {
            let queue = match role {
                Role::Client => Queue::ResumingClients,
                Role::Server => Queue::ResumingServers,
            };
            self.cancel_entry(devices, player, queue)
        } else {
            true
        }
    }

    /// Deactivate a connection, destroying it unless it is main, notify both
    /// devices and publish the close.
    pub(super) fn tear_down(
        &mut self,
        devices: &mut impl DeviceDirectory,
        id: ConnectionId,
        message: StatusMessage,
    ) {
        let Some(connection) = self.connections.get_mut(&id) else {
            return;
        };
        let client = connection.client();
        let server = connection.server();
        let main = connection.is_main();
        let client_device = connection.client_device().cloned();
        let server_device = connection.server_device().cloned();

        if main {
            connection.deactivate();
        } else {
            self.connections.remove(&id);
            self.roster.release(id, &self.connections);
        }

        if let Some(location) = &client_device {
            write_device(devices, location, client, |d| d.disconnected(Role::Client, message));
        }
        if let (Some(location), Some(server)) = (&server_device, server) {
            write_device(devices, location, server, |d| d.disconnected(Role::Server, message));
        }

        let kind = if !main && self.main_connection_id(client, Role::Client).is_some() {
            ConnectionKind::Secondary
        } else {
            ConnectionKind::Regular
        };
        let session = self.roster.session_of(client, &self.connections);
        tracing::info!(%client, ?server, ?kind, "connection closed");
        self.events.push(PairingEvent::ConnectionClosed { client, server, session, kind });
    }

    /// Record that the device at `old` now lives at `new`.
    ///
    /// Every active connection and waiting entry referencing `old` follows
    /// the device, and `new` is shielded from the consistency pass until
    /// [`clear_moving_list`](Self::clear_moving_list).
    ///
    /// # Errors
    ///
    /// [`PairingError::OwnerMismatch`] if the two devices have different
    /// owners. Nothing is changed in that case.
    pub fn moving_device(
        &mut self,
        old: &DeviceLocation,
        old_owner: Identifier,
        new: &DeviceLocation,
        new_owner: Identifier,
    ) -> Result<(), PairingError> {
        if old_owner != new_owner {
            return Err(PairingError::OwnerMismatch { old: old_owner, new: new_owner });
        }

        for connection in self.connections.values_mut().filter(|c| c.is_active()) {
            connection.relocate(old, new);
        }
        for queue in Queue::ALL {
            if let Some(location) = self.queue_mut(queue).get_mut(&old_owner) {
                if *location == *old {
                    *location = new.clone();
                }
            }
        }

        tracing::debug!(owner = %old_owner, from = %old, to = %new, "device moving");
        self.moving.insert(new.clone());
        Ok(())
    }

    /// Forget this tick's relocations.
    pub fn clear_moving_list(&mut self) {
        self.moving.clear();
    }
}
