//! Consistency pass.
//!
//! Reconciles waiting maps and active connections with the device world.
//! Every repair is logged. Stale entries are collected during a read-only
//! scan and removed afterwards, so running the pass twice is the same as
//! running it once.

use super::{Coordinator, Queue};
use crate::{
    connection::Connection,
    device::{DeviceDirectory, DeviceLocation, Role, StatusMessage},
    identifier::Identifier,
};

impl Coordinator {
    /// Repair state that no longer matches the device world.
    ///
    /// No-op when `consistency_check` is disabled. Locations relocated this
    /// tick are skipped.
    pub fn check_data(&mut self, devices: &mut impl DeviceDirectory) {
        if !self.config.consistency_check {
            return;
        }

        for queue in Queue::ALL {
            let stale: Vec<Identifier> = self
                .queue(queue)
                .iter()
                .filter(|(player, location)| {
                    !self.moving.contains(*location)
                        && !self.waiting_entry_valid(&*devices, queue, **player, location)
                })
                .map(|(player, _)| *player)
                .collect();

            for player in stale {
                tracing::warn!(%player, ?queue, "invalid device in waiting map, removing");
                self.queue_mut(queue).remove(&player);
            }
        }

        let broken: Vec<_> = self
            .connections
            .values()
            .filter(|c| c.is_active() && !self.connection_valid(&*devices, c))
            .map(Connection::id)
            .collect();

        for id in broken {
            if let Some(connection) = self.connections.get(&id) {
                tracing::warn!(
                    client = %connection.client(),
                    server = ?connection.server(),
                    "invalid device in connection, closing"
                );
            }
            self.tear_down(devices, id, StatusMessage::Closed);
        }
    }

    fn device_ok(
        &self,
        devices: &impl DeviceDirectory,
        location: &DeviceLocation,
        owner: Identifier,
    ) -> bool {
        !self.config.is_excluded(&location.region)
            && devices.device(location).is_some_and(|d| d.owner() == owner)
    }

    fn waiting_entry_valid(
        &self,
        devices: &impl DeviceDirectory,
        queue: Queue,
        player: Identifier,
        location: &DeviceLocation,
    ) -> bool {
        self.device_ok(devices, location, player)
            && devices.device(location).is_some_and(|d| d.slot(queue.role()).waiting)
    }

    fn connection_valid(&self, devices: &impl DeviceDirectory, connection: &Connection) -> bool {
        let (Some(client_device), Some(server_device), Some(server)) =
            (connection.client_device(), connection.server_device(), connection.server())
        else {
            return false;
        };
        if self.moving.contains(client_device) || self.moving.contains(server_device) {
            return true;
        }

        self.device_ok(devices, client_device, connection.client())
            && self.device_ok(devices, server_device, server)
            && devices
                .device(client_device)
                .is_some_and(|d| d.slot(Role::Client).connected_to == Some(server))
    }
}
