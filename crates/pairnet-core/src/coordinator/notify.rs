//! Notification fan-out.
//!
//! Device writes only reach devices that still resolve and are still owned by
//! the player the coordinator expects; anything else is left for the
//! consistency pass to clean up.

use super::Coordinator;
use crate::{
    connection::Connection,
    device::{Device, DeviceDirectory, DeviceLocation},
    event::{ConnectionSummary, NetworkSnapshot, PairingEvent},
    identifier::Identifier,
};

/// Apply `write` to the device at `location` if `owner` still owns it.
pub(super) fn write_device(
    devices: &mut impl DeviceDirectory,
    location: &DeviceLocation,
    owner: Identifier,
    write: impl FnOnce(&mut Device),
) -> bool {
    match devices.device_mut(location) {
        Some(device) if device.owner() == owner => {
            write(device);
            true
        },
        _ => false,
    }
}

impl Coordinator {
    /// Run the consistency pass, then broadcast the network if it changed.
    pub fn update_all(&mut self, devices: &mut impl DeviceDirectory) {
        self.check_data(devices);
        self.broadcast();
    }

    /// Player-visible view of the network.
    pub fn snapshot(&self) -> NetworkSnapshot {
        NetworkSnapshot {
            open_servers: self.open_servers.keys().copied().collect(),
            resuming_clients: self.resuming_clients.keys().copied().collect(),
            resuming_servers: self.resuming_servers.keys().copied().collect(),
            connections: self.connections.values().map(|c| self.summarize(c)).collect(),
        }
    }

    fn summarize(&self, connection: &Connection) -> ConnectionSummary {
        ConnectionSummary {
            client: connection.client(),
            server: connection.server(),
            active: connection.is_active(),
            main: connection.is_main(),
            session: self.roster.session_of_connection(connection.id()),
            dimension: connection.land().map(|l| l.dimension.clone()),
        }
    }

    /// Publish the network snapshot unless it equals the last one sent.
    pub(super) fn broadcast(&mut self) {
        let snapshot = self.snapshot();
        if self.last_snapshot.as_ref() == Some(&snapshot) {
            return;
        }
        self.last_snapshot = Some(snapshot.clone());
        self.events.push(PairingEvent::NetworkChanged(snapshot));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::CoordinatorConfig,
        device::{MemoryDirectory, RegionId, Role},
    };

    fn location() -> DeviceLocation {
        DeviceLocation::new(RegionId::new("overworld"), 0, 64, 0)
    }

    #[test]
    fn write_device_checks_owner() {
        let mut devices = MemoryDirectory::new();
        devices.place(location(), Device::new(Identifier::from_raw(1)));

        let wrong = write_device(&mut devices, &location(), Identifier::from_raw(2), |d| {
            d.set_waiting(Role::Server, true);
        });
        let right = write_device(&mut devices, &location(), Identifier::from_raw(1), |d| {
            d.set_waiting(Role::Client, true);
        });

        assert!(!wrong);
        assert!(right);
        let device = devices.device(&location());
        assert!(device.is_some_and(|d| d.slot(Role::Client).waiting && !d.slot(Role::Server).waiting));
    }

    #[test]
    fn broadcast_skips_unchanged_network() {
        let mut coordinator = Coordinator::new(CoordinatorConfig::default());
        let mut devices = MemoryDirectory::new();

        coordinator.update_all(&mut devices);
        coordinator.update_all(&mut devices);

        let changes = coordinator
            .drain_events()
            .into_iter()
            .filter(|e| matches!(e, PairingEvent::NetworkChanged(_)))
            .count();
        assert_eq!(changes, 1);
    }
}
