//! Conversion between the live coordinator and its persisted record.

use std::collections::BTreeSet;

use super::{Coordinator, Queue};
use crate::{
    config::CoordinatorConfig,
    connection::{Connection, ConnectionId},
    device::Role,
    identifier::IdentifierRegistry,
    persist::{ConnectionRecord, PairingRecord, RECORD_VERSION, SessionRecord, SessionsRecord, WaitingEntry},
    session::{Roster, SessionMode},
};

fn connection_record(connection: &Connection) -> ConnectionRecord {
    let devices = connection.client_device().zip(connection.server_device());
    ConnectionRecord {
        client: connection.client(),
        server: connection.server(),
        main: connection.is_main(),
        client_device: devices.map(|(c, _)| c.clone()),
        server_device: devices.map(|(_, s)| s.clone()),
        land: connection.land().cloned(),
        has_entered: connection.has_entered(),
        given_items: connection.given_items().map(str::to_string).collect(),
        center: connection.coordinate_override(),
    }
}

impl Coordinator {
    /// Snapshot the coordinator into a record.
    pub fn write(&self) -> PairingRecord {
        let waiting = |queue: Queue| -> Vec<WaitingEntry> {
            self.queue(queue)
                .iter()
                .map(|(identifier, device)| WaitingEntry { identifier: *identifier, device: device.clone() })
                .collect()
        };

        let sessions: Vec<SessionRecord> = self
            .roster
            .sessions()
            .map(|session| SessionRecord {
                name: session.name().map(str::to_string),
                locked: session.is_locked(),
                connections: session.members(&self.connections).map(connection_record).collect(),
            })
            .collect();
        let unassigned = self
            .connections
            .values()
            .filter(|c| self.roster.session_of_connection(c.id()).is_none())
            .map(connection_record)
            .collect();

        PairingRecord {
            version: RECORD_VERSION,
            servers_open: waiting(Queue::OpenServers),
            resuming_clients: waiting(Queue::ResumingClients),
            resuming_servers: waiting(Queue::ResumingServers),
            sessions: SessionsRecord { mode: Some(self.roster.mode()), sessions, unassigned },
            identifiers: self.identifiers.entries().cloned().collect(),
        }
    }

    /// Rebuild a coordinator from a record.
    ///
    /// Connections get fresh handles. Records contradicting earlier ones are
    /// dropped with a warning: a repeated client/server pair, a second main
    /// connection for a client or server, and a player waiting in both server
    /// queues. Several sessions restored in global mode are merged.
    pub fn from_record(config: CoordinatorConfig, record: PairingRecord) -> Self {
        let mode = record.sessions.mode.unwrap_or_else(|| config.initial_mode());
        let roster = Roster::new(mode, config.max_session_players);
        let identifiers = IdentifierRegistry::from_entries(record.identifiers);
        let mut coordinator = Self::with_parts(config, identifiers, roster);

        for session in record.sessions.sessions {
            let members = coordinator.restore_connections(session.connections);
            if !members.is_empty() {
                coordinator.roster.restore(session.name, session.locked, members);
            }
        }
        coordinator.restore_connections(record.sessions.unassigned);
        if mode == SessionMode::Global && coordinator.roster.len() > 1 {
            coordinator.roster.merge_all();
        }

        for (queue, entries) in [
            (Queue::OpenServers, record.servers_open),
            (Queue::ResumingClients, record.resuming_clients),
            (Queue::ResumingServers, record.resuming_servers),
        ] {
            for entry in entries {
                let rival = match queue {
                    Queue::OpenServers => Some(Queue::ResumingServers),
                    Queue::ResumingServers => Some(Queue::OpenServers),
                    Queue::ResumingClients => None,
                };
                if rival.is_some_and(|r| coordinator.is_waiting(entry.identifier, r)) {
                    tracing::warn!(player = %entry.identifier, ?queue, "skipping entry already waiting as a server");
                    continue;
                }
                coordinator.queue_mut(queue).insert(entry.identifier, entry.device);
            }
        }

        tracing::info!(
            connections = coordinator.connections.len(),
            sessions = coordinator.roster.len(),
            "pairing state restored"
        );
        coordinator
    }

    fn restore_connections(&mut self, records: Vec<ConnectionRecord>) -> BTreeSet<ConnectionId> {
        let mut members = BTreeSet::new();
        for record in records {
            let duplicate = self
                .connections
                .values()
                .any(|c| c.client() == record.client && c.server() == record.server);
            if duplicate {
                tracing::warn!(client = %record.client, server = ?record.server, "skipping duplicate connection record");
                continue;
            }
            if record.main {
                let main_client = self.main_connection_id(record.client, Role::Client).is_some();
                let main_server =
                    record.server.is_some_and(|s| self.main_connection_id(s, Role::Server).is_some());
                if main_client || main_server {
                    tracing::warn!(client = %record.client, server = ?record.server, "skipping second main connection record");
                    continue;
                }
            }

            let mut connection = Connection::from_parts(
                record.client,
                record.server,
                record.main,
                record.client_device.zip(record.server_device),
                record.land,
                record.has_entered,
                record.given_items.into_iter().collect(),
                record.center,
            );
            let id = self.allocate_connection();
            connection.set_id(id);
            self.connections.insert(id, connection);
            members.insert(id);
        }
        members
    }
}
