//! Invariant oracles.
//!
//! Every oracle reads only public coordinator state, so a failure points at
//! the coordinator and not at the harness.

use std::collections::{BTreeMap, BTreeSet};

use pairnet_core::{ConnectionId, Coordinator, Identifier, Queue, SessionMode};

/// A broken coordinator invariant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// Player is the client of more than one main connection.
    DuplicateMainClient(Identifier),
    /// Player is the server of more than one main connection.
    DuplicateMainServer(Identifier),
    /// Player waits in both server queues.
    ServerQueuesOverlap(Identifier),
    /// Two connections link the same client/server pair.
    DuplicatePair {
        /// Client player.
        client: Identifier,
        /// Server player.
        server: Identifier,
    },
    /// Connection belongs to no session.
    Unassigned(ConnectionId),
    /// Connection belongs to several sessions.
    SharedConnection(ConnectionId),
    /// Session lists a connection missing from the table.
    Dangling(ConnectionId),
    /// Independent mode put a player into several sessions.
    PlayerInTwoSessions(Identifier),
    /// Global mode holds more than one session.
    SplitGlobalSession(usize),
}

/// Check every structural invariant of the pairing network.
///
/// # Errors
///
/// The first [`Violation`] found.
pub fn check_invariants(coordinator: &Coordinator) -> Result<(), Violation> {
    check_mains(coordinator)?;
    check_queues(coordinator)?;
    check_pairs(coordinator)?;
    check_sessions(coordinator)
}

fn check_mains(coordinator: &Coordinator) -> Result<(), Violation> {
    let mut clients = BTreeSet::new();
    let mut servers = BTreeSet::new();
    for connection in coordinator.connections().filter(|c| c.is_main()) {
        if !clients.insert(connection.client()) {
            return Err(Violation::DuplicateMainClient(connection.client()));
        }
        if let Some(server) = connection.server() {
            if !servers.insert(server) {
                return Err(Violation::DuplicateMainServer(server));
            }
        }
    }
    Ok(())
}

fn check_queues(coordinator: &Coordinator) -> Result<(), Violation> {
    let open = coordinator.queue(Queue::OpenServers);
    match coordinator.queue(Queue::ResumingServers).keys().find(|p| open.contains_key(p)) {
        Some(player) => Err(Violation::ServerQueuesOverlap(*player)),
        None => Ok(()),
    }
}

fn check_pairs(coordinator: &Coordinator) -> Result<(), Violation> {
    let mut pairs = BTreeSet::new();
    for connection in coordinator.connections() {
        let Some(server) = connection.server() else { continue };
        if !pairs.insert((connection.client(), server)) {
            return Err(Violation::DuplicatePair { client: connection.client(), server });
        }
    }
    Ok(())
}

fn check_sessions(coordinator: &Coordinator) -> Result<(), Violation> {
    let roster = coordinator.roster();
    if roster.mode() == SessionMode::Global && roster.len() > 1 {
        return Err(Violation::SplitGlobalSession(roster.len()));
    }

    let table: BTreeSet<ConnectionId> = coordinator.connections().map(|c| c.id()).collect();
    let mut owners: BTreeMap<ConnectionId, usize> = BTreeMap::new();
    let mut player_sessions: BTreeMap<Identifier, usize> = BTreeMap::new();

    for session in roster.sessions() {
        for id in session.connections() {
            if !table.contains(&id) {
                return Err(Violation::Dangling(id));
            }
            *owners.entry(id).or_default() += 1;
        }
        let players: BTreeSet<Identifier> = coordinator
            .session_connections(session)
            .flat_map(|c| std::iter::once(c.client()).chain(c.server()))
            .collect();
        for player in players {
            *player_sessions.entry(player).or_default() += 1;
        }
    }

    for id in table {
        match owners.get(&id).copied().unwrap_or(0) {
            0 => return Err(Violation::Unassigned(id)),
            1 => {},
            _ => return Err(Violation::SharedConnection(id)),
        }
    }

    if roster.mode() == SessionMode::Independent {
        if let Some((player, _)) = player_sessions.into_iter().find(|(_, n)| *n > 1) {
            return Err(Violation::PlayerInTwoSessions(player));
        }
    }
    Ok(())
}

/// Session membership, independent of connection and session handles.
///
/// Each non-empty session becomes the set of `(client, server, main)`
/// triples of its connections.
pub fn membership(coordinator: &Coordinator) -> BTreeSet<BTreeSet<(Identifier, Option<Identifier>, bool)>> {
    coordinator
        .roster()
        .sessions()
        .map(|session| {
            coordinator
                .session_connections(session)
                .map(|c| (c.client(), c.server(), c.is_main()))
                .collect::<BTreeSet<_>>()
        })
        .filter(|members| !members.is_empty())
        .collect()
}
