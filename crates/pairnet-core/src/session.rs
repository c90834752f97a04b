//! Session merge engine.
//!
//! Sessions group connections (and through them, players) that share a
//! narrative and a capacity budget. The [`Roster`] owns every session and
//! decides, through the pure [`can_merge`] / [`check_members`] rules, whether
//! a connection may join a session and whether two sessions may be merged.
//!
//! ## Modes
//!
//! - [`SessionMode::Global`]: every connection lives in one shared session.
//! - [`SessionMode::Independent`]: sessions form around connected groups of
//!   players and merge when a connection links two of them.
//!
//! The roster can switch modes live without losing membership: going global
//! merges everything, going independent splits the global session into its
//! connected components.
//!
//! Rules never fail with an error; they return a [`MergeRejection`] the
//! coordinator surfaces to the player.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    iter,
};

use serde::{Deserialize, Serialize};

use crate::{
    connection::{Connection, ConnectionId, ConnectionTable, SessionJoin},
    identifier::Identifier,
};

/// Session handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(u64);

impl SessionId {
    /// Wrap a raw handle.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw handle value.
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session#{}", self.0)
    }
}

/// Session operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionMode {
    /// One session for the whole world.
    Global,
    /// Many independent sessions.
    Independent,
}

/// Why a connection may not join, or two sessions may not merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MergeRejection {
    /// A locked session only accepts connections between its own members.
    #[error("session is locked")]
    Locked,

    /// The single global session has reached its player limit.
    #[error("the global session is full")]
    GlobalSessionFull,

    /// The resulting session would exceed the player limit.
    #[error("session would have {players} players, limit is {limit}")]
    SessionFull {
        /// Players the resulting session would have.
        players: usize,
        /// Configured limit.
        limit: usize,
    },

    /// A player would be the client of two main connections.
    #[error("{0} would be the client of two main connections")]
    DuplicateClient(Identifier),

    /// A player would be the server of two main connections.
    #[error("{0} would be the server of two main connections")]
    DuplicateServer(Identifier),
}

impl MergeRejection {
    /// Translation key for the device status line.
    pub const fn translation_key(self) -> &'static str {
        match self {
            Self::Locked => "pairnet.merge.locked",
            Self::GlobalSessionFull => "pairnet.merge.global_session_full",
            Self::SessionFull { .. } => "pairnet.merge.session_full",
            Self::DuplicateClient(_) => "pairnet.merge.duplicate_client",
            Self::DuplicateServer(_) => "pairnet.merge.duplicate_server",
        }
    }
}

/// Outcome of a merge decision.
pub type MergeResult = Result<(), MergeRejection>;

/// A group of connections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    id: SessionId,
    name: Option<String>,
    locked: bool,
    connections: BTreeSet<ConnectionId>,
}

impl Session {
    /// Handle.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Optional display name.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Whether the session refuses new players.
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Member connection handles.
    pub fn connections(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.connections.iter().copied()
    }

    /// Whether `connection` belongs to this session.
    pub fn contains(&self, connection: ConnectionId) -> bool {
        self.connections.contains(&connection)
    }

    /// Number of member connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether the session has no connections.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Member connections resolved through `table`.
    pub fn members<'a>(&'a self, table: &'a ConnectionTable) -> impl Iterator<Item = &'a Connection> {
        self.connections.iter().filter_map(|id| table.get(id))
    }

    /// Players on either side of any member connection.
    pub fn players(&self, table: &ConnectionTable) -> BTreeSet<Identifier> {
        self.members(table).flat_map(endpoints).collect()
    }
}

fn endpoints(connection: &Connection) -> impl Iterator<Item = Identifier> {
    iter::once(connection.client()).chain(connection.server())
}

/// Check that a set of connections fits in one session.
///
/// Fails if the player count exceeds `limit`, or if two main connections
/// share a client or share a server.
pub fn check_members<'a>(
    members: impl IntoIterator<Item = &'a Connection>,
    limit: usize,
) -> MergeResult {
    let mut players = BTreeSet::new();
    let mut clients = BTreeSet::new();
    let mut servers = BTreeSet::new();

    for connection in members {
        players.extend(endpoints(connection));
        if !connection.is_main() {
            continue;
        }
        if !clients.insert(connection.client()) {
            return Err(MergeRejection::DuplicateClient(connection.client()));
        }
        if let Some(server) = connection.server() {
            if !servers.insert(server) {
                return Err(MergeRejection::DuplicateServer(server));
            }
        }
    }

    if players.len() > limit {
        return Err(MergeRejection::SessionFull { players: players.len(), limit });
    }
    Ok(())
}

/// Decide whether two sessions may be merged into one.
pub fn can_merge(a: &Session, b: &Session, table: &ConnectionTable, limit: usize) -> MergeResult {
    if a.id == b.id {
        return Ok(());
    }
    if a.locked || b.locked {
        return Err(MergeRejection::Locked);
    }
    check_members(a.members(table).chain(b.members(table)), limit)
}

/// Every session, plus the mode they are operated in.
#[derive(Debug, Clone)]
pub struct Roster {
    sessions: BTreeMap<SessionId, Session>,
    mode: SessionMode,
    limit: usize,
    next_id: u64,
}

impl Roster {
    /// Create an empty roster.
    pub fn new(mode: SessionMode, limit: usize) -> Self {
        Self { sessions: BTreeMap::new(), mode, limit, next_id: 0 }
    }

    /// Current mode.
    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    /// Player limit per session.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Number of sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether there are no sessions.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Look up a session.
    pub fn session(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    /// All sessions in handle order.
    pub fn sessions(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    /// Lock or unlock a session. Returns `false` if it does not exist.
    pub fn set_locked(&mut self, id: SessionId, locked: bool) -> bool {
        self.sessions.get_mut(&id).map(|s| s.locked = locked).is_some()
    }

    /// Session containing a connection involving `player`.
    pub fn session_of(&self, player: Identifier, table: &ConnectionTable) -> Option<SessionId> {
        self.sessions
            .values()
            .find(|s| s.members(table).any(|c| c.involves(player)))
            .map(Session::id)
    }

    /// Session containing `connection`.
    pub fn session_of_connection(&self, connection: ConnectionId) -> Option<SessionId> {
        self.sessions.values().find(|s| s.contains(connection)).map(Session::id)
    }

    /// Classify a prospective connection against current sessions.
    pub fn join_type(
        &self,
        client: Identifier,
        server: Option<Identifier>,
        table: &ConnectionTable,
    ) -> SessionJoin {
        let a = self.session_of(client, table);
        let b = server.and_then(|s| self.session_of(s, table));
        match (a, b) {
            (Some(a), Some(b)) if a == b => SessionJoin::Internal,
            (Some(_), Some(_)) => SessionJoin::Merge,
            _ => SessionJoin::Fresh,
        }
    }

    /// Admit a new connection into a session.
    ///
    /// Existing sessions of either endpoint are preferred over creating a
    /// new one; two different sessions get merged into the client's. On
    /// rejection the roster is unchanged.
    pub fn admit(&mut self, connection: &Connection, table: &ConnectionTable) -> MergeResult {
        match self.mode {
            SessionMode::Global => {
                let id = self.global_session();
                self.join(id, connection, table).map_err(globalize)
            },
            SessionMode::Independent => {
                let client_session = self.session_of(connection.client(), table);
                let server_session = connection.server().and_then(|s| self.session_of(s, table));

                match (client_session, server_session) {
                    (None, None) => {
                        check_members(iter::once(connection), self.limit)?;
                        self.create(None, false, BTreeSet::from([connection.id()]));
                        Ok(())
                    },
                    (Some(id), None) | (None, Some(id)) => self.join(id, connection, table),
                    (Some(a), Some(b)) if a == b => self.join(a, connection, table),
                    (Some(a), Some(b)) => {
                        let (Some(sa), Some(sb)) = (self.sessions.get(&a), self.sessions.get(&b))
                        else {
                            return Ok(());
                        };
                        if sa.locked || sb.locked {
                            return Err(MergeRejection::Locked);
                        }
                        check_members(
                            sa.members(table).chain(sb.members(table)).chain(iter::once(connection)),
                            self.limit,
                        )?;
                        self.absorb(a, b);
                        self.insert(a, connection.id());
                        Ok(())
                    },
                }
            },
        }
    }

    /// Re-validate a member connection whose server player was just attached.
    ///
    /// Merges the server player's session into the connection's session when
    /// they differ. On rejection the roster is unchanged; the caller is
    /// expected to detach the server again.
    pub fn rejoin(&mut self, id: ConnectionId, table: &ConnectionTable) -> MergeResult {
        let Some(connection) = table.get(&id) else {
            return Ok(());
        };
        let Some(home) = self.session_of_connection(id) else {
            return self.admit(connection, table);
        };
        let Some(server) = connection.server() else {
            return Ok(());
        };
        let Some(home_session) = self.sessions.get(&home) else {
            return Ok(());
        };

        match self.mode {
            SessionMode::Global => check_members(home_session.members(table), self.limit).map_err(globalize),
            SessionMode::Independent => {
                let other = self
                    .sessions
                    .values()
                    .find(|s| s.id != home && s.members(table).any(|c| c.involves(server)));

                match other {
                    Some(other) => {
                        can_merge(home_session, other, table, self.limit)?;
                        let other = other.id;
                        self.absorb(home, other);
                        Ok(())
                    },
                    None => {
                        let already_member = home_session
                            .members(table)
                            .any(|c| c.id() != id && c.involves(server));
                        if home_session.locked && !already_member {
                            return Err(MergeRejection::Locked);
                        }
                        check_members(home_session.members(table), self.limit)
                    },
                }
            },
        }
    }

    /// Remove a destroyed connection from its session.
    ///
    /// Emptied sessions are dropped. In independent mode the remainder is
    /// split into connected components.
    pub fn release(&mut self, id: ConnectionId, table: &ConnectionTable) {
        let Some(home) = self.session_of_connection(id) else {
            return;
        };
        let Some(session) = self.sessions.get_mut(&home) else {
            return;
        };
        session.connections.remove(&id);

        if session.is_empty() {
            self.sessions.remove(&home);
            return;
        }
        if self.mode == SessionMode::Independent {
            self.split(home, table);
        }
    }

    /// Switch to independent mode, splitting every session into its
    /// connected components.
    pub fn split_global_session(&mut self, table: &ConnectionTable) {
        if self.mode == SessionMode::Independent {
            return;
        }
        self.mode = SessionMode::Independent;
        let ids: Vec<_> = self.sessions.keys().copied().collect();
        for id in ids {
            self.split(id, table);
        }
        tracing::info!(sessions = self.sessions.len(), "split global session");
    }

    /// Switch to global mode, merging every session into one regardless of
    /// limits or locks.
    pub fn merge_all(&mut self) {
        self.mode = SessionMode::Global;
        let mut ids = self.sessions.keys().copied();
        let Some(first) = ids.next() else {
            return;
        };
        let rest: Vec<_> = ids.collect();
        if rest.is_empty() {
            return;
        }
        for id in rest {
            self.absorb(first, id);
        }
        tracing::warn!(session = %first, "merged all sessions into one");
    }

    /// Switch modes live.
    pub fn set_mode(&mut self, mode: SessionMode, table: &ConnectionTable) {
        match mode {
            SessionMode::Global => self.merge_all(),
            SessionMode::Independent => self.split_global_session(table),
        }
    }

    /// Recreate a session from persisted state.
    pub fn restore(
        &mut self,
        name: Option<String>,
        locked: bool,
        connections: BTreeSet<ConnectionId>,
    ) -> SessionId {
        self.create(name, locked, connections)
    }

    fn create(
        &mut self,
        name: Option<String>,
        locked: bool,
        connections: BTreeSet<ConnectionId>,
    ) -> SessionId {
        self.next_id += 1;
        let id = SessionId(self.next_id);
        self.sessions.insert(id, Session { id, name, locked, connections });
        id
    }

    fn global_session(&mut self) -> SessionId {
        match self.sessions.keys().next() {
            Some(&id) => id,
            None => self.create(None, false, BTreeSet::new()),
        }
    }

    fn insert(&mut self, id: SessionId, connection: ConnectionId) {
        if let Some(session) = self.sessions.get_mut(&id) {
            session.connections.insert(connection);
        }
    }

    fn join(&mut self, id: SessionId, connection: &Connection, table: &ConnectionTable) -> MergeResult {
        let Some(session) = self.sessions.get(&id) else {
            return Ok(());
        };
        if session.locked {
            let players = session.players(table);
            let known = endpoints(connection).all(|p| players.contains(&p));
            if !known {
                return Err(MergeRejection::Locked);
            }
        }
        check_members(session.members(table).chain(iter::once(connection)), self.limit)?;
        self.insert(id, connection.id());
        Ok(())
    }

    /// Move every connection of `from` into `into` and drop `from`.
    fn absorb(&mut self, into: SessionId, from: SessionId) {
        if into == from {
            return;
        }
        let Some(absorbed) = self.sessions.remove(&from) else {
            return;
        };
        if let Some(session) = self.sessions.get_mut(&into) {
            session.connections.extend(absorbed.connections);
            if session.name.is_none() {
                session.name = absorbed.name;
            }
        }
    }

    /// Split one session into connected components of players.
    ///
    /// The largest component keeps the session's handle, name and lock.
    fn split(&mut self, id: SessionId, table: &ConnectionTable) {
        let Some(session) = self.sessions.remove(&id) else {
            return;
        };

        let mut remaining: Vec<&Connection> = session.members(table).collect();
        let mut groups: Vec<BTreeSet<ConnectionId>> = Vec::new();

        while let Some(seed) = remaining.pop() {
            let mut players: BTreeSet<Identifier> = endpoints(seed).collect();
            let mut group = BTreeSet::from([seed.id()]);

            loop {
                let (joined, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut remaining)
                    .into_iter()
                    .partition(|c| endpoints(c).any(|p| players.contains(&p)));
                remaining = rest;
                if joined.is_empty() {
                    break;
                }
                for connection in joined {
                    players.extend(endpoints(connection));
                    group.insert(connection.id());
                }
            }
            groups.push(group);
        }

        groups.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.first().cmp(&b.first())));
        let mut groups = groups.into_iter();

        let Some(largest) = groups.next() else {
            return;
        };
        self.sessions.insert(id, Session { connections: largest, ..session });

        let mut split_off = 0;
        for group in groups {
            self.create(None, false, group);
            split_off += 1;
        }
        if split_off > 0 {
            tracing::debug!(session = %id, split_off, "split session");
        }
    }
}

fn globalize(rejection: MergeRejection) -> MergeRejection {
    match rejection {
        MergeRejection::SessionFull { .. } => MergeRejection::GlobalSessionFull,
        other => other,
    }
}
