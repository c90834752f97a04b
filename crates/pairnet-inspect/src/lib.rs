//! Offline inspection of persisted pairing records.
//!
//! Loads a record through the same lenient decoder the server uses, restores
//! it into a [`Coordinator`] and summarizes the result. Legacy records are
//! migrated on load, so saving the restored coordinator upgrades the file to
//! the current schema.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::{
    collections::BTreeSet,
    fmt, fs, io,
    path::{Path, PathBuf},
};

use pairnet_core::{Coordinator, CoordinatorConfig, PairingError, Queue, SessionMode, persist};
use thiserror::Error;

/// Errors from loading or saving a record file.
#[derive(Error, Debug)]
pub enum InspectError {
    /// Record file could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Read {
        /// File path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Record file could not be written.
    #[error("failed to write {}: {source}", path.display())]
    Write {
        /// File path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Record could not be decoded or encoded.
    #[error(transparent)]
    Record(#[from] PairingError),
}

/// Load and restore the record at `path`.
pub fn load(path: &Path, config: CoordinatorConfig) -> Result<Coordinator, InspectError> {
    let bytes =
        fs::read(path).map_err(|source| InspectError::Read { path: path.to_path_buf(), source })?;
    let record = persist::decode(&bytes)?;
    Ok(Coordinator::from_record(config, record))
}

/// Write `coordinator` to `path` in the current schema.
pub fn save(coordinator: &Coordinator, path: &Path) -> Result<(), InspectError> {
    let bytes = persist::encode(&coordinator.write())?;
    fs::write(path, bytes).map_err(|source| InspectError::Write { path: path.to_path_buf(), source })
}

/// One session in a [`Report`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    /// Session name, or its handle when unnamed.
    pub label: String,
    /// Session refuses outsiders.
    pub locked: bool,
    /// Display names of every player in the session.
    pub players: BTreeSet<String>,
    /// Member connections.
    pub connections: usize,
    /// Member connections that are main.
    pub main: usize,
}

/// Summary of a restored coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    /// Session mode.
    pub mode: SessionMode,
    /// Known players.
    pub identifiers: usize,
    /// Display names waiting in each queue.
    pub waiting: Vec<(Queue, Vec<String>)>,
    /// Sessions in handle order.
    pub sessions: Vec<SessionReport>,
    /// Connections outside every session.
    pub unassigned: usize,
}

impl Report {
    /// Summarize `coordinator`.
    pub fn new(coordinator: &Coordinator) -> Self {
        let names = coordinator.identifiers();
        let roster = coordinator.roster();

        let waiting = Queue::ALL
            .into_iter()
            .map(|queue| (queue, coordinator.queue(queue).keys().map(|p| names.display(*p)).collect()))
            .collect();

        let sessions = roster
            .sessions()
            .map(|session| {
                let members: Vec<_> = coordinator.session_connections(session).collect();
                SessionReport {
                    label: session.name().map_or_else(|| session.id().to_string(), str::to_string),
                    locked: session.is_locked(),
                    players: members
                        .iter()
                        .flat_map(|c| std::iter::once(c.client()).chain(c.server()))
                        .map(|p| names.display(p))
                        .collect(),
                    connections: members.len(),
                    main: members.iter().filter(|c| c.is_main()).count(),
                }
            })
            .collect();

        let unassigned = coordinator
            .connections()
            .filter(|c| roster.session_of_connection(c.id()).is_none())
            .count();

        Self { mode: roster.mode(), identifiers: names.len(), waiting, sessions, unassigned }
    }
}

fn queue_label(queue: Queue) -> &'static str {
    match queue {
        Queue::OpenServers => "open servers",
        Queue::ResumingClients => "resuming clients",
        Queue::ResumingServers => "resuming servers",
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "mode: {:?}", self.mode)?;
        writeln!(f, "players: {}", self.identifiers)?;
        for (queue, players) in &self.waiting {
            writeln!(f, "{}: [{}]", queue_label(*queue), players.join(", "))?;
        }
        for session in &self.sessions {
            let lock = if session.locked { " (locked)" } else { "" };
            let players: Vec<&str> = session.players.iter().map(String::as_str).collect();
            writeln!(
                f,
                "session {}{lock}: {} connections, {} main, players [{}]",
                session.label,
                session.connections,
                session.main,
                players.join(", ")
            )?;
        }
        if self.unassigned > 0 {
            writeln!(f, "unassigned connections: {}", self.unassigned)?;
        }
        Ok(())
    }
}
