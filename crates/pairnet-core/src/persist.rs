//! Persistence schema and codec.
//!
//! The coordinator is saved as one CBOR document with keys `serversOpen`,
//! `resumingClients`, `resumingServers`, `sessions` and `identifiers`, plus
//! an explicit `version`.
//!
//! ## Decoding
//!
//! Decoding is lenient. Missing keys are empty, list items that fail to
//! decode are skipped with a warning and the rest of the record is kept.
//! Only an unreadable document or a record from a newer version fails.
//!
//! ## Versions
//!
//! - 0: legacy records without a `version` key. Waiting entries use
//!   `player`/`computer` and the session record stores a `singleSession`
//!   flag.
//! - 1: current schema.

use ciborium::Value;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{
    device::DeviceLocation,
    error::PairingError,
    identifier::{Identifier, IdentityEntry},
    land::LandInfo,
    session::SessionMode,
};

/// Current record schema version.
pub const RECORD_VERSION: u32 = 1;

/// A waiting-map entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitingEntry {
    /// Waiting player.
    pub identifier: Identifier,
    /// Device the player waits on.
    pub device: DeviceLocation,
}

/// A persisted connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRecord {
    /// Client player.
    pub client: Identifier,
    /// Server player.
    #[serde(default)]
    pub server: Option<Identifier>,
    /// Canonical connection.
    #[serde(default)]
    pub main: bool,
    /// Client device, present while active.
    #[serde(default)]
    pub client_device: Option<DeviceLocation>,
    /// Server device, present while active.
    #[serde(default)]
    pub server_device: Option<DeviceLocation>,
    /// Assigned land.
    #[serde(default)]
    pub land: Option<LandInfo>,
    /// Client has entered their land.
    #[serde(default)]
    pub has_entered: bool,
    /// Items given through this connection.
    #[serde(default)]
    pub given_items: Vec<String>,
    /// Entry center override.
    #[serde(default)]
    pub center: Option<(i32, i32)>,
}

/// A persisted session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Refuses new players.
    #[serde(default)]
    pub locked: bool,
    /// Member connections.
    #[serde(default)]
    pub connections: Vec<ConnectionRecord>,
}

/// The session roster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionsRecord {
    /// Operating mode, `None` for the configured default.
    #[serde(default)]
    pub mode: Option<SessionMode>,
    /// Every session.
    #[serde(default)]
    pub sessions: Vec<SessionRecord>,
    /// Connections outside any session.
    #[serde(default)]
    pub unassigned: Vec<ConnectionRecord>,
}

/// The whole coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingRecord {
    /// Schema version.
    pub version: u32,
    /// Open servers.
    #[serde(default)]
    pub servers_open: Vec<WaitingEntry>,
    /// Resuming clients.
    #[serde(default)]
    pub resuming_clients: Vec<WaitingEntry>,
    /// Resuming servers.
    #[serde(default)]
    pub resuming_servers: Vec<WaitingEntry>,
    /// Session roster.
    #[serde(default)]
    pub sessions: SessionsRecord,
    /// Issued player identities.
    #[serde(default)]
    pub identifiers: Vec<IdentityEntry>,
}

impl Default for PairingRecord {
    fn default() -> Self {
        Self {
            version: RECORD_VERSION,
            servers_open: Vec::new(),
            resuming_clients: Vec::new(),
            resuming_servers: Vec::new(),
            sessions: SessionsRecord::default(),
            identifiers: Vec::new(),
        }
    }
}

/// Encode a record as CBOR.
///
/// # Errors
///
/// [`PairingError::Encode`] if serialization fails.
pub fn encode(record: &PairingRecord) -> Result<Vec<u8>, PairingError> {
    let mut bytes = Vec::new();
    ciborium::into_writer(record, &mut bytes)
        .map_err(|e| PairingError::Encode { reason: e.to_string() })?;
    Ok(bytes)
}

/// Decode a record, migrating legacy versions.
///
/// # Errors
///
/// - [`PairingError::Decode`] if the bytes are not a CBOR map
/// - [`PairingError::UnsupportedVersion`] if the record is from a newer
///   version
pub fn decode(bytes: &[u8]) -> Result<PairingRecord, PairingError> {
    let value: Value =
        ciborium::from_reader(bytes).map_err(|e| PairingError::Decode { reason: e.to_string() })?;
    let Value::Map(entries) = value else {
        return Err(PairingError::Decode { reason: "record is not a map".to_string() });
    };

    let version = field(&entries, "version")
        .and_then(Value::as_integer)
        .and_then(|v| u32::try_from(v).ok())
        .unwrap_or(0);
    if version > RECORD_VERSION {
        return Err(PairingError::UnsupportedVersion { found: version, supported: RECORD_VERSION });
    }
    let entries = if version == 0 { migrate_v0(entries) } else { entries };

    Ok(PairingRecord {
        version: RECORD_VERSION,
        servers_open: list(&entries, "serversOpen"),
        resuming_clients: list(&entries, "resumingClients"),
        resuming_servers: list(&entries, "resumingServers"),
        sessions: field(&entries, "sessions").map(sessions).unwrap_or_default(),
        identifiers: list(&entries, "identifiers"),
    })
}

fn field<'a>(entries: &'a [(Value, Value)], key: &str) -> Option<&'a Value> {
    entries.iter().find(|(k, _)| k.as_text() == Some(key)).map(|(_, v)| v)
}

/// Decode the list under `key` item by item, skipping corrupt items.
fn list<T: DeserializeOwned>(entries: &[(Value, Value)], key: &str) -> Vec<T> {
    let Some(value) = field(entries, key) else {
        return Vec::new();
    };
    let Some(items) = value.as_array() else {
        tracing::warn!(key, "expected a list, ignoring");
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| match item.deserialized::<T>() {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                tracing::warn!(key, error = %e, "skipping corrupt entry");
                None
            },
        })
        .collect()
}

fn sessions(value: &Value) -> SessionsRecord {
    let Some(entries) = value.as_map() else {
        tracing::warn!("session record is not a map, ignoring");
        return SessionsRecord::default();
    };

    let mode = field(entries, "mode").filter(|m| !m.is_null()).and_then(|m| {
        m.deserialized::<SessionMode>()
            .inspect_err(|e| tracing::warn!(error = %e, "unknown session mode, using default"))
            .ok()
    });

    let sessions = field(entries, "sessions")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(session).collect())
        .unwrap_or_default();

    SessionsRecord { mode, sessions, unassigned: list(entries, "unassigned") }
}

fn session(value: &Value) -> Option<SessionRecord> {
    let Some(entries) = value.as_map() else {
        tracing::warn!("skipping session that is not a map");
        return None;
    };
    Some(SessionRecord {
        name: field(entries, "name").and_then(Value::as_text).map(str::to_string),
        locked: field(entries, "locked").and_then(Value::as_bool).unwrap_or(false),
        connections: list(entries, "connections"),
    })
}

fn rename(entries: &mut [(Value, Value)], from: &str, to: &str) {
    for (key, _) in entries.iter_mut() {
        if key.as_text() == Some(from) {
            *key = Value::Text(to.to_string());
        }
    }
}

/// Rewrite a version 0 record into the version 1 layout.
fn migrate_v0(mut entries: Vec<(Value, Value)>) -> Vec<(Value, Value)> {
    for (key, value) in &mut entries {
        match key.as_text() {
            Some("serversOpen" | "resumingClients" | "resumingServers") => {
                if let Some(items) = value.as_array_mut() {
                    for item in items.iter_mut().filter_map(Value::as_map_mut) {
                        rename(item, "player", "identifier");
                        rename(item, "computer", "device");
                    }
                }
            },
            Some("sessions") => {
                if let Some(session) = value.as_map_mut() {
                    let single = field(session, "singleSession").and_then(Value::as_bool);
                    session.retain(|(k, _)| k.as_text() != Some("singleSession"));
                    if let Some(single) = single {
                        let mode = if single { "Global" } else { "Independent" };
                        session.push((Value::Text("mode".to_string()), Value::Text(mode.to_string())));
                    }
                }
            },
            _ => {},
        }
    }
    tracing::info!("migrated version 0 pairing record");
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::RegionId;

    fn text(s: &str) -> Value {
        Value::Text(s.to_string())
    }

    fn location_value(x: i64) -> Value {
        Value::Map(vec![
            (text("region"), text("overworld")),
            (text("x"), Value::Integer(x.into())),
            (text("y"), Value::Integer(64.into())),
            (text("z"), Value::Integer(0.into())),
        ])
    }

    fn to_bytes(value: &Value) -> Vec<u8> {
        let mut bytes = Vec::new();
        ciborium::into_writer(value, &mut bytes).ok();
        bytes
    }

    #[test]
    fn empty_map_decodes_to_empty_record() {
        let record = decode(&to_bytes(&Value::Map(vec![]))).ok();
        assert_eq!(record, Some(PairingRecord::default()));
    }

    #[test]
    fn encoded_record_decodes() {
        let record = PairingRecord {
            servers_open: vec![WaitingEntry {
                identifier: Identifier::from_raw(3),
                device: DeviceLocation::new(RegionId::new("overworld"), 1, 2, 3),
            }],
            ..PairingRecord::default()
        };

        let bytes = encode(&record).ok();
        let decoded = bytes.and_then(|b| decode(&b).ok());
        assert_eq!(decoded, Some(record));
    }

    #[test]
    fn corrupt_entries_are_skipped() {
        let good = Value::Map(vec![
            (text("identifier"), Value::Integer(1.into())),
            (text("device"), location_value(0)),
        ]);
        let bad = Value::Map(vec![(text("identifier"), text("not a number"))]);
        let value = Value::Map(vec![
            (text("version"), Value::Integer(1.into())),
            (text("serversOpen"), Value::Array(vec![bad, good])),
            (text("resumingClients"), text("not a list")),
        ]);

        let record = decode(&to_bytes(&value)).ok();
        assert_eq!(record.as_ref().map(|r| r.servers_open.len()), Some(1));
        assert_eq!(record.map(|r| r.resuming_clients.len()), Some(0));
    }

    #[test]
    fn newer_version_is_refused() {
        let value = Value::Map(vec![(text("version"), Value::Integer(99.into()))]);
        let err = decode(&to_bytes(&value));
        assert!(matches!(err, Err(PairingError::UnsupportedVersion { found: 99, .. })));
    }

    #[test]
    fn garbage_is_a_decode_error() {
        assert!(matches!(decode(&[0xff, 0x00, 0x13]), Err(PairingError::Decode { .. })));
    }

    #[test]
    fn legacy_keys_are_migrated() {
        let entry = Value::Map(vec![
            (text("player"), Value::Integer(5.into())),
            (text("computer"), location_value(7)),
        ]);
        let value = Value::Map(vec![
            (text("resumingServers"), Value::Array(vec![entry])),
            (
                text("sessions"),
                Value::Map(vec![
                    (text("singleSession"), Value::Bool(false)),
                    (text("sessions"), Value::Array(vec![])),
                ]),
            ),
        ]);

        let record = decode(&to_bytes(&value)).ok();
        let Some(record) = record else { panic!("legacy record failed to decode") };
        assert_eq!(record.version, RECORD_VERSION);
        assert_eq!(record.resuming_servers.len(), 1);
        assert_eq!(record.resuming_servers[0].identifier, Identifier::from_raw(5));
        assert_eq!(record.resuming_servers[0].device.x, 7);
        assert_eq!(record.sessions.mode, Some(SessionMode::Independent));
    }
}
