//! Participant identity.
//!
//! An [`Identifier`] is the stable handle the coordinator uses for a player.
//! The host knows players by its own key (an account UUID string, a fake
//! player name, ...); the [`IdentifierRegistry`] issues exactly one
//! identifier per key and remembers the latest display name for logging.

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
};

use serde::{Deserialize, Serialize};

/// Stable participant handle. Equality and hashing are by value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identifier(u64);

impl Identifier {
    /// Wrap a raw identifier value.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw identifier value.
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "player#{}", self.0)
    }
}

/// One issued identity, as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityEntry {
    /// Issued identifier.
    pub identifier: Identifier,
    /// Host-side player key the identifier was issued for.
    pub key: String,
    /// Last known display name.
    pub name: String,
}

/// Issues identifiers and maps them back to display names.
#[derive(Debug, Clone, Default)]
pub struct IdentifierRegistry {
    by_key: HashMap<String, Identifier>,
    entries: BTreeMap<Identifier, IdentityEntry>,
    next: u64,
}

impl IdentifierRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a registry from persisted entries.
    ///
    /// Entries reusing an identifier or a key that was already restored are
    /// skipped with a warning.
    pub fn from_entries(entries: impl IntoIterator<Item = IdentityEntry>) -> Self {
        let mut registry = Self::new();
        for entry in entries {
            if registry.entries.contains_key(&entry.identifier)
                || registry.by_key.contains_key(&entry.key)
            {
                tracing::warn!(identifier = %entry.identifier, key = %entry.key, "skipping duplicate identity entry");
                continue;
            }
            registry.next = registry.next.max(entry.identifier.raw());
            registry.by_key.insert(entry.key.clone(), entry.identifier);
            registry.entries.insert(entry.identifier, entry);
        }
        registry
    }

    /// Return the identifier for `key`, issuing a new one on first sight.
    ///
    /// The stored display name follows `name` so renames show up in logs.
    pub fn issue(&mut self, key: &str, name: &str) -> Identifier {
        if let Some(&identifier) = self.by_key.get(key) {
            if let Some(entry) = self.entries.get_mut(&identifier) {
                if entry.name != name {
                    entry.name = name.to_string();
                }
            }
            return identifier;
        }

        self.next += 1;
        let identifier = Identifier(self.next);
        self.by_key.insert(key.to_string(), identifier);
        self.entries.insert(
            identifier,
            IdentityEntry { identifier, key: key.to_string(), name: name.to_string() },
        );
        identifier
    }

    /// Identifier previously issued for `key`.
    pub fn lookup(&self, key: &str) -> Option<Identifier> {
        self.by_key.get(key).copied()
    }

    /// Display name for an identifier.
    pub fn name(&self, identifier: Identifier) -> Option<&str> {
        self.entries.get(&identifier).map(|e| e.name.as_str())
    }

    /// Display name, falling back to the identifier itself.
    pub fn display(&self, identifier: Identifier) -> String {
        self.name(identifier).map_or_else(|| identifier.to_string(), str::to_string)
    }

    /// Number of issued identifiers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been issued yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All issued identities in identifier order.
    pub fn entries(&self) -> impl Iterator<Item = &IdentityEntry> {
        self.entries.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_is_stable_per_key() {
        let mut registry = IdentifierRegistry::new();
        let a = registry.issue("uuid-a", "Alice");
        let b = registry.issue("uuid-b", "Bob");

        assert_ne!(a, b);
        assert_eq!(registry.issue("uuid-a", "Alice"), a);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn issue_tracks_renames() {
        let mut registry = IdentifierRegistry::new();
        let a = registry.issue("uuid-a", "Alice");
        registry.issue("uuid-a", "Alicia");

        assert_eq!(registry.name(a), Some("Alicia"));
    }

    #[test]
    fn restored_registry_continues_numbering() {
        let mut original = IdentifierRegistry::new();
        original.issue("uuid-a", "Alice");
        let b = original.issue("uuid-b", "Bob");

        let mut restored = IdentifierRegistry::from_entries(original.entries().cloned());
        assert_eq!(restored.lookup("uuid-b"), Some(b));

        let c = restored.issue("uuid-c", "Carol");
        assert!(c > b);
    }

    #[test]
    fn restored_registry_skips_duplicates() {
        let entry = IdentityEntry {
            identifier: Identifier::from_raw(7),
            key: "uuid-a".to_string(),
            name: "Alice".to_string(),
        };
        let clash = IdentityEntry { key: "uuid-z".to_string(), ..entry.clone() };

        let registry = IdentifierRegistry::from_entries([entry, clash]);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.lookup("uuid-z"), None);
    }

    #[test]
    fn display_falls_back_to_raw_identifier() {
        let registry = IdentifierRegistry::new();
        assert_eq!(registry.display(Identifier::from_raw(3)), "player#3");
    }
}
