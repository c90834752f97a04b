//! Client/server connection records.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};

use crate::{device::DeviceLocation, identifier::Identifier, land::LandInfo};

/// Every connection the coordinator knows about, by handle.
pub type ConnectionTable = BTreeMap<ConnectionId, Connection>;

/// Coordinator-local connection handle.
///
/// Handles are not persisted; they are reassigned when a record is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Wrap a raw handle.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw handle value.
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// Classification carried by connection events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionKind {
    /// A first connection between the two players.
    Regular,
    /// A connection made while the client already has a main connection.
    Secondary,
    /// A previously established connection was resumed.
    Resume,
}

/// How a new connection relates to existing sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionJoin {
    /// At least one side had no session yet.
    Fresh,
    /// Both sides were already in the same session.
    Internal,
    /// The two sides were in different sessions that get merged.
    Merge,
}

/// A client/server pairing.
///
/// A main connection is never destroyed once promoted; closing it only
/// deactivates it so it can be resumed later. The server side is optional:
/// a player entering without any partner gets a main connection with no
/// server player, which a later client request fills in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    id: ConnectionId,
    client: Identifier,
    server: Option<Identifier>,
    active: bool,
    main: bool,
    client_device: Option<DeviceLocation>,
    server_device: Option<DeviceLocation>,
    land: Option<LandInfo>,
    has_entered: bool,
    given_items: BTreeSet<String>,
    center_x: i32,
    center_z: i32,
    use_coordinates: bool,
}

impl Connection {
    /// A fresh, inactive, non-main connection.
    pub fn new(id: ConnectionId, client: Identifier, server: Identifier) -> Self {
        Self {
            id,
            client,
            server: Some(server),
            active: false,
            main: false,
            client_device: None,
            server_device: None,
            land: None,
            has_entered: false,
            given_items: BTreeSet::new(),
            center_x: 0,
            center_z: 0,
            use_coordinates: false,
        }
    }

    /// A main connection with no server player, made for a player entering
    /// on their own.
    pub fn self_link(id: ConnectionId, client: Identifier) -> Self {
        Self { server: None, main: true, ..Self::new(id, client, client) }
    }

    /// Handle.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: ConnectionId) {
        self.id = id;
    }

    /// Client player.
    pub fn client(&self) -> Identifier {
        self.client
    }

    /// Server player, if one was ever attached.
    pub fn server(&self) -> Option<Identifier> {
        self.server
    }

    /// Whether a server player is attached.
    pub fn has_server(&self) -> bool {
        self.server.is_some()
    }

    /// Whether `player` is on either side.
    pub fn involves(&self, player: Identifier) -> bool {
        self.client == player || self.server == Some(player)
    }

    /// Both devices are currently linked.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Canonical connection for its client and server.
    pub fn is_main(&self) -> bool {
        self.main
    }

    /// Promote to main.
    pub fn set_main(&mut self) {
        self.main = true;
    }

    /// Client device while active.
    pub fn client_device(&self) -> Option<&DeviceLocation> {
        self.client_device.as_ref()
    }

    /// Server device while active.
    pub fn server_device(&self) -> Option<&DeviceLocation> {
        self.server_device.as_ref()
    }

    /// Mark active with both device locations.
    pub fn activate(&mut self, client_device: DeviceLocation, server_device: DeviceLocation) {
        self.active = true;
        self.client_device = Some(client_device);
        self.server_device = Some(server_device);
    }

    /// Mark inactive and forget device locations.
    pub fn deactivate(&mut self) {
        self.active = false;
        self.client_device = None;
        self.server_device = None;
    }

    /// Attach a server player to a connection that has none.
    ///
    /// Returns `false` and leaves the connection untouched if a server is
    /// already attached.
    pub fn attach_server(&mut self, server: Identifier) -> bool {
        if self.server.is_some() {
            return false;
        }
        self.server = Some(server);
        true
    }

    pub(crate) fn detach_server(&mut self) {
        self.server = None;
    }

    /// Replace `old` with `new` in either device slot. Returns whether any
    /// slot referenced `old`.
    pub fn relocate(&mut self, old: &DeviceLocation, new: &DeviceLocation) -> bool {
        let mut moved = false;
        for slot in [&mut self.client_device, &mut self.server_device] {
            if slot.as_ref() == Some(old) {
                *slot = Some(new.clone());
                moved = true;
            }
        }
        moved
    }

    /// Land assigned to the client player.
    pub fn land(&self) -> Option<&LandInfo> {
        self.land.as_ref()
    }

    /// Assign the client's land.
    pub fn set_land(&mut self, land: LandInfo) {
        self.land = Some(land);
    }

    /// Whether the client player has entered their land.
    pub fn has_entered(&self) -> bool {
        self.has_entered
    }

    /// Record that the client entered.
    pub fn set_entered(&mut self) {
        self.has_entered = true;
    }

    /// Items the server player has given through this connection.
    pub fn given_items(&self) -> impl Iterator<Item = &str> {
        self.given_items.iter().map(String::as_str)
    }

    /// Record a given item. Returns `false` if it was already given.
    pub fn give_item(&mut self, item: impl Into<String>) -> bool {
        self.given_items.insert(item.into())
    }

    /// Forget every given item.
    pub fn reset_given_items(&mut self) {
        self.given_items.clear();
    }

    /// Temporary entry center override, if set.
    pub fn coordinate_override(&self) -> Option<(i32, i32)> {
        self.use_coordinates.then_some((self.center_x, self.center_z))
    }

    /// Set the entry center override.
    pub fn set_coordinate_override(&mut self, center_x: i32, center_z: i32) {
        self.center_x = center_x;
        self.center_z = center_z;
        self.use_coordinates = true;
    }

    /// Clear the entry center override.
    pub fn clear_coordinate_override(&mut self) {
        self.center_x = 0;
        self.center_z = 0;
        self.use_coordinates = false;
    }

    /// Copy land continuity from the client's main connection onto a
    /// secondary one.
    pub fn copy_from(&mut self, main: &Self) {
        self.land.clone_from(&main.land);
        self.has_entered = main.has_entered;
        self.center_x = main.center_x;
        self.center_z = main.center_z;
        self.use_coordinates = main.use_coordinates;
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        client: Identifier,
        server: Option<Identifier>,
        main: bool,
        devices: Option<(DeviceLocation, DeviceLocation)>,
        land: Option<LandInfo>,
        has_entered: bool,
        given_items: BTreeSet<String>,
        center: Option<(i32, i32)>,
    ) -> Self {
        let mut connection = Self {
            server,
            main,
            land,
            has_entered,
            given_items,
            ..Self::new(ConnectionId::from_raw(0), client, client)
        };
        if let Some((client_device, server_device)) = devices {
            connection.activate(client_device, server_device);
        }
        if let Some((x, z)) = center {
            connection.set_coordinate_override(x, z);
        }
        connection
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::RegionId;

    fn location(x: i32) -> DeviceLocation {
        DeviceLocation::new(RegionId::new("overworld"), x, 0, 0)
    }

    fn player(raw: u64) -> Identifier {
        Identifier::from_raw(raw)
    }

    #[test]
    fn self_link_is_main_without_server() {
        let connection = Connection::self_link(ConnectionId::from_raw(1), player(1));
        assert!(connection.is_main());
        assert!(!connection.has_server());
        assert!(connection.involves(player(1)));
    }

    #[test]
    fn attach_server_only_once() {
        let mut connection = Connection::self_link(ConnectionId::from_raw(1), player(1));
        assert!(connection.attach_server(player(2)));
        assert!(!connection.attach_server(player(3)));
        assert_eq!(connection.server(), Some(player(2)));
    }

    #[test]
    fn deactivate_forgets_devices() {
        let mut connection = Connection::new(ConnectionId::from_raw(1), player(1), player(2));
        connection.activate(location(0), location(1));
        connection.deactivate();

        assert!(!connection.is_active());
        assert!(connection.client_device().is_none());
        assert!(connection.server_device().is_none());
    }

    #[test]
    fn relocate_updates_both_slots_for_shared_device() {
        let mut connection = Connection::new(ConnectionId::from_raw(1), player(1), player(1));
        connection.activate(location(0), location(0));

        assert!(connection.relocate(&location(0), &location(9)));
        assert_eq!(connection.client_device(), Some(&location(9)));
        assert_eq!(connection.server_device(), Some(&location(9)));
        assert!(!connection.relocate(&location(0), &location(10)));
    }

    #[test]
    fn copy_from_carries_land_and_entry() {
        let mut main = Connection::self_link(ConnectionId::from_raw(1), player(1));
        main.set_land(LandInfo {
            dimension: RegionId::new("land_0"),
            terrain: "forest".to_string(),
            title: "light".to_string(),
        });
        main.set_entered();

        let mut secondary = Connection::new(ConnectionId::from_raw(2), player(1), player(2));
        secondary.copy_from(&main);

        assert_eq!(secondary.land(), main.land());
        assert!(secondary.has_entered());
        assert!(!secondary.is_main());
    }

    #[test]
    fn coordinate_override_round_trip() {
        let mut connection = Connection::new(ConnectionId::from_raw(1), player(1), player(2));
        assert_eq!(connection.coordinate_override(), None);

        connection.set_coordinate_override(10, -4);
        assert_eq!(connection.coordinate_override(), Some((10, -4)));

        connection.clear_coordinate_override();
        assert_eq!(connection.coordinate_override(), None);
    }
}
