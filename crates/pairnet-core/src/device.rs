//! Device directory abstraction.
//!
//! Devices live in the host world. The coordinator only ever refers to them
//! by [`DeviceLocation`] and resolves them on demand through a
//! [`DeviceDirectory`]; a location that no longer resolves means the device
//! was unloaded, destroyed or moved.
//!
//! Each device carries two role slots (client and server) that the
//! coordinator writes so the host can render pairing status. Writes mark the
//! device dirty; the host syncs dirty devices to players and clears the flag.

use std::{collections::HashMap, fmt};

use serde::{Deserialize, Serialize};

use crate::{identifier::Identifier, session::MergeRejection};

/// World region (dimension) identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegionId(String);

impl RegionId {
    /// Create a region identity.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Region name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a device sits: region plus block coordinate.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DeviceLocation {
    /// Region the device is in.
    pub region: RegionId,
    /// Block x coordinate.
    pub x: i32,
    /// Block y coordinate.
    pub y: i32,
    /// Block z coordinate.
    pub z: i32,
}

impl DeviceLocation {
    /// Create a location.
    pub fn new(region: RegionId, x: i32, y: i32, z: i32) -> Self {
        Self { region, x, y, z }
    }
}

impl fmt::Display for DeviceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{},{},{}", self.region, self.x, self.y, self.z)
    }
}

/// Pairing role of a participant or device slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Client side of a connection (slot 0).
    Client,
    /// Server side of a connection (slot 1).
    Server,
}

impl Role {
    /// Slot index on the device.
    pub const fn slot(self) -> usize {
        match self {
            Self::Client => 0,
            Self::Server => 1,
        }
    }

    /// The other role.
    pub const fn opposite(self) -> Self {
        match self {
            Self::Client => Self::Server,
            Self::Server => Self::Client,
        }
    }

    /// Role from a "connecting as client" flag.
    pub const fn from_is_client(is_client: bool) -> Self {
        if is_client { Self::Client } else { Self::Server }
    }
}

/// Status line shown on a device slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusMessage {
    /// The open server was closed by its owner.
    ClosedServer,
    /// A pending resume was cancelled.
    StopResume,
    /// An active connection was closed.
    Closed,
    /// The device belongs to someone else.
    PrivateDevice,
    /// The session merge engine refused the connection.
    Rejected(MergeRejection),
}

impl StatusMessage {
    /// Translation key the host renders.
    pub const fn translation_key(self) -> &'static str {
        match self {
            Self::ClosedServer => "pairnet.closed_server_message",
            Self::StopResume => "pairnet.stop_resume_message",
            Self::Closed => "pairnet.closed_message",
            Self::PrivateDevice => "pairnet.private_device",
            Self::Rejected(reason) => reason.translation_key(),
        }
    }
}

/// One role slot on a device.
///
/// For the client slot `waiting` means "resuming" and `connected_to` is the
/// server player; for the server slot `waiting` means "open" and
/// `connected_to` is the client player.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleSlot {
    /// The slot advertises availability to pair.
    pub waiting: bool,
    /// Counterpart of the active connection, if any.
    pub connected_to: Option<Identifier>,
    /// Latest status message.
    pub latest_message: Option<StatusMessage>,
}

/// Live representation of a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    owner: Identifier,
    slots: [RoleSlot; 2],
    dirty: bool,
}

impl Device {
    /// A fresh device owned by `owner`.
    pub fn new(owner: Identifier) -> Self {
        Self { owner, slots: Default::default(), dirty: false }
    }

    /// Owning player.
    pub fn owner(&self) -> Identifier {
        self.owner
    }

    /// Read a role slot.
    pub fn slot(&self, role: Role) -> &RoleSlot {
        &self.slots[role.slot()]
    }

    /// Mutable access to a role slot. Marks the device dirty.
    pub fn slot_mut(&mut self, role: Role) -> &mut RoleSlot {
        self.dirty = true;
        &mut self.slots[role.slot()]
    }

    /// Set or clear the waiting flag of a slot.
    pub fn set_waiting(&mut self, role: Role, waiting: bool) {
        self.slot_mut(role).waiting = waiting;
    }

    /// Record a new active connection on a slot.
    pub fn connected(&mut self, role: Role, other: Identifier) {
        let slot = self.slot_mut(role);
        slot.waiting = false;
        slot.connected_to = Some(other);
        slot.latest_message = None;
    }

    /// Clear a slot's connection and post a message.
    ///
    /// The waiting flag is left alone: a server slot may be open for new
    /// clients while an older connection through it is being closed.
    pub fn disconnected(&mut self, role: Role, message: StatusMessage) {
        let slot = self.slot_mut(role);
        slot.connected_to = None;
        slot.latest_message = Some(message);
    }

    /// Post a status message without touching the slot flags.
    pub fn post(&mut self, role: Role, message: StatusMessage) {
        self.slot_mut(role).latest_message = Some(message);
    }

    /// Flag the device for a client sync.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Whether the device needs a client sync.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Clear and return the dirty flag.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }
}

/// Resolves device locations to live devices.
///
/// Implemented by the host world. Resolution must be synchronous and cheap;
/// the coordinator calls it many times per operation.
pub trait DeviceDirectory {
    /// Resolve a location, `None` if no device is there.
    fn device(&self, location: &DeviceLocation) -> Option<&Device>;

    /// Resolve a location for writing.
    fn device_mut(&mut self, location: &DeviceLocation) -> Option<&mut Device>;
}

/// In-memory device directory.
#[derive(Debug, Clone, Default)]
pub struct MemoryDirectory {
    devices: HashMap<DeviceLocation, Device>,
}

impl MemoryDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Place a device, replacing whatever was at `location`.
    pub fn place(&mut self, location: DeviceLocation, device: Device) -> Option<Device> {
        self.devices.insert(location, device)
    }

    /// Remove the device at `location`.
    pub fn remove(&mut self, location: &DeviceLocation) -> Option<Device> {
        self.devices.remove(location)
    }

    /// Move a device, keeping its slot state. Returns `false` if nothing was
    /// at `from`.
    pub fn relocate(&mut self, from: &DeviceLocation, to: DeviceLocation) -> bool {
        match self.devices.remove(from) {
            Some(device) => {
                self.devices.insert(to, device);
                true
            },
            None => false,
        }
    }

    /// Number of placed devices.
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Whether no device is placed.
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Locations of devices awaiting a client sync, clearing their flags.
    pub fn drain_dirty(&mut self) -> Vec<DeviceLocation> {
        let mut dirty: Vec<_> = self
            .devices
            .iter_mut()
            .filter_map(|(location, device)| device.take_dirty().then(|| location.clone()))
            .collect();
        dirty.sort();
        dirty
    }
}

impl DeviceDirectory for MemoryDirectory {
    fn device(&self, location: &DeviceLocation) -> Option<&Device> {
        self.devices.get(location)
    }

    fn device_mut(&mut self, location: &DeviceLocation) -> Option<&mut Device> {
        self.devices.get_mut(location)
    }
}
