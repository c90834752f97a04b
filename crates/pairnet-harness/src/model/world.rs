//! Simulated device world.

use pairnet_core::{
    Coordinator, CoordinatorConfig, Device, DeviceDirectory, DeviceLocation, Identifier,
    MemoryDirectory, NetworkSnapshot, PairingError, RegionId, Role, RotatingLands, SessionMode,
    persist,
};

use super::operation::{Operation, PlayerId};

#[derive(Debug, Clone)]
struct SimPlayer {
    id: Identifier,
    /// Where the player's device currently stands (or stood).
    device: DeviceLocation,
}

/// A coordinator plus the device world it pairs.
///
/// Each player owns exactly one device. Destroying a device leaves its
/// location remembered so it can be restored in place.
#[derive(Debug)]
pub struct SimWorld {
    config: CoordinatorConfig,
    coordinator: Coordinator,
    devices: MemoryDirectory,
    lands: RotatingLands,
    players: Vec<SimPlayer>,
    relocations: i32,
}

impl SimWorld {
    /// Create a world with `num_players` players, each with a device in the
    /// overworld.
    pub fn new(num_players: usize, config: CoordinatorConfig) -> Self {
        let mut coordinator = Coordinator::new(config.clone());
        let mut devices = MemoryDirectory::new();
        let mut players = Vec::with_capacity(num_players);

        for (index, x) in (0..num_players).zip((0..).step_by(16)) {
            let id = coordinator.identify(&format!("uuid-{index}"), &format!("Player{index}"));
            let device = DeviceLocation::new(RegionId::new("overworld"), x, 64, 0);
            devices.place(device.clone(), Device::new(id));
            players.push(SimPlayer { id, device });
        }

        Self { config, coordinator, devices, lands: RotatingLands::default(), players, relocations: 0 }
    }

    /// The coordinator under test.
    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    /// The device world.
    pub fn devices(&self) -> &MemoryDirectory {
        &self.devices
    }

    /// Number of simulated players.
    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Identifier of a simulated player.
    pub fn identifier(&self, player: PlayerId) -> Option<Identifier> {
        self.players.get(usize::from(player)).map(|p| p.id)
    }

    /// Run the consistency checker and capture the resulting network.
    pub fn repair(&mut self) -> NetworkSnapshot {
        self.coordinator.check_data(&mut self.devices);
        self.coordinator.snapshot()
    }

    /// Apply an operation.
    ///
    /// Operations naming a player outside the world are ignored.
    ///
    /// # Errors
    ///
    /// Propagates coordinator errors from relocation and save/reload. Both
    /// indicate a bug in the coordinator, never a bad operation.
    pub fn apply(&mut self, op: &Operation) -> Result<(), PairingError> {
        match *op {
            Operation::Request { player, target, as_client } => {
                let Some(actor) = self.player(player) else { return Ok(()) };
                let other = target.and_then(|t| self.identifier(t));
                self.coordinator.request_connection(
                    &mut self.devices,
                    actor.id,
                    &actor.device,
                    other,
                    Role::from_is_client(as_client),
                );
            },
            Operation::Close { player, target, as_client } => {
                let Some(actor) = self.player(player) else { return Ok(()) };
                let other = target.and_then(|t| self.identifier(t));
                self.coordinator.close_connection(
                    &mut self.devices,
                    actor.id,
                    other,
                    Role::from_is_client(as_client),
                );
            },
            Operation::GiveItems { player } => {
                if let Some(id) = self.identifier(player) {
                    self.coordinator.give_items(&mut self.devices, id);
                }
            },
            Operation::PrepareEntry { player } => {
                if let Some(id) = self.identifier(player) {
                    self.coordinator.prepare_entry(&mut self.devices, &mut self.lands, id);
                }
            },
            Operation::FinishEntry { player } => {
                if let Some(id) = self.identifier(player) {
                    self.coordinator.on_entry(&mut self.devices, id);
                }
            },
            Operation::DestroyDevice { player } => {
                if let Some(actor) = self.player(player) {
                    self.devices.remove(&actor.device);
                }
            },
            Operation::RestoreDevice { player } => {
                if let Some(actor) = self.player(player) {
                    if self.devices.device(&actor.device).is_none() {
                        self.devices.place(actor.device, Device::new(actor.id));
                    }
                }
            },
            Operation::MoveDevice { player } => self.move_device(player)?,
            Operation::SaveAndReload => {
                let bytes = persist::encode(&self.coordinator.write())?;
                let record = persist::decode(&bytes)?;
                self.coordinator = Coordinator::from_record(self.config.clone(), record);
            },
            Operation::ToggleSessionMode => {
                let mode = match self.coordinator.roster().mode() {
                    SessionMode::Global => SessionMode::Independent,
                    SessionMode::Independent => SessionMode::Global,
                };
                self.coordinator.set_session_mode(mode);
            },
            Operation::Tick => {
                self.coordinator.clear_moving_list();
                self.coordinator.update_all(&mut self.devices);
                self.coordinator.drain_events();
                self.devices.drain_dirty();
            },
        }
        Ok(())
    }

    fn player(&self, player: PlayerId) -> Option<SimPlayer> {
        self.players.get(usize::from(player)).cloned()
    }

    fn move_device(&mut self, player: PlayerId) -> Result<(), PairingError> {
        let Some(actor) = self.players.get(usize::from(player)).cloned() else { return Ok(()) };
        if self.devices.device(&actor.device).is_none() {
            return Ok(());
        }

        self.relocations += 1;
        let to = DeviceLocation::new(actor.device.region.clone(), actor.device.x, 64, self.relocations);
        if !self.devices.relocate(&actor.device, to.clone()) {
            return Ok(());
        }
        self.coordinator.moving_device(&actor.device, actor.id, &to, actor.id)?;

        if let Some(p) = self.players.get_mut(usize::from(player)) {
            p.device = to;
        }
        Ok(())
    }
}
