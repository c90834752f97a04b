//! Operations for model-based testing.
//!
//! Operations represent every host callback the coordinator reacts to. They
//! are generated randomly by proptest (or by the fuzzer through
//! [`Arbitrary`]) and applied to a [`SimWorld`](super::SimWorld).

use arbitrary::Arbitrary;

/// Simulated player index (0-indexed).
pub type PlayerId = u8;

/// Operations that can be applied to the world.
#[derive(Debug, Clone, PartialEq, Eq, Arbitrary)]
pub enum Operation {
    /// Player asks to pair through their device.
    Request {
        /// Acting player.
        player: PlayerId,
        /// Explicit counterpart.
        target: Option<PlayerId>,
        /// Connect as client rather than server.
        as_client: bool,
    },

    /// Player closes a link or cancels a wait.
    Close {
        /// Acting player.
        player: PlayerId,
        /// Counterpart of the link to close.
        target: Option<PlayerId>,
        /// Close the client side rather than the server side.
        as_client: bool,
    },

    /// Player's server gives the first items, promoting the link to main.
    GiveItems {
        /// Client player of the active link.
        player: PlayerId,
    },

    /// Player triggers entry.
    PrepareEntry {
        /// Entering player.
        player: PlayerId,
    },

    /// Player's entry transport finished.
    FinishEntry {
        /// Entering player.
        player: PlayerId,
    },

    /// Player's device is broken.
    DestroyDevice {
        /// Owner of the device.
        player: PlayerId,
    },

    /// Player places a fresh device where the old one stood.
    RestoreDevice {
        /// Owner of the device.
        player: PlayerId,
    },

    /// Player's device is moved elsewhere, keeping its state.
    MoveDevice {
        /// Owner of the device.
        player: PlayerId,
    },

    /// Server saves and restarts.
    SaveAndReload,

    /// Host switches between global and independent sessions.
    ToggleSessionMode,

    /// Tick boundary.
    Tick,
}

impl Operation {
    /// Map every player index into `0..num_players`.
    #[must_use]
    pub fn clamped(self, num_players: usize) -> Self {
        let n = u8::try_from(num_players.clamp(1, usize::from(u8::MAX))).unwrap_or(u8::MAX);
        let clamp = |p: PlayerId| p % n;

        match self {
            Self::Request { player, target, as_client } => {
                Self::Request { player: clamp(player), target: target.map(clamp), as_client }
            },
            Self::Close { player, target, as_client } => {
                Self::Close { player: clamp(player), target: target.map(clamp), as_client }
            },
            Self::GiveItems { player } => Self::GiveItems { player: clamp(player) },
            Self::PrepareEntry { player } => Self::PrepareEntry { player: clamp(player) },
            Self::FinishEntry { player } => Self::FinishEntry { player: clamp(player) },
            Self::DestroyDevice { player } => Self::DestroyDevice { player: clamp(player) },
            Self::RestoreDevice { player } => Self::RestoreDevice { player: clamp(player) },
            Self::MoveDevice { player } => Self::MoveDevice { player: clamp(player) },
            Self::SaveAndReload | Self::ToggleSessionMode | Self::Tick => self,
        }
    }
}
