//! Land identity and the world-generation collaborator.

use serde::{Deserialize, Serialize};

use crate::{device::RegionId, identifier::Identifier, session::SessionId};

/// A land assigned to a main connection's client player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LandInfo {
    /// Region the land is generated in.
    pub dimension: RegionId,
    /// Terrain aspect name.
    pub terrain: String,
    /// Title aspect name.
    pub title: String,
}

/// Prepares lands for players about to enter.
///
/// Implemented by the world-generation side of the host. Returning `None`
/// means no land can be prepared right now and entry must not proceed.
pub trait LandAllocator {
    /// Prepare a land for `client`, who belongs to `session` (if any).
    fn prepare_land(&mut self, client: Identifier, session: Option<SessionId>) -> Option<LandInfo>;
}

/// Allocator cycling through fixed terrain and title aspect lists.
///
/// Dimensions are named `{prefix}_{n}` with `n` counting up from the
/// configured offset, so hosts restoring a world pass the number of lands
/// already generated.
#[derive(Debug, Clone)]
pub struct RotatingLands {
    prefix: String,
    terrains: Vec<String>,
    titles: Vec<String>,
    next: usize,
}

impl RotatingLands {
    /// Create an allocator.
    pub fn new(
        prefix: impl Into<String>,
        terrains: impl IntoIterator<Item = impl Into<String>>,
        titles: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            terrains: terrains.into_iter().map(Into::into).collect(),
            titles: titles.into_iter().map(Into::into).collect(),
            next: 0,
        }
    }

    /// Start numbering at `offset`.
    #[must_use]
    pub fn starting_at(mut self, offset: usize) -> Self {
        self.next = offset;
        self
    }
}

impl Default for RotatingLands {
    fn default() -> Self {
        Self::new(
            "land",
            ["forest", "frost", "heat", "sand", "shade"],
            ["light", "void", "time", "space", "breath", "blood"],
        )
    }
}

impl LandAllocator for RotatingLands {
    fn prepare_land(&mut self, client: Identifier, _session: Option<SessionId>) -> Option<LandInfo> {
        if self.terrains.is_empty() || self.titles.is_empty() {
            tracing::warn!(%client, "no land aspects configured");
            return None;
        }

        let n = self.next;
        self.next += 1;

        let terrain = &self.terrains[n % self.terrains.len()];
        let title = &self.titles[(n / self.terrains.len()) % self.titles.len()];

        Some(LandInfo {
            dimension: RegionId::new(format!("{}_{n}", self.prefix)),
            terrain: terrain.clone(),
            title: title.clone(),
        })
    }
}
