//! Coordinator configuration.

use std::collections::BTreeSet;

use serde::Deserialize;

use crate::{device::RegionId, session::SessionMode};

/// Coordinator configuration.
///
/// Missing fields take their defaults when deserialized, so hosts can ship a
/// partial config file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Run the consistency pass before every broadcast.
    pub consistency_check: bool,
    /// Start worlds without a persisted record in global session mode.
    pub global_session: bool,
    /// Player ceiling per session.
    pub max_session_players: usize,
    /// Regions where devices may not take part in pairing.
    pub excluded_regions: BTreeSet<RegionId>,
}

impl CoordinatorConfig {
    /// Whether devices in `region` are barred from pairing.
    pub fn is_excluded(&self, region: &RegionId) -> bool {
        self.excluded_regions.contains(region)
    }

    /// Session mode for a fresh world.
    pub fn initial_mode(&self) -> SessionMode {
        if self.global_session { SessionMode::Global } else { SessionMode::Independent }
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            consistency_check: true,
            global_session: true,
            max_session_players: 12,
            excluded_regions: BTreeSet::from([RegionId::new("the_nether")]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nether_is_excluded_by_default() {
        let config = CoordinatorConfig::default();
        assert!(config.is_excluded(&RegionId::new("the_nether")));
        assert!(!config.is_excluded(&RegionId::new("overworld")));
    }

    #[test]
    fn initial_mode_follows_flag() {
        let config = CoordinatorConfig { global_session: false, ..CoordinatorConfig::default() };
        assert_eq!(config.initial_mode(), SessionMode::Independent);
    }
}
