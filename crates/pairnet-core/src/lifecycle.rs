//! Binding of a coordinator to one running server instance.
//!
//! The host owns a single [`ServerBinding`]. Each server start hands it a
//! fresh [`ServerInstance`] and the persisted record; every later call
//! presents the instance it was started with, so code holding an instance
//! from a previous run cannot reach the new coordinator.

use std::fmt;

use crate::{config::CoordinatorConfig, coordinator::Coordinator, error::PairingError, persist};

/// Identity of one server run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ServerInstance(u64);

impl ServerInstance {
    /// Wrap a raw instance value.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw instance value.
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ServerInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "server#{}", self.0)
    }
}

/// Holder of the coordinator for the running server, if any.
#[derive(Debug, Default)]
pub struct ServerBinding {
    running: Option<(ServerInstance, Coordinator)>,
}

impl ServerBinding {
    /// Create an unbound holder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a coordinator to `instance`, restoring it from `record`.
    ///
    /// A record that fails to decode is logged and treated as absent. A
    /// coordinator still bound to an earlier instance is dropped.
    pub fn start(
        &mut self,
        instance: ServerInstance,
        config: CoordinatorConfig,
        record: Option<&[u8]>,
    ) -> &mut Coordinator {
        let coordinator = match record.map(persist::decode) {
            None => Coordinator::new(config),
            Some(Ok(record)) => Coordinator::from_record(config, record),
            Some(Err(e)) => {
                tracing::error!(%instance, error = %e, "failed to load pairing record, starting empty");
                Coordinator::new(config)
            },
        };

        if let Some((previous, _)) = &self.running {
            tracing::warn!(%previous, %instance, "server started without stopping the previous run");
        }
        tracing::info!(%instance, "pairing coordinator started");

        let (_, coordinator) = self.running.insert((instance, coordinator));
        coordinator
    }

    /// Coordinator of the running instance.
    ///
    /// # Errors
    ///
    /// - [`PairingError::NotRunning`] if nothing is bound
    /// - [`PairingError::StaleInstance`] if `instance` is not the bound one
    pub fn get(&mut self, instance: ServerInstance) -> Result<&mut Coordinator, PairingError> {
        match &mut self.running {
            None => Err(PairingError::NotRunning),
            Some((running, coordinator)) if *running == instance => Ok(coordinator),
            Some((running, _)) => Err(PairingError::StaleInstance { requested: instance, running: *running }),
        }
    }

    /// Encode the running coordinator for storage.
    ///
    /// # Errors
    ///
    /// Same as [`get`](Self::get), plus [`PairingError::Encode`].
    pub fn save(&mut self, instance: ServerInstance) -> Result<Vec<u8>, PairingError> {
        let coordinator = self.get(instance)?;
        persist::encode(&coordinator.write())
    }

    /// Release the coordinator of `instance`.
    ///
    /// # Errors
    ///
    /// Same as [`get`](Self::get). Nothing is released on error.
    pub fn stop(&mut self, instance: ServerInstance) -> Result<(), PairingError> {
        self.get(instance)?;
        self.running = None;
        tracing::info!(%instance, "pairing coordinator stopped");
        Ok(())
    }

    /// Whether a coordinator is bound.
    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }
}
