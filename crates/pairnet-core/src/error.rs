//! Coordinator error types.
//!
//! Expected negotiation failures are not errors: rejected requests come back
//! as [`RequestOutcome`](crate::RequestOutcome) and session conflicts as
//! [`MergeRejection`](crate::MergeRejection). This type covers persistence
//! faults and broken host contracts.

use thiserror::Error;

use crate::{identifier::Identifier, lifecycle::ServerInstance};

/// Errors from coordinator operations.
#[derive(Debug, Error)]
pub enum PairingError {
    /// A device was reported as relocated to a device with another owner.
    #[error("device moved from {old} to a device owned by {new}")]
    OwnerMismatch {
        /// Owner of the device at the old location.
        old: Identifier,
        /// Owner of the device at the new location.
        new: Identifier,
    },

    /// Persisted record could not be read.
    #[error("failed to decode pairing record: {reason}")]
    Decode {
        /// Description of the decode failure.
        reason: String,
    },

    /// State could not be written.
    #[error("failed to encode pairing record: {reason}")]
    Encode {
        /// Description of the encode failure.
        reason: String,
    },

    /// Record was written by a newer version.
    #[error("record version {found} is newer than supported version {supported}")]
    UnsupportedVersion {
        /// Version found in the record.
        found: u32,
        /// Newest version this build reads.
        supported: u32,
    },

    /// A handle from a previous server run was used after restart.
    #[error("server instance {requested} is stale, running instance is {running}")]
    StaleInstance {
        /// Instance the caller holds.
        requested: ServerInstance,
        /// Instance currently bound.
        running: ServerInstance,
    },

    /// No server instance is bound.
    #[error("no server instance is running")]
    NotRunning,
}

impl PairingError {
    /// Returns true if this error is fatal (unrecoverable).
    ///
    /// Fatal errors indicate host bugs and must not be swallowed.
    /// Transient errors leave the coordinator usable.
    pub fn is_fatal(&self) -> bool {
        match self {
            // Fatal: broken host contracts
            Self::OwnerMismatch { .. } | Self::StaleInstance { .. } => true,

            // Transient: the record is treated as absent or the call retried
            Self::Decode { .. }
            | Self::Encode { .. }
            | Self::UnsupportedVersion { .. }
            | Self::NotRunning => false,
        }
    }
}
