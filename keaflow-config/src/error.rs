//! Error types for keaflow-config.

use std::path::PathBuf;

use thiserror::Error;

use keaflow_core::{DaemonId, HostId, StoreError, SubnetId};
use keaflow_ctrl::CtrlError;

use crate::state::EntityKind;

/// All errors that can arise from configuration transactions.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The proposed entity has no daemon association.
    #[error("{kind} {id} is not associated with any daemon")]
    NotAssociated { kind: EntityKind, id: i64 },

    /// An association whose daemon was not resolved by the store.
    #[error("{kind} {id} is associated with unknown daemon {daemon_id}")]
    MissingDaemon {
        kind: EntityKind,
        id: i64,
        daemon_id: DaemonId,
    },

    /// A daemon whose control agent was not resolved by the store.
    #[error("{kind} {id} is associated with daemon {daemon_id} without an app")]
    MissingApp {
        kind: EntityKind,
        id: i64,
        daemon_id: DaemonId,
    },

    /// Internal contract violation between transaction stages.
    #[error("server logic error: {0}")]
    Logic(String),

    #[error("host {0} not found")]
    HostNotFound(HostId),

    #[error("subnet {0} not found")]
    SubnetNotFound(SubnetId),

    /// Another transaction holds the daemon configuration. Retry later.
    #[error("configuration of daemon {daemon_id} is locked by another change, try again later")]
    Locked { daemon_id: DaemonId },

    #[error("cannot use lock file {}: {source}", .path.display())]
    LockFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The daemon configuration has never been fetched.
    #[error("configuration not found for daemon {0}")]
    MissingDaemonConfig(DaemonId),

    #[error("daemon {0} does not have the libdhcp_subnet_cmds hook library loaded")]
    NoSubnetCmdsHook(DaemonId),

    /// A command could not be delivered or a daemon rejected it.
    #[error("{command} command to {app} failed: {source}")]
    CommandFailed {
        command: String,
        app: String,
        #[source]
        source: CtrlError,
    },

    /// The fleet was changed but the local inventory could not follow.
    #[error("{message}: {source}")]
    LocalPersistence {
        message: String,
        #[source]
        source: StoreError,
    },

    /// An entity could not be converted into a Kea payload.
    #[error("cannot convert {kind} {id} for daemon {daemon_id}: {reason}")]
    Translation {
        kind: EntityKind,
        id: i64,
        daemon_id: DaemonId,
        reason: String,
    },

    #[error("unknown operation {0:?}")]
    UnknownOperation(String),

    #[error("invalid stored recipe: {0}")]
    StoredRecipe(#[from] serde_json::Error),

    #[error("inventory error: {0}")]
    Store(#[from] StoreError),
}

impl ConfigError {
    /// Whether the caller may retry the change later.
    pub fn is_lock_contention(&self) -> bool {
        matches!(self, ConfigError::Locked { .. })
    }

    /// Whether the change reached the fleet but not the local inventory.
    pub fn is_local_persistence(&self) -> bool {
        matches!(self, ConfigError::LocalPersistence { .. })
    }
}

/// Convenience constructor for [`ConfigError::LocalPersistence`].
pub(crate) fn persistence_err(message: impl Into<String>) -> impl FnOnce(StoreError) -> ConfigError {
    let message = message.into();
    move |source| ConfigError::LocalPersistence { message, source }
}
