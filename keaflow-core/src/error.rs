//! Error types for keaflow-core.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::{DaemonId, HostId, SubnetId};

/// All errors that can arise from inventory store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying I/O failure, annotated with the path involved.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML serialization error (save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load, with the file path.
    #[error("failed to parse inventory at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::home_dir()` returned `None`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,

    #[error("host {0} not found in the inventory")]
    HostNotFound(HostId),

    #[error("subnet {0} not found in the inventory")]
    SubnetNotFound(SubnetId),

    /// A host or subnet refers to a daemon that is not in the inventory.
    #[error("daemon {0} not found in the inventory")]
    DaemonNotFound(DaemonId),

    /// A subnet with the same prefix already exists.
    #[error("subnet {prefix} already exists with id {id}")]
    DuplicateSubnet { prefix: String, id: SubnetId },
}

/// Convenience constructor for [`StoreError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.into(),
        source,
    }
}
