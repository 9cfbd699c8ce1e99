//! Filesystem layout under `~/.keaflow/`.

use std::path::{Path, PathBuf};

use crate::error::StoreError;

pub const INVENTORY_FILE: &str = "inventory.yaml";
pub const SETTINGS_FILE: &str = "settings.yaml";
pub const LOCKS_DIR: &str = "locks";

pub fn keaflow_root(home: &Path) -> PathBuf {
    home.join(".keaflow")
}

pub fn inventory_path(home: &Path) -> PathBuf {
    keaflow_root(home).join(INVENTORY_FILE)
}

pub fn settings_path(home: &Path) -> PathBuf {
    keaflow_root(home).join(SETTINGS_FILE)
}

/// Per-daemon lock files held while a transaction is open.
pub fn locks_dir(home: &Path) -> PathBuf {
    keaflow_root(home).join(LOCKS_DIR)
}

pub fn home() -> Result<PathBuf, StoreError> {
    dirs::home_dir().ok_or(StoreError::HomeNotFound)
}
