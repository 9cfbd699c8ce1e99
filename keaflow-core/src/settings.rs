//! User settings read from `~/.keaflow/settings.yaml`.
//!
//! Every field has a default; a missing file yields [`Settings::default`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{io_err, StoreError};
use crate::paths;

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Per-request timeout towards the Kea Control Agents, in seconds.
    pub request_timeout_secs: u64,
    pub log_format: LogFormat,
    /// Overrides `~/.keaflow/inventory.yaml`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inventory: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            request_timeout_secs: 10,
            log_format: LogFormat::Text,
            inventory: None,
        }
    }
}

impl Settings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Inventory file to use for `home`.
    pub fn inventory_path(&self, home: &Path) -> PathBuf {
        self.inventory
            .clone()
            .unwrap_or_else(|| paths::inventory_path(home))
    }
}

/// Load settings from `<home>/.keaflow/settings.yaml`.
pub fn load_at(home: &Path) -> Result<Settings, StoreError> {
    let path = paths::settings_path(home);
    if !path.exists() {
        return Ok(Settings::default());
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    serde_yaml::from_str(&contents).map_err(|e| StoreError::Parse { path, source: e })
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<Settings, StoreError> {
    load_at(&paths::home()?)
}
