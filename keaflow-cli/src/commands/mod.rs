//! Subcommands and the environment they share.

pub mod host;
pub mod list;
pub mod subnet;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use colored::Colorize;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use keaflow_config::{
    ConfigModule, ConfigRecipe, FileLocker, StandardOptionDefinitions, Transaction,
    TransactionState,
};
use keaflow_core::{settings, ConfigStore, Daemon, DaemonId, Settings, YamlStore};
use keaflow_ctrl::HttpForwarder;

/// Settings and inventory resolved from the user's home directory.
pub struct Env {
    pub home: PathBuf,
    pub settings: Settings,
    pub store: Arc<YamlStore>,
}

impl Env {
    pub fn load() -> Result<Self> {
        let home: PathBuf = dirs::home_dir().context("could not determine home directory")?;
        let settings = settings::load_at(&home).context("failed to load ~/.keaflow/settings.yaml")?;
        let store = Arc::new(YamlStore::new(settings.inventory_path(&home)));
        Ok(Self {
            home,
            settings,
            store,
        })
    }

    /// A configuration module talking to the fleet over HTTP. Daemon locks
    /// live under `~/.keaflow/locks/` so concurrent invocations exclude each
    /// other.
    pub fn module(&self) -> ConfigModule {
        ConfigModule::new(
            self.store.clone(),
            Arc::new(HttpForwarder::new(self.settings.request_timeout())),
            Arc::new(FileLocker::open_at(&self.home)),
            Arc::new(StandardOptionDefinitions),
        )
    }

    /// Daemon `id` with its control agent resolved.
    pub fn daemon(&self, id: DaemonId) -> Result<Daemon> {
        self.store
            .get_daemon(id)
            .context("failed to read inventory")?
            .with_context(|| format!("daemon {id} not found in the inventory"))
    }
}

/// Reads a host or subnet definition from a YAML (or JSON) file.
pub fn read_entity<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_yaml::from_str(&contents).with_context(|| format!("failed to parse {}", path.display()))
}

#[derive(Serialize)]
struct PlannedCommand<'a> {
    app: &'a str,
    url: String,
    #[serde(flatten)]
    command: &'a keaflow_ctrl::Command,
}

/// Prints the commands of an applied transaction as JSON, or commits it.
///
/// In dry-run mode the transaction is dropped without contacting the fleet,
/// which releases its locks.
pub fn finish(
    module: &ConfigModule,
    tx: Transaction,
    dry_run: bool,
) -> Result<Option<TransactionState<ConfigRecipe>>> {
    if dry_run {
        let planned: Vec<_> = tx
            .commands()
            .map(|c| PlannedCommand {
                app: &c.app.name,
                url: c.app.url(),
                command: &c.command,
            })
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&planned).context("failed to render commands JSON")?
        );
        debug!(commands = planned.len(), "dry run, nothing sent to the fleet");
        return Ok(None);
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start the async runtime")?;
    let state = match runtime.block_on(module.commit(tx)) {
        Ok(state) => state,
        Err(err) => {
            if err.is_local_persistence() {
                warn!(error = %err, "fleet changed but the local inventory was not updated");
            }
            return Err(anyhow::Error::new(err).context("transaction failed"));
        }
    };
    info!(updates = state.updates.len(), "transaction committed");
    Ok(Some(state))
}

pub fn done(message: &str) {
    println!("{} {message}", "✓".green().bold());
}
