//! The Kea configuration module: Begin, Apply and Commit of host and subnet
//! changes.
//!
//! Begin and Apply never contact the fleet. Commit sends the recipe
//! commands one at a time, in order, and stops at the first failure. Commands
//! already applied are not rolled back. The local inventory is changed only
//! after every command of an update succeeded.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use keaflow_core::{
    App, ConfigStore, Daemon, DaemonId, DataSource, Host, HostId, IpFamily, SemanticVersion,
    StoreError, Subnet, SubnetId,
};
use keaflow_ctrl::{first_response_error, forward_and_parse, Command, Forwarder, Response};

use crate::error::{persistence_err, ConfigError};
use crate::lock::{ConfigLock, DaemonLocker, LockOwner};
use crate::options::OptionDefinitionLookup;
use crate::recipe::{ConfigCommand, ConfigRecipe, HostRecipeParams, SubnetRecipeParams};
use crate::state::{EntityKind, Operation, TransactionState, Update};
use crate::translate;

/// Hook library providing the `subnet*-update` family of commands.
pub const SUBNET_CMDS_HOOK: &str = "libdhcp_subnet_cmds";

/// Daemons older than this do not refresh pool statistics after subnet
/// commands and get a `config-reload` after `config-write`.
pub const RELOAD_AFTER_WRITE_BEFORE: SemanticVersion = SemanticVersion::new(2, 6, 0);

// ---------------------------------------------------------------------------
// Transaction handle
// ---------------------------------------------------------------------------

/// An in-flight configuration change, owned by one caller from Begin to
/// Commit. Dropping it releases its daemon locks.
#[derive(Debug)]
pub struct Transaction {
    id: LockOwner,
    state: TransactionState<ConfigRecipe>,
    lock: Option<ConfigLock>,
}

impl Transaction {
    fn new(id: LockOwner, update: Update<ConfigRecipe>, lock: Option<ConfigLock>) -> Self {
        Self {
            id,
            state: TransactionState::new_with_update(update),
            lock,
        }
    }

    pub fn id(&self) -> LockOwner {
        self.id
    }

    pub fn state(&self) -> &TransactionState<ConfigRecipe> {
        &self.state
    }

    /// Daemons locked by this transaction.
    pub fn locked_daemons(&self) -> &[DaemonId] {
        self.lock.as_ref().map_or(&[], |lock| lock.daemon_ids())
    }

    /// Commands of every update, in dispatch order.
    pub fn commands(&self) -> impl Iterator<Item = &ConfigCommand> {
        self.state
            .updates
            .iter()
            .flat_map(|update| update.recipe.commands.iter())
    }

    /// Recipe of the first update, checking it belongs to `operation`.
    fn recipe_mut(&mut self, operation: Operation) -> Result<&mut ConfigRecipe, ConfigError> {
        let update = self
            .state
            .updates
            .first_mut()
            .ok_or_else(|| ConfigError::Logic("transaction has no updates".to_owned()))?;
        if update.operation != operation {
            return Err(ConfigError::Logic(format!(
                "cannot apply {operation} to a {} transaction",
                update.operation
            )));
        }
        Ok(&mut update.recipe)
    }
}

// ---------------------------------------------------------------------------
// Module
// ---------------------------------------------------------------------------

/// Coordinates configuration changes of Kea daemons.
pub struct ConfigModule {
    store: Arc<dyn ConfigStore>,
    forwarder: Arc<dyn Forwarder>,
    locker: Arc<dyn DaemonLocker>,
    lookup: Arc<dyn OptionDefinitionLookup>,
    next_transaction: AtomicU64,
}

impl ConfigModule {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        forwarder: Arc<dyn Forwarder>,
        locker: Arc<dyn DaemonLocker>,
        lookup: Arc<dyn OptionDefinitionLookup>,
    ) -> Self {
        Self {
            store,
            forwarder,
            locker,
            lookup,
            next_transaction: AtomicU64::new(1),
        }
    }

    fn next_id(&self) -> LockOwner {
        self.next_transaction.fetch_add(1, Ordering::Relaxed)
    }

    fn begin_locked(
        &self,
        operation: Operation,
        daemon_ids: Vec<DaemonId>,
        recipe: ConfigRecipe,
    ) -> Result<Transaction, ConfigError> {
        let id = self.next_id();
        let lock = ConfigLock::acquire(self.locker.clone(), id, daemon_ids.clone())?;
        debug!(transaction = id, %operation, daemons = ?daemon_ids, "began transaction");
        Ok(Transaction::new(
            id,
            Update::new(operation, daemon_ids, recipe),
            Some(lock),
        ))
    }

    fn begin_unlocked(&self, operation: Operation, recipe: ConfigRecipe) -> Transaction {
        let id = self.next_id();
        debug!(transaction = id, %operation, "began transaction");
        Transaction::new(id, Update::new(operation, vec![], recipe), None)
    }

    // -----------------------------------------------------------------------
    // Hosts
    // -----------------------------------------------------------------------

    /// Begins adding a host reservation.
    pub fn begin_host_add(&self) -> Transaction {
        self.begin_unlocked(Operation::HostAdd, ConfigRecipe::new(EntityKind::Host))
    }

    /// Prepares a `reservation-add` for every daemon the host is associated
    /// with.
    pub fn apply_host_add(&self, tx: &mut Transaction, host: Host) -> Result<(), ConfigError> {
        ensure_host_associated(&host)?;
        let mut commands = Vec::with_capacity(host.local_hosts.len());
        for local in &host.local_hosts {
            let (daemon, app) = endpoint(EntityKind::Host, host.id.0, local.daemon_id, local.daemon.as_ref())?;
            let arguments = translate::reservation_add(daemon, self.lookup.as_ref(), &host)?;
            commands.push(command(daemon, app, "reservation-add", Some(arguments)));
        }

        let recipe = tx.recipe_mut(Operation::HostAdd)?;
        recipe.host_params_mut()?.after = Some(host);
        recipe.commands = commands;
        Ok(())
    }

    /// Begins updating host `host_id`: loads it and locks the daemons holding
    /// its API-sourced reservations.
    pub fn begin_host_update(&self, host_id: HostId) -> Result<Transaction, ConfigError> {
        let host = self.load_host(host_id)?;
        let daemon_ids = api_daemons(&host);
        let recipe = ConfigRecipe::with_host(HostRecipeParams {
            before: Some(host),
            after: None,
            host_id: Some(host_id),
        });
        self.begin_locked(Operation::HostUpdate, daemon_ids, recipe)
    }

    /// Kea has no command updating a reservation in place: every API-sourced
    /// reservation of the loaded host is deleted, then the reservations of the
    /// updated host are added.
    pub fn apply_host_update(&self, tx: &mut Transaction, host: Host) -> Result<(), ConfigError> {
        ensure_host_associated(&host)?;
        let recipe = tx.recipe_mut(Operation::HostUpdate)?;
        let params = recipe.host_params_mut()?;
        let existing = params.before.as_ref().ok_or_else(|| {
            ConfigError::Logic("host instance must be loaded before applying a host update".to_owned())
        })?;

        let mut commands = Vec::new();
        for local in existing
            .local_hosts
            .iter()
            .filter(|lh| lh.data_source != DataSource::Config)
        {
            let (daemon, app) = endpoint(EntityKind::Host, host.id.0, local.daemon_id, local.daemon.as_ref())?;
            let arguments = translate::reservation_del(daemon.id, existing)?;
            commands.push(command(daemon, app, "reservation-del", Some(arguments)));
        }
        for local in host
            .local_hosts
            .iter()
            .filter(|lh| lh.data_source != DataSource::Config)
        {
            let (daemon, app) = endpoint(EntityKind::Host, host.id.0, local.daemon_id, local.daemon.as_ref())?;
            let arguments = translate::reservation_add(daemon, self.lookup.as_ref(), &host)?;
            commands.push(command(daemon, app, "reservation-add", Some(arguments)));
        }

        params.after = Some(host);
        recipe.commands = commands;
        Ok(())
    }

    /// Begins deleting host `host_id`: loads it and locks the daemons holding
    /// its API-sourced reservations.
    pub fn begin_host_delete(&self, host_id: HostId) -> Result<Transaction, ConfigError> {
        let host = self.load_host(host_id)?;
        let daemon_ids = api_daemons(&host);
        let recipe = ConfigRecipe::with_host(HostRecipeParams {
            before: Some(host),
            after: None,
            host_id: Some(host_id),
        });
        self.begin_locked(Operation::HostDelete, daemon_ids, recipe)
    }

    /// Prepares a `reservation-del` for every API-sourced reservation of the
    /// loaded host.
    pub fn apply_host_delete(&self, tx: &mut Transaction) -> Result<(), ConfigError> {
        let recipe = tx.recipe_mut(Operation::HostDelete)?;
        let host = recipe.host_params()?.before.as_ref().ok_or_else(|| {
            ConfigError::Logic("host instance must be loaded before applying a host delete".to_owned())
        })?;
        ensure_host_associated(host)?;

        let mut commands = Vec::new();
        for local in host
            .local_hosts
            .iter()
            .filter(|lh| lh.data_source != DataSource::Config)
        {
            let (daemon, app) = endpoint(EntityKind::Host, host.id.0, local.daemon_id, local.daemon.as_ref())?;
            let arguments = translate::reservation_del(daemon.id, host)?;
            commands.push(command(daemon, app, "reservation-del", Some(arguments)));
        }
        recipe.commands = commands;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Subnets
    // -----------------------------------------------------------------------

    /// Begins adding a subnet.
    pub fn begin_subnet_add(&self) -> Transaction {
        self.begin_unlocked(Operation::SubnetAdd, ConfigRecipe::new(EntityKind::Subnet))
    }

    /// Assigns the next free local subnet id to every association and
    /// prepares the `subnet{4,6}-add` commands, shared network membership
    /// and configuration writes.
    pub fn apply_subnet_add(&self, tx: &mut Transaction, mut subnet: Subnet) -> Result<(), ConfigError> {
        ensure_subnet_associated(&subnet)?;
        let local_subnet_id = self.store.get_max_local_subnet_id()? + 1;
        for local in &mut subnet.local_subnets {
            local.local_subnet_id = local_subnet_id;
        }

        let family = subnet.family();
        let shared_network = subnet.shared_network_name();
        let mut commands = Vec::new();
        let mut written = Vec::new();
        for local in &subnet.local_subnets {
            let (daemon, app) = endpoint(EntityKind::Subnet, subnet.id.0, local.daemon_id, local.daemon.as_ref())?;
            let arguments = translate::subnet_set(daemon, self.lookup.as_ref(), &subnet)?;
            commands.push(command(daemon, app, &subnet_command(family, "add"), Some(arguments)));
            if let Some(name) = shared_network {
                let arguments = translate::network_subnet(local.local_subnet_id, name);
                commands.push(command(daemon, app, &network_command(family, "add"), Some(arguments)));
            }
            written.push((daemon, app));
        }
        push_config_writes(&mut commands, written, true);

        let recipe = tx.recipe_mut(Operation::SubnetAdd)?;
        recipe.subnet_params_mut()?.after = Some(subnet);
        recipe.commands = commands;
        Ok(())
    }

    /// Begins updating subnet `subnet_id`. Every daemon serving the subnet
    /// must have its configuration fetched and the subnet commands hook
    /// loaded; all of them are locked.
    pub fn begin_subnet_update(&self, subnet_id: SubnetId) -> Result<Transaction, ConfigError> {
        let subnet = self.load_subnet(subnet_id)?;
        let mut daemon_ids = Vec::with_capacity(subnet.local_subnets.len());
        for local in &subnet.local_subnets {
            let daemon = local.daemon.as_ref().ok_or(ConfigError::MissingDaemon {
                kind: EntityKind::Subnet,
                id: subnet.id.0,
                daemon_id: local.daemon_id,
            })?;
            match daemon.has_hook_library(SUBNET_CMDS_HOOK) {
                None => return Err(ConfigError::MissingDaemonConfig(daemon.id)),
                Some(false) => return Err(ConfigError::NoSubnetCmdsHook(daemon.id)),
                Some(true) => daemon_ids.push(daemon.id),
            }
        }
        let recipe = ConfigRecipe::with_subnet(SubnetRecipeParams {
            before: Some(subnet),
            after: None,
            subnet_id: Some(subnet_id),
        });
        self.begin_locked(Operation::SubnetUpdate, daemon_ids, recipe)
    }

    /// Prepares `subnet{4,6}-update` for daemons that already serve the
    /// subnet, `subnet{4,6}-add` for new ones and `subnet{4,6}-del` for
    /// daemons dropped from it. Changed shared network membership is moved
    /// with `network{4,6}-subnet-del` and `network{4,6}-subnet-add`.
    pub fn apply_subnet_update(&self, tx: &mut Transaction, mut subnet: Subnet) -> Result<(), ConfigError> {
        ensure_subnet_associated(&subnet)?;
        let recipe = tx.recipe_mut(Operation::SubnetUpdate)?;
        let params = recipe.subnet_params_mut()?;
        let existing = params.before.as_ref().ok_or_else(|| {
            ConfigError::Logic("subnet instance must be loaded before applying a subnet update".to_owned())
        })?;

        // New associations keep the subnet's id; Kea ids are shared across daemons.
        let fallback_id = existing.local_subnets.first().map(|ls| ls.local_subnet_id);
        for local in &mut subnet.local_subnets {
            if local.local_subnet_id == 0 {
                if let Some(id) = existing
                    .local_subnet(local.daemon_id)
                    .map(|ls| ls.local_subnet_id)
                    .or(fallback_id)
                {
                    local.local_subnet_id = id;
                }
            }
        }

        let family = subnet.family();
        let network_before = existing.shared_network_name();
        let network_after = subnet.shared_network_name();
        let mut commands = Vec::new();
        let mut written = Vec::new();

        for local in &subnet.local_subnets {
            let (daemon, app) = endpoint(EntityKind::Subnet, subnet.id.0, local.daemon_id, local.daemon.as_ref())?;
            let action = if existing.local_subnet(local.daemon_id).is_some() {
                "update"
            } else {
                "add"
            };
            let arguments = translate::subnet_set(daemon, self.lookup.as_ref(), &subnet)?;
            commands.push(command(daemon, app, &subnet_command(family, action), Some(arguments)));

            if network_before != network_after {
                if let Some(name) = network_before {
                    let arguments = translate::network_subnet(local.local_subnet_id, name);
                    commands.push(command(daemon, app, &network_command(family, "del"), Some(arguments)));
                }
                if let Some(name) = network_after {
                    let arguments = translate::network_subnet(local.local_subnet_id, name);
                    commands.push(command(daemon, app, &network_command(family, "add"), Some(arguments)));
                }
            }
            written.push((daemon, app));
        }

        for removed in existing
            .local_subnets
            .iter()
            .filter(|ls| subnet.local_subnet(ls.daemon_id).is_none())
        {
            let (daemon, app) = endpoint(EntityKind::Subnet, subnet.id.0, removed.daemon_id, removed.daemon.as_ref())?;
            let arguments = translate::subnet_del(daemon.id, existing)?;
            commands.push(command(daemon, app, &subnet_command(family, "del"), Some(arguments)));
            written.push((daemon, app));
        }
        push_config_writes(&mut commands, written, true);

        params.after = Some(subnet);
        recipe.commands = commands;
        Ok(())
    }

    /// Begins deleting subnet `subnet_id`: loads it and locks every daemon
    /// serving it.
    pub fn begin_subnet_delete(&self, subnet_id: SubnetId) -> Result<Transaction, ConfigError> {
        let subnet = self.load_subnet(subnet_id)?;
        let daemon_ids = subnet.local_subnets.iter().map(|ls| ls.daemon_id).collect();
        let recipe = ConfigRecipe::with_subnet(SubnetRecipeParams {
            before: Some(subnet),
            after: None,
            subnet_id: Some(subnet_id),
        });
        self.begin_locked(Operation::SubnetDelete, daemon_ids, recipe)
    }

    /// Prepares `subnet{4,6}-del` and a `config-write` for every daemon
    /// serving the loaded subnet.
    pub fn apply_subnet_delete(&self, tx: &mut Transaction) -> Result<(), ConfigError> {
        let recipe = tx.recipe_mut(Operation::SubnetDelete)?;
        let subnet = recipe.subnet_params()?.before.as_ref().ok_or_else(|| {
            ConfigError::Logic("subnet instance must be loaded before applying a subnet delete".to_owned())
        })?;
        ensure_subnet_associated(subnet)?;

        let family = subnet.family();
        let mut commands = Vec::new();
        let mut written = Vec::new();
        for local in &subnet.local_subnets {
            let (daemon, app) = endpoint(EntityKind::Subnet, subnet.id.0, local.daemon_id, local.daemon.as_ref())?;
            let arguments = translate::subnet_del(daemon.id, subnet)?;
            commands.push(command(daemon, app, &subnet_command(family, "del"), Some(arguments)));
            written.push((daemon, app));
        }
        push_config_writes(&mut commands, written, false);
        recipe.commands = commands;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Commit
    // -----------------------------------------------------------------------

    /// Sends the commands of every update and reconciles the local inventory.
    ///
    /// Locks are held until the local inventory has been updated and are
    /// released when this returns, successfully or not. Returns the final
    /// state, including identifiers assigned during the commit.
    pub async fn commit(&self, tx: Transaction) -> Result<TransactionState<ConfigRecipe>, ConfigError> {
        let Transaction {
            id,
            mut state,
            lock,
        } = tx;

        for update in &mut state.updates {
            let operation = update.operation;
            info!(transaction = id, %operation, commands = update.recipe.commands.len(), "committing update");
            self.dispatch(&update.recipe).await?;
            self.persist(operation, &mut update.recipe)?;
        }

        drop(lock);
        debug!(transaction = id, "transaction committed");
        Ok(state)
    }

    async fn dispatch(&self, recipe: &ConfigRecipe) -> Result<(), ConfigError> {
        for ConfigCommand { command, app } in &recipe.commands {
            debug!(command = command.name(), app = %app, daemons = ?command.daemons(), "sending Kea command");
            let outcome = forward_and_parse::<Response>(self.forwarder.as_ref(), app, command)
                .await
                .and_then(|responses| match first_response_error(&responses) {
                    Some(err) => Err(err),
                    None => Ok(()),
                });
            if let Err(source) = outcome {
                warn!(command = command.name(), app = %app, error = %source, "Kea command failed");
                return Err(ConfigError::CommandFailed {
                    command: command.name().to_owned(),
                    app: app.name.clone(),
                    source,
                });
            }
        }
        Ok(())
    }

    fn persist(&self, operation: Operation, recipe: &mut ConfigRecipe) -> Result<(), ConfigError> {
        match operation {
            Operation::HostAdd => {
                let host = committed_host(recipe, operation)?;
                let id = self
                    .store
                    .add_host_with_local_hosts(host)
                    .map_err(persistence_err(
                        "host has been successfully added to Kea but adding it to the local inventory failed",
                    ))?;
                let params = recipe.host_params_mut()?;
                params.host_id = Some(id);
                if let Some(host) = params.after.as_mut() {
                    host.id = id;
                }
            }
            Operation::HostUpdate => {
                let mut host = committed_host(recipe, operation)?.clone();
                let from_config = self
                    .store
                    .get_local_hosts(host.id, DataSource::Config)
                    .map_err(persistence_err(format!(
                        "host has been successfully updated in Kea but its local hosts could not be read from the local inventory for host {}",
                        host.id
                    )))?;
                host.local_hosts.retain(|lh| lh.data_source != DataSource::Config);
                host.local_hosts.extend(from_config);
                self.store
                    .update_host_with_local_hosts(&host)
                    .map_err(persistence_err(
                        "host has been successfully updated in Kea but updating it in the local inventory failed",
                    ))?;
                recipe.host_params_mut()?.after = Some(host);
            }
            Operation::HostDelete => {
                let host_id = recipe.host_params()?.host_id.ok_or_else(|| {
                    ConfigError::Logic("host id must be set when committing a host delete".to_owned())
                })?;
                self.delete_host_locally(host_id).map_err(persistence_err(
                    "host has been successfully deleted in Kea but deleting it in the local inventory failed",
                ))?;
            }
            Operation::SubnetAdd => {
                let params = recipe.subnet_params_mut()?;
                let subnet = params.after.as_mut().ok_or_else(|| missing_after(operation))?;
                let id = self.store.commit_subnet(subnet).map_err(persistence_err(
                    "subnet has been successfully created in Kea but adding it to the local inventory failed",
                ))?;
                subnet.id = id;
                params.subnet_id = Some(id);
            }
            Operation::SubnetUpdate => {
                let subnet = recipe
                    .subnet_params()?
                    .after
                    .as_ref()
                    .ok_or_else(|| missing_after(operation))?;
                self.store.commit_subnet(subnet).map_err(persistence_err(
                    "subnet has been successfully updated in Kea but updating it in the local inventory failed",
                ))?;
            }
            Operation::SubnetDelete => {
                let subnet_id = recipe.subnet_params()?.subnet_id.ok_or_else(|| {
                    ConfigError::Logic("subnet id must be set when committing a subnet delete".to_owned())
                })?;
                self.store.delete_subnet(subnet_id).map_err(persistence_err(
                    "subnet has been successfully deleted in Kea but deleting it in the local inventory failed",
                ))?;
            }
        }
        Ok(())
    }

    /// Keeps the host when reservations from daemon configuration files
    /// remain, dropping only its API-sourced associations.
    fn delete_host_locally(&self, host_id: HostId) -> Result<(), StoreError> {
        let host = self
            .store
            .get_host(host_id)?
            .ok_or(StoreError::HostNotFound(host_id))?;
        if host.has_config_local_hosts() {
            let removed = self.store.delete_daemons_from_host(host_id, DataSource::Api)?;
            debug!(host = %host_id, removed, "kept host with reservations from configuration files");
            Ok(())
        } else {
            self.store.delete_host(host_id)
        }
    }

    fn load_host(&self, host_id: HostId) -> Result<Host, ConfigError> {
        self.store
            .get_host(host_id)?
            .ok_or(ConfigError::HostNotFound(host_id))
    }

    fn load_subnet(&self, subnet_id: SubnetId) -> Result<Subnet, ConfigError> {
        self.store
            .get_subnet(subnet_id)?
            .ok_or(ConfigError::SubnetNotFound(subnet_id))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn ensure_host_associated(host: &Host) -> Result<(), ConfigError> {
    if host.local_hosts.is_empty() {
        return Err(ConfigError::NotAssociated {
            kind: EntityKind::Host,
            id: host.id.0,
        });
    }
    Ok(())
}

fn ensure_subnet_associated(subnet: &Subnet) -> Result<(), ConfigError> {
    if subnet.local_subnets.is_empty() {
        return Err(ConfigError::NotAssociated {
            kind: EntityKind::Subnet,
            id: subnet.id.0,
        });
    }
    Ok(())
}

fn api_daemons(host: &Host) -> Vec<DaemonId> {
    host.local_hosts
        .iter()
        .filter(|lh| lh.data_source == DataSource::Api)
        .map(|lh| lh.daemon_id)
        .collect()
}

/// Resolved daemon and control agent of an association.
fn endpoint<'a>(
    kind: EntityKind,
    id: i64,
    daemon_id: DaemonId,
    daemon: Option<&'a Daemon>,
) -> Result<(&'a Daemon, &'a App), ConfigError> {
    let daemon = daemon.ok_or(ConfigError::MissingDaemon {
        kind,
        id,
        daemon_id,
    })?;
    let app = daemon.app.as_ref().ok_or(ConfigError::MissingApp {
        kind,
        id,
        daemon_id,
    })?;
    Ok((daemon, app))
}

fn command(
    daemon: &Daemon,
    app: &App,
    name: &str,
    arguments: Option<keaflow_ctrl::Arguments>,
) -> ConfigCommand {
    ConfigCommand {
        command: Command::for_daemon(name, &daemon.name, arguments),
        app: app.clone(),
    }
}

fn subnet_command(family: IpFamily, action: &str) -> String {
    format!("subnet{}-{action}", family.number())
}

fn network_command(family: IpFamily, action: &str) -> String {
    format!("network{}-subnet-{action}", family.number())
}

/// Appends a `config-write` per daemon so subnet changes survive a restart,
/// and a `config-reload` for daemons that need it to refresh statistics.
fn push_config_writes(commands: &mut Vec<ConfigCommand>, daemons: Vec<(&Daemon, &App)>, reload: bool) {
    for (daemon, app) in daemons {
        commands.push(command(daemon, app, "config-write", None));
        if reload && SemanticVersion::parse_or_latest(&daemon.version) < RELOAD_AFTER_WRITE_BEFORE {
            commands.push(command(daemon, app, "config-reload", None));
        }
    }
}

fn committed_host(recipe: &ConfigRecipe, operation: Operation) -> Result<&Host, ConfigError> {
    recipe
        .host_params()?
        .after
        .as_ref()
        .ok_or_else(|| missing_after(operation))
}

fn missing_after(operation: Operation) -> ConfigError {
    ConfigError::Logic(format!(
        "the applied entity cannot be missing when committing {operation}"
    ))
}
