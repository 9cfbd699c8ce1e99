//! `keaflow host add|update|delete`

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use keaflow_config::ConfigModule;
use keaflow_core::{ConfigStore, Host, HostId, LocalSubnetRef};

use super::{done, finish, read_entity, Env};

/// Change host reservations on the fleet.
#[derive(Subcommand, Debug)]
pub enum HostCommand {
    /// Add a host reservation to the daemons listed in the file.
    Add(AddArgs),

    /// Replace a host reservation with the definition in the file.
    Update(UpdateArgs),

    /// Delete a host reservation from every daemon it was added to.
    Delete(DeleteArgs),
}

#[derive(Args, Debug)]
pub struct AddArgs {
    /// YAML file with the host definition.
    #[arg(long, short = 'f')]
    pub file: PathBuf,

    /// Print the Kea commands instead of sending them.
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// Host id in the inventory.
    pub id: i64,

    /// YAML file with the new host definition.
    #[arg(long, short = 'f')]
    pub file: PathBuf,

    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Host id in the inventory.
    pub id: i64,

    #[arg(long)]
    pub dry_run: bool,
}

pub fn run(env: &Env, cmd: HostCommand) -> Result<()> {
    let module = env.module();
    match cmd {
        HostCommand::Add(args) => add(env, &module, args),
        HostCommand::Update(args) => update(env, &module, args),
        HostCommand::Delete(args) => delete(&module, args),
    }
}

fn add(env: &Env, module: &ConfigModule, args: AddArgs) -> Result<()> {
    let host = resolve(env, read_entity(&args.file)?)?;
    let mut tx = module.begin_host_add();
    module
        .apply_host_add(&mut tx, host)
        .context("failed to prepare host add")?;

    if let Some(state) = finish(module, tx, args.dry_run)? {
        let id = state
            .updates
            .first()
            .and_then(|update| update.recipe.host_params().ok())
            .and_then(|params| params.host_id)
            .context("host id missing after commit")?;
        done(&format!("Added host {id}"));
    }
    Ok(())
}

fn update(env: &Env, module: &ConfigModule, args: UpdateArgs) -> Result<()> {
    let id = HostId(args.id);
    let mut host = resolve(env, read_entity(&args.file)?)?;
    host.id = id;

    let mut tx = module
        .begin_host_update(id)
        .with_context(|| format!("cannot update host {id}"))?;
    module
        .apply_host_update(&mut tx, host)
        .context("failed to prepare host update")?;

    if finish(module, tx, args.dry_run)?.is_some() {
        done(&format!("Updated host {id}"));
    }
    Ok(())
}

fn delete(module: &ConfigModule, args: DeleteArgs) -> Result<()> {
    let id = HostId(args.id);
    let mut tx = module
        .begin_host_delete(id)
        .with_context(|| format!("cannot delete host {id}"))?;
    module
        .apply_host_delete(&mut tx)
        .context("failed to prepare host delete")?;

    if finish(module, tx, args.dry_run)?.is_some() {
        done(&format!("Deleted host {id}"));
    }
    Ok(())
}

/// Fills in the daemons of the host's associations and the local ids of its
/// subnet from the inventory.
fn resolve(env: &Env, mut host: Host) -> Result<Host> {
    for local in &mut host.local_hosts {
        local.daemon = Some(env.daemon(local.daemon_id)?);
    }
    if let Some(subnet_ref) = host.subnet.as_mut() {
        let subnet = env
            .store
            .get_subnet(subnet_ref.id)
            .context("failed to read inventory")?
            .with_context(|| format!("subnet {} not found in the inventory", subnet_ref.id))?;
        subnet_ref.prefix = subnet.prefix;
        subnet_ref.local_subnet_ids = subnet
            .local_subnets
            .iter()
            .map(|ls| LocalSubnetRef {
                daemon_id: ls.daemon_id,
                local_subnet_id: ls.local_subnet_id,
            })
            .collect();
    }
    Ok(host)
}
