//! `keaflow subnet add|update|delete`

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use keaflow_config::ConfigModule;
use keaflow_core::{Subnet, SubnetId};

use super::{done, finish, read_entity, Env};

/// Change subnets on the fleet.
#[derive(Subcommand, Debug)]
pub enum SubnetCommand {
    /// Add a subnet to the daemons listed in the file.
    Add(AddArgs),

    /// Replace a subnet with the definition in the file. Daemons missing
    /// from the file stop serving the subnet.
    Update(UpdateArgs),

    /// Delete a subnet from every daemon serving it.
    Delete(DeleteArgs),
}

#[derive(Args, Debug)]
pub struct AddArgs {
    /// YAML file with the subnet definition.
    #[arg(long, short = 'f')]
    pub file: PathBuf,

    /// Print the Kea commands instead of sending them.
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// Subnet id in the inventory.
    pub id: i64,

    /// YAML file with the new subnet definition.
    #[arg(long, short = 'f')]
    pub file: PathBuf,

    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Subnet id in the inventory.
    pub id: i64,

    #[arg(long)]
    pub dry_run: bool,
}

pub fn run(env: &Env, cmd: SubnetCommand) -> Result<()> {
    let module = env.module();
    match cmd {
        SubnetCommand::Add(args) => add(env, &module, args),
        SubnetCommand::Update(args) => update(env, &module, args),
        SubnetCommand::Delete(args) => delete(&module, args),
    }
}

fn add(env: &Env, module: &ConfigModule, args: AddArgs) -> Result<()> {
    let subnet = resolve(env, read_entity(&args.file)?)?;
    let prefix = subnet.prefix.clone();
    let mut tx = module.begin_subnet_add();
    module
        .apply_subnet_add(&mut tx, subnet)
        .with_context(|| format!("failed to prepare subnet add for {prefix}"))?;

    if let Some(state) = finish(module, tx, args.dry_run)? {
        let id = state
            .updates
            .first()
            .and_then(|update| update.recipe.subnet_params().ok())
            .and_then(|params| params.subnet_id)
            .context("subnet id missing after commit")?;
        done(&format!("Added subnet {prefix} with id {id}"));
    }
    Ok(())
}

fn update(env: &Env, module: &ConfigModule, args: UpdateArgs) -> Result<()> {
    let id = SubnetId(args.id);
    let mut subnet = resolve(env, read_entity(&args.file)?)?;
    subnet.id = id;

    let mut tx = module
        .begin_subnet_update(id)
        .with_context(|| format!("cannot update subnet {id}"))?;
    module
        .apply_subnet_update(&mut tx, subnet)
        .context("failed to prepare subnet update")?;

    if finish(module, tx, args.dry_run)?.is_some() {
        done(&format!("Updated subnet {id}"));
    }
    Ok(())
}

fn delete(module: &ConfigModule, args: DeleteArgs) -> Result<()> {
    let id = SubnetId(args.id);
    let mut tx = module
        .begin_subnet_delete(id)
        .with_context(|| format!("cannot delete subnet {id}"))?;
    module
        .apply_subnet_delete(&mut tx)
        .context("failed to prepare subnet delete")?;

    if finish(module, tx, args.dry_run)?.is_some() {
        done(&format!("Deleted subnet {id}"));
    }
    Ok(())
}

fn resolve(env: &Env, mut subnet: Subnet) -> Result<Subnet> {
    for local in &mut subnet.local_subnets {
        local.daemon = Some(env.daemon(local.daemon_id)?);
    }
    Ok(subnet)
}
