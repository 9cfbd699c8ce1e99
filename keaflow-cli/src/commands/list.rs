//! `keaflow daemons`, `keaflow hosts` and `keaflow subnets`.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use keaflow_config::SUBNET_CMDS_HOOK;
use keaflow_core::{ConfigStore, Daemon, Host, Subnet};

use super::Env;

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct DaemonRow {
    #[tabled(rename = "id")]
    id: i64,
    #[tabled(rename = "daemon")]
    name: String,
    #[tabled(rename = "version")]
    version: String,
    #[tabled(rename = "app")]
    app: String,
    #[tabled(rename = "subnet cmds")]
    subnet_cmds: &'static str,
}

#[derive(Tabled)]
struct HostRow {
    #[tabled(rename = "id")]
    id: i64,
    #[tabled(rename = "identifiers")]
    identifiers: String,
    #[tabled(rename = "reservations")]
    reservations: String,
    #[tabled(rename = "hostname")]
    hostname: String,
    #[tabled(rename = "daemons")]
    daemons: String,
}

#[derive(Tabled)]
struct SubnetRow {
    #[tabled(rename = "id")]
    id: i64,
    #[tabled(rename = "prefix")]
    prefix: String,
    #[tabled(rename = "shared network")]
    shared_network: String,
    #[tabled(rename = "daemons")]
    daemons: String,
}

pub fn daemons(env: &Env, args: ListArgs) -> Result<()> {
    let daemons = env.store.get_daemons().context("failed to read inventory")?;
    if args.json {
        return print_json(&daemons);
    }
    if daemons.is_empty() {
        println!("No daemons in the inventory.");
        return Ok(());
    }
    print_table(daemons.iter().map(daemon_row).collect::<Vec<_>>());
    Ok(())
}

pub fn hosts(env: &Env, args: ListArgs) -> Result<()> {
    let hosts = env.store.get_hosts().context("failed to read inventory")?;
    if args.json {
        return print_json(&hosts);
    }
    if hosts.is_empty() {
        println!("No hosts in the inventory.");
        return Ok(());
    }
    print_table(hosts.iter().map(host_row).collect::<Vec<_>>());
    Ok(())
}

pub fn subnets(env: &Env, args: ListArgs) -> Result<()> {
    let subnets = env.store.get_subnets().context("failed to read inventory")?;
    if args.json {
        return print_json(&subnets);
    }
    if subnets.is_empty() {
        println!("No subnets in the inventory.");
        return Ok(());
    }
    print_table(subnets.iter().map(subnet_row).collect::<Vec<_>>());
    Ok(())
}

fn daemon_row(daemon: &Daemon) -> DaemonRow {
    DaemonRow {
        id: daemon.id.0,
        name: daemon.name.clone(),
        version: daemon.version.clone(),
        app: daemon
            .app
            .as_ref()
            .map(|app| format!("{app} ({})", app.url()))
            .unwrap_or_else(|| format!("app {} missing", daemon.app_id)),
        subnet_cmds: match daemon.has_hook_library(SUBNET_CMDS_HOOK) {
            Some(true) => "yes",
            Some(false) => "no",
            None => "unknown",
        },
    }
}

fn host_row(host: &Host) -> HostRow {
    HostRow {
        id: host.id.0,
        identifiers: host
            .identifiers
            .iter()
            .map(|i| format!("{}={}", i.kind, i.to_kea_string()))
            .collect::<Vec<_>>()
            .join(" "),
        reservations: host.reservations.join(" "),
        hostname: host.hostname.clone().unwrap_or_default(),
        daemons: host
            .local_hosts
            .iter()
            .map(|lh| format!("{} ({})", lh.daemon_id, lh.data_source))
            .collect::<Vec<_>>()
            .join(", "),
    }
}

fn subnet_row(subnet: &Subnet) -> SubnetRow {
    SubnetRow {
        id: subnet.id.0,
        prefix: subnet.prefix.clone(),
        shared_network: subnet.shared_network_name().unwrap_or_default().to_owned(),
        daemons: subnet
            .local_subnets
            .iter()
            .map(|ls| format!("{} (id {})", ls.daemon_id, ls.local_subnet_id))
            .collect::<Vec<_>>()
            .join(", "),
    }
}

fn print_table<T: Tabled>(rows: Vec<T>) {
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("failed to serialize inventory JSON")?
    );
    Ok(())
}
