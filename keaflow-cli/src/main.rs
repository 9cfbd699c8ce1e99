//! keaflow: configuration changes across a Kea DHCP fleet.
//!
//! # Usage
//!
//! ```text
//! keaflow daemons [--json]
//! keaflow hosts [--json]
//! keaflow subnets [--json]
//! keaflow host add --file <host.yaml> [--dry-run]
//! keaflow host update <id> --file <host.yaml> [--dry-run]
//! keaflow host delete <id> [--dry-run]
//! keaflow subnet add --file <subnet.yaml> [--dry-run]
//! keaflow subnet update <id> --file <subnet.yaml> [--dry-run]
//! keaflow subnet delete <id> [--dry-run]
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use commands::{host::HostCommand, list::ListArgs, subnet::SubnetCommand, Env};
use keaflow_core::settings::{LogFormat, Settings};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "keaflow",
    version,
    about = "Change host reservations and subnets across a Kea DHCP fleet",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the daemons in the inventory.
    Daemons(ListArgs),

    /// List the host reservations in the inventory.
    Hosts(ListArgs),

    /// List the subnets in the inventory.
    Subnets(ListArgs),

    /// Add, update or delete a host reservation.
    Host {
        #[command(subcommand)]
        command: HostCommand,
    },

    /// Add, update or delete a subnet.
    Subnet {
        #[command(subcommand)]
        command: SubnetCommand,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    let env = Env::load()?;
    init_tracing(&env.settings);

    match cli.command {
        Commands::Daemons(args) => commands::list::daemons(&env, args),
        Commands::Hosts(args) => commands::list::hosts(&env, args),
        Commands::Subnets(args) => commands::list::subnets(&env, args),
        Commands::Host { command } => commands::host::run(&env, command),
        Commands::Subnet { command } => commands::subnet::run(&env, command),
    }
}

/// Logs go to stderr so `--dry-run` and `--json` output stays parseable.
fn init_tracing(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    let _ = match settings.log_format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.try_init(),
    };
}
