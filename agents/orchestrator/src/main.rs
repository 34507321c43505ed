//! The hyperion orchestrator carries deposits, withdrawal batches, validator
//! set updates and external call results between the Helios chain and its
//! counterparty EVM chains.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use eyre::Result;
use serde::Serialize;

use hyperion_base::settings::Settings;
use hyperion_base::{agent_main, install_error_handler, LoadableFromSettings};
use hyperion_core::HyperionId;

use crate::orchestrator::{operative_chains, Orchestrator};

mod admin;
mod instance;
mod loops;
mod orchestrator;

#[cfg(test)]
mod test_utils;

#[derive(Debug, Parser)]
#[command(name = "hyperion", version, about = "Helios hyperion bridge orchestrator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the build version
    Version,
    /// Run the orchestrator and its admin API until interrupted
    Server {
        /// Port of the admin API and `/metrics`
        #[arg(long, env = "HYPERION_PORT")]
        port: Option<u16>,
        /// Directory of the persisted fees, endpoints, settings and runners
        #[arg(long, env = "HYPERION_DATA_DIR")]
        data_dir: Option<PathBuf>,
    },
    /// One-off home chain queries and registrations
    #[command(subcommand)]
    Q(QueryCommand),
}

#[derive(Debug, Subcommand)]
enum QueryCommand {
    /// Counterparty chains whose current valset contains this orchestrator
    ListOperativeChains,
    /// Bind this key as orchestrator of a bridge deployment
    SetOrchestrator {
        #[arg(long)]
        hyperion_id: HyperionId,
    },
    /// Remove the orchestrator binding of this key
    UnsetOrchestrator {
        #[arg(long)]
        hyperion_id: HyperionId,
    },
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run_query(command: QueryCommand) -> Result<()> {
    install_error_handler()?;
    let settings = Settings::load(&[])?;
    settings.tracing.start_tracing()?;
    let home = settings.build_home_client()?;
    match command {
        QueryCommand::ListOperativeChains => print_json(&operative_chains(&home).await?),
        QueryCommand::SetOrchestrator { hyperion_id } => {
            print_json(&home.set_orchestrator_addresses(hyperion_id).await?)
        }
        QueryCommand::UnsetOrchestrator { hyperion_id } => {
            print_json(&home.unset_orchestrator_addresses(hyperion_id).await?)
        }
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    match Cli::parse().command {
        Command::Version => {
            println!("hyperion {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Command::Server { port, data_dir } => {
            let mut overrides = Vec::new();
            if let Some(port) = port {
                overrides.push(("server.port", port.to_string()));
            }
            if let Some(data_dir) = data_dir {
                overrides.push(("data_dir", data_dir.display().to_string()));
            }
            // Logging is not initialised at this point, so, using `println!`
            println!("Orchestrator starting up...");
            agent_main::<Orchestrator>(&overrides).await
        }
        Command::Q(command) => run_query(command).await,
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_query_subcommands() {
        let cli = Cli::parse_from(["hyperion", "q", "set-orchestrator", "--hyperion-id", "21"]);
        assert!(matches!(
            cli.command,
            Command::Q(QueryCommand::SetOrchestrator { hyperion_id: 21 })
        ));

        let cli = Cli::parse_from(["hyperion", "server", "--port", "9090"]);
        assert!(matches!(cli.command, Command::Server { port: Some(9090), .. }));
    }
}
