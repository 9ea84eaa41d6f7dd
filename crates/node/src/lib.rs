//! Muster node: CLI, configuration and runtime wiring.
//!
//! - [`Cli`] - top-level CLI parser
//! - [`NodeConfig`] - layered configuration
//! - [`tcp::TcpConnector`] - peer links over plain TCP
//!
//! Configuration is loaded using Figment with the following priority
//! (highest wins):
//!
//! 1. CLI arguments
//! 2. Config file (TOML)
//! 3. Environment variables (`MUSTER_` prefix)
//! 4. Defaults

mod cli;
pub mod commands;
pub mod config;
pub mod logging;
pub mod tcp;

pub use cli::{
    Cli, Commands, LogArgs, MembershipArgs, MetricsArgs, NodeArgs, RendezvousArgs, RunArgs,
};
pub use config::NodeConfig;

use clap::Parser;
use color_eyre::eyre;
use tracing::info;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Run the node with the process's CLI arguments.
///
/// This is the main entry point that should be called from the binary.
pub async fn run() -> eyre::Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => {
            logging::init_logging(&cli.logs)?;
            info!("starting muster {VERSION}");
            commands::run::run(&args).await
        }
        Commands::Config(args) => commands::config::run(&args),
    }
}
