//! WWT Bridge CLI
//!
//! Drives the bridge from the command line: replay message scripts against
//! the simulated engine and manage the configuration file.

mod commands;
mod error;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use wwt_bridge::config::{config_file_path, BridgeConfig};
use wwt_bridge::logging::init_logging;

use commands::config::ConfigCommands;
use commands::replay::ReplayArgs;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "wwt-bridge")]
#[command(version, about = "Async bridge for the WorldWide Telescope engine", long_about = None)]
struct Cli {
    /// Configuration file (default: ~/.wwt-bridge/config.ini)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level regardless of the configured level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Replay a JSON-lines message script against the simulated engine
    Replay(ReplayArgs),

    /// Manage the configuration file
    #[command(subcommand)]
    Config(ConfigCommands),
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        e.exit();
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config_path = cli.config.unwrap_or_else(config_file_path);

    match cli.command {
        Commands::Config(command) => commands::config::run(command, &config_path),
        Commands::Replay(args) => {
            let config = BridgeConfig::load_from(&config_path)?;
            let level = if cli.verbose {
                "debug"
            } else {
                config.logging.level.as_str()
            };
            let _logging_guard =
                init_logging(&config.logging.directory, &config.logging.file, level)
                    .map_err(CliError::LoggingInit)?;

            tracing::info!(version = wwt_bridge::VERSION, "WWT Bridge starting");
            commands::replay::run(args, &config)
        }
    }
}
