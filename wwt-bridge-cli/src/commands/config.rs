//! Configuration management CLI commands.

use std::path::Path;

use clap::Subcommand;
use wwt_bridge::config::BridgeConfig;

use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Show the configuration file path
    Path,

    /// Print the effective configuration
    Show,

    /// Write a default configuration file if none exists
    Init,
}

/// Run a config subcommand against the file at `path`.
pub fn run(command: ConfigCommands, path: &Path) -> Result<(), CliError> {
    match command {
        ConfigCommands::Path => {
            println!("{}", path.display());
            Ok(())
        }
        ConfigCommands::Show => run_show(path),
        ConfigCommands::Init => run_init(path),
    }
}

fn run_show(path: &Path) -> Result<(), CliError> {
    let config = BridgeConfig::load_from(path)?;

    if !path.exists() {
        println!("# {} not found, showing defaults", path.display());
    }
    println!("[engine]");
    println!(
        "frame_interval_ms = {}",
        config.engine.frame_interval.as_millis()
    );
    println!();
    println!("[relay]");
    println!("channel_capacity = {}", config.relay.channel_capacity);
    println!();
    println!("[logging]");
    println!("directory = {}", config.logging.directory.display());
    println!("file = {}", config.logging.file);
    println!("level = {}", config.logging.level);
    println!();
    println!("[collections]");
    println!("preload = {}", config.collections.preload.join(", "));
    Ok(())
}

fn run_init(path: &Path) -> Result<(), CliError> {
    if path.exists() {
        println!("Config file already exists: {}", path.display());
        return Ok(());
    }
    BridgeConfig::ensure_exists(path)?;
    println!("Created {}", path.display());
    Ok(())
}
