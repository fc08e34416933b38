//! Command-line interface and config loading.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use cb_domain::config::Config;

#[derive(Parser)]
#[command(name = "chatterbox", about = "Real-time full-duplex voice conversation server")]
pub struct Cli {
    /// Path to the TOML config file. Falls back to ./chatterbox.toml if
    /// it exists, else built-in defaults.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the server (default).
    Serve,
    /// Config inspection helpers.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print the version.
    Version,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Validate the config and report every issue.
    Validate,
    /// Print the effective config as TOML.
    Show,
}

/// Resolve and parse the config file.
pub fn load_config(cli_path: Option<&PathBuf>) -> cb_domain::Result<Config> {
    let path = cli_path.cloned().or_else(|| {
        let default = PathBuf::from("chatterbox.toml");
        default.exists().then_some(default)
    });
    Config::load(path.as_deref())
}
