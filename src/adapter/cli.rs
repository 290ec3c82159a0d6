//! Command-line interface definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Settlement engine for flash prediction markets
#[derive(Parser, Debug)]
#[command(name = "flashsettle")]
#[command(version)]
pub struct Cli {
    /// Configuration file
    #[arg(
        short,
        long,
        global = true,
        env = "FLASHSETTLE_CONFIG",
        default_value = "config.toml"
    )]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the engine until interrupted
    Run,

    /// Validate the configuration file and exit
    CheckConfig,

    /// Write the development verifying key for a seed as hex
    Keygen(KeygenArgs),
}

#[derive(Args, Debug)]
pub struct KeygenArgs {
    /// Setup seed; defaults to `resolution.development_seed`
    #[arg(long)]
    pub seed: Option<u64>,

    /// Output file for the hex verifying key
    #[arg(short, long)]
    pub out: PathBuf,
}
