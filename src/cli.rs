//! CLI argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Top-level CLI parser for `reel`.
#[derive(Debug, Parser)]
#[command(name = "reel", version, about = "Inspect recorded HTTP interaction chains")]
pub struct Cli {
    /// Chain configuration file (YAML).
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// The command to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// Supported top-level subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the steps of a recorded chain.
    Show {
        /// Recording directory.
        dir: PathBuf,
        /// Print the chain as JSON instead of a summary.
        #[arg(long)]
        json: bool,
    },
    /// Validate a chain and confirm every body blob it references exists.
    Check {
        /// Recording directory.
        dir: PathBuf,
    },
}
