//! Command dispatch and handlers.

pub mod check;
pub mod show;

use std::path::Path;

use crate::cassette::config::ChainConfig;
use crate::cli::Cli;
use crate::cli::Command;

/// Dispatch a parsed command line to its handler.
///
/// # Errors
///
/// Returns an error string if the configuration cannot be loaded or the
/// selected command handler fails.
pub fn dispatch(cli: &Cli) -> Result<(), String> {
    let config = load_config(cli.config.as_deref())?;
    match &cli.command {
        Command::Show { dir, json } => show::run(dir, &config, *json),
        Command::Check { dir } => check::run(dir, &config),
    }
}

fn load_config(path: Option<&Path>) -> Result<ChainConfig, String> {
    match path {
        Some(path) => ChainConfig::load(path)
            .map_err(|err| format!("failed to load config {}: {err}", path.display())),
        None => Ok(ChainConfig::default()),
    }
}
