//! `reel check` command.

use std::path::Path;

use crate::adapters::live::FsBodyStore;
use crate::cassette::config::ChainConfig;
use crate::cassette::format::PersistedChain;

/// Execute the `check` command.
///
/// # Errors
///
/// Returns an error string if the chain cannot be read, fails validation,
/// or references body blobs that are missing from `dir`.
pub fn run(dir: &Path, config: &ChainConfig) -> Result<(), String> {
    let summary = check(dir, config)?;
    println!("{summary}");
    Ok(())
}

/// Checks the chain in `dir` and returns a one-line summary.
///
/// # Errors
///
/// See [`run`].
pub fn check(dir: &Path, config: &ChainConfig) -> Result<String, String> {
    let chain = PersistedChain::read(dir, config).map_err(|err| err.to_string())?;
    chain.validate().map_err(|err| err.to_string())?;

    let missing = chain.missing_blobs(dir, &FsBodyStore);
    if !missing.is_empty() {
        return Err(format!(
            "chain {} is missing body blobs: {}",
            chain.name,
            missing.join(", "),
        ));
    }
    Ok(format!("chain {} OK: {} steps", chain.name, chain.steps.len()))
}
