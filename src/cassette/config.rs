//! Chain configuration: where the chain file lives and which bodies are inlined.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::Result;

/// Default file name of the persisted chain inside a recording directory.
pub const DEFAULT_CHAIN_FILE: &str = "chain.yaml";

/// Settings shared by saving and loading a chain.
///
/// Every field has a default, so a YAML file only needs the keys it
/// changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// File name of the chain inside the recording directory.
    pub chain_file: String,
    /// Largest body, in bytes, kept inline in the chain file. Larger or
    /// non-UTF-8 bodies are written to the body store.
    pub inline_body_limit: usize,
    /// Chain name; defaults to the recording directory's name.
    pub name: Option<String>,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            chain_file: DEFAULT_CHAIN_FILE.to_string(),
            inline_body_limit: 0,
            name: None,
        }
    }
}

impl ChainConfig {
    /// Loads a config from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&content)?)
    }

    /// Full path of the chain file inside `directory`.
    #[must_use]
    pub fn chain_path(&self, directory: &Path) -> PathBuf {
        directory.join(&self.chain_file)
    }

    /// Returns `Some(text)` when `body` is small enough and textual enough
    /// to live inside the chain file.
    #[must_use]
    pub fn inline_text<'a>(&self, body: &'a [u8]) -> Option<&'a str> {
        if body.len() > self.inline_body_limit {
            return None;
        }
        std::str::from_utf8(body).ok()
    }
}
