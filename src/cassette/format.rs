//! Persisted chain data structures.
//!
//! A recording directory holds one YAML chain file plus any body blobs the
//! chain refers to by name.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::config::ChainConfig;
use crate::errors::{Error, Result};
use crate::ports::body_store::BodyStore;
use crate::ports::transport::{Headers, HttpVersion};

/// Where a body lives: inline in the chain file or in a named blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum StoredBody {
    /// Body text kept in the chain file.
    Inline(String),
    /// Name of a blob in the body store.
    File(String),
}

impl StoredBody {
    /// Blob name, for bodies kept in the body store.
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        match self {
            StoredBody::File(name) => Some(name),
            StoredBody::Inline(_) => None,
        }
    }
}

/// What a step expects the replayed request to look like.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedRequest {
    /// Request method.
    pub method: String,
    /// Request URL.
    pub url: String,
    /// Request headers, kept for reference only.
    #[serde(default)]
    pub headers: Headers,
    /// Request body, kept for reference only.
    pub body: Option<StoredBody>,
}

/// The canned response a step answers with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseRecord {
    /// Status code.
    pub status: u16,
    /// Reason phrase.
    pub reason: String,
    /// Protocol version.
    #[serde(default)]
    pub version: HttpVersion,
    /// Response headers.
    #[serde(default)]
    pub headers: Headers,
    /// Response body.
    pub body: Option<StoredBody>,
}

/// One step of a persisted chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    /// Step identifier, e.g. `step_0`.
    pub id: String,
    /// Host the exchange was recorded against.
    #[serde(default)]
    pub host: String,
    /// Recorded request.
    pub request: ExpectedRequest,
    /// Recorded response.
    pub response: ResponseRecord,
    /// Identifier of the following step; `None` ends the chain.
    pub next: Option<String>,
}

/// A saved interaction chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedChain {
    /// Human-readable name.
    pub name: String,
    /// When the chain was saved.
    pub recorded_at: DateTime<Utc>,
    /// Steps in recording order; the first one is the entry step.
    pub steps: Vec<StepRecord>,
}

impl PersistedChain {
    /// Reads the chain file from `directory`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn read(directory: &Path, config: &ChainConfig) -> Result<Self> {
        let path = config.chain_path(directory);
        log::debug!("reading chain from {}", path.display());
        let content = std::fs::read_to_string(&path)?;
        Ok(serde_yaml::from_str(&content)?)
    }

    /// Writes the chain file into `directory`, returning its path.
    ///
    /// # Errors
    ///
    /// Returns an error if the chain cannot be serialized or written.
    pub fn write(&self, directory: &Path, config: &ChainConfig) -> Result<PathBuf> {
        let path = config.chain_path(directory);
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(&path, yaml)?;
        Ok(path)
    }

    /// The step playback starts from.
    #[must_use]
    pub fn entry(&self) -> Option<&StepRecord> {
        self.steps.first()
    }

    /// Checks that step ids are unique and every `next` names a known step.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidChain`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        let mut ids = HashSet::new();
        for step in &self.steps {
            if !ids.insert(step.id.as_str()) {
                return Err(Error::InvalidChain(format!("duplicate step id {}", step.id)));
            }
        }
        for step in &self.steps {
            if let Some(next) = &step.next {
                if !ids.contains(next.as_str()) {
                    return Err(Error::InvalidChain(format!(
                        "{} points to unknown step {next}",
                        step.id
                    )));
                }
            }
        }
        Ok(())
    }

    /// Blob names referenced by the chain but absent from `store`.
    #[must_use]
    pub fn missing_blobs(&self, directory: &Path, store: &dyn BodyStore) -> Vec<String> {
        self.steps
            .iter()
            .flat_map(|step| [step.request.body.as_ref(), step.response.body.as_ref()])
            .flatten()
            .filter_map(StoredBody::file_name)
            .filter(|name| !store.contains(name, directory))
            .map(str::to_string)
            .collect()
    }
}
