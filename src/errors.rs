//! Error type shared by every part of the engine.

use std::path::PathBuf;

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Everything that can go wrong while recording, saving, loading or
/// replaying an interaction chain.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A response was recorded while no request was open.
    #[error("response recorded when no request was made")]
    NoOpenRequest,

    /// A playback response was requested before any request was issued.
    #[error("response requested during playback before a request was made")]
    NoPendingRequest,

    /// The playback chain has no step left to serve.
    #[error("playback can't handle more requests, this is the end of the chain")]
    ChainExhausted,

    /// The save target exists and is not a directory.
    #[error("{} already exists and is not a directory", .0.display())]
    NotADirectory(PathBuf),

    /// The inbound request does not match the recorded expectation.
    #[error("request mismatch at {step}: expected {expected}, got {actual}")]
    Mismatch {
        /// Identifier of the step that rejected the request.
        step: String,
        /// Method and URL recorded for the step.
        expected: String,
        /// Method and URL actually issued.
        actual: String,
    },

    /// A loaded chain is structurally broken.
    #[error("invalid chain: {0}")]
    InvalidChain(String),

    /// Filesystem failure while saving or loading.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The chain file could not be encoded or decoded.
    #[error("chain format error: {0}")]
    Format(#[from] serde_yaml::Error),

    /// Failure reported by the reqwest client.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Failure reported by any other transport.
    #[error("transport error: {0}")]
    Transport(String),

    /// A session or registry lock was poisoned by a panicking holder.
    #[error("lock poisoned: {0}")]
    Poisoned(String),
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Error::Poisoned(err.to_string())
    }
}
