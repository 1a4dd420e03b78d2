//! Replays a persisted chain step by step.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::config::ChainConfig;
use super::format::{PersistedChain, StepRecord, StoredBody};
use super::StopGuard;
use crate::adapters::live::FsBodyStore;
use crate::errors::{Error, Result};
use crate::ports::body_store::BodyStore;
use crate::ports::transport::{Body, Request, Response};
use crate::registry::{self, CallerKey, Session, SharedRegistry};

/// One loaded step, able to answer the request it was recorded for.
pub struct PlaybackStep {
    record: StepRecord,
    directory: PathBuf,
    store: Arc<dyn BodyStore>,
}

impl PlaybackStep {
    /// Step identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.record.id
    }

    /// The persisted record behind this step.
    #[must_use]
    pub fn record(&self) -> &StepRecord {
        &self.record
    }

    /// Answers `request` with the recorded response.
    ///
    /// Only method and URL are compared. Returns the identifier of the next
    /// step (`None` at the end of the chain) together with the response.
    /// Bodies kept in the body store are loaded when the response is read.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Mismatch`] if method or URL differ from the recording.
    pub fn handle(&self, request: &Request) -> Result<(Option<String>, Response)> {
        let expected = &self.record.request;
        if request.method != expected.method || request.url != expected.url {
            return Err(Error::Mismatch {
                step: self.record.id.clone(),
                expected: format!("{} {}", expected.method, expected.url),
                actual: request.describe(),
            });
        }
        Ok((self.record.next.clone(), self.response()))
    }

    fn response(&self) -> Response {
        let recorded = &self.record.response;
        let body = match &recorded.body {
            None => Body::empty(),
            Some(StoredBody::Inline(text)) => Body::from_bytes(text.as_bytes()),
            Some(StoredBody::File(name)) => {
                Body::deferred(
                    Arc::clone(&self.store),
                    self.directory.clone(),
                    name.clone(),
                )
            }
        };
        Response::new(recorded.status, recorded.reason.clone())
            .with_version(recorded.version)
            .with_headers(recorded.headers.clone())
            .with_body(body)
    }
}

/// A validated chain indexed by step identifier.
pub struct LoadedChain {
    name: String,
    entry: Option<String>,
    steps: HashMap<String, PlaybackStep>,
}

impl LoadedChain {
    /// Reads and validates the chain stored in `directory`.
    ///
    /// # Errors
    ///
    /// Returns an error if the chain file cannot be read, parsed or
    /// validated.
    pub fn load(
        directory: &Path,
        config: &ChainConfig,
        store: Arc<dyn BodyStore>,
    ) -> Result<Self> {
        let chain = PersistedChain::read(directory, config)?;
        chain.validate()?;
        let entry = chain.entry().map(|step| step.id.clone());
        let steps = chain
            .steps
            .into_iter()
            .map(|record| {
                let step = PlaybackStep {
                    record,
                    directory: directory.to_path_buf(),
                    store: Arc::clone(&store),
                };
                (step.id().to_string(), step)
            })
            .collect();
        Ok(Self {
            name: chain.name,
            entry,
            steps,
        })
    }

    /// Chain name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Identifier of the first step, if the chain has any.
    #[must_use]
    pub fn entry(&self) -> Option<&str> {
        self.entry.as_deref()
    }

    /// Looks up a step by identifier.
    #[must_use]
    pub fn step(&self, id: &str) -> Option<&PlaybackStep> {
        self.steps.get(id)
    }

    /// Number of steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns `true` for a chain without steps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

struct PlayerState {
    directory: PathBuf,
    config: ChainConfig,
    store: Arc<dyn BodyStore>,
    chain: Option<LoadedChain>,
    current: Option<String>,
    pending: Option<Request>,
    saved_global: Option<bool>,
}

/// Playback session.
///
/// The chain is loaded on the first [`Player::start`] and the cursor then
/// only moves forward: each matching request advances it by one step until
/// the chain is exhausted. Stopping and starting again resumes where the
/// cursor stands.
///
/// `Player` is a cheap handle; clones share one cursor.
#[derive(Clone)]
pub struct Player {
    key: CallerKey,
    state: Arc<Mutex<PlayerState>>,
}

impl Player {
    /// Creates a player for calls owned by `caller`, replaying the chain
    /// saved in `directory`.
    pub fn new(directory: impl Into<PathBuf>, caller: CallerKey) -> Self {
        let state = PlayerState {
            directory: directory.into(),
            config: ChainConfig::default(),
            store: Arc::new(FsBodyStore),
            chain: None,
            current: None,
            pending: None,
            saved_global: None,
        };
        Self {
            key: caller,
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Creates a player that answers every call made through the registry
    /// it is started on.
    pub fn global(directory: impl Into<PathBuf>) -> Self {
        Self::new(directory, CallerKey::Global)
    }

    /// Uses `config` to locate the chain file.
    #[must_use]
    pub fn with_config(self, config: ChainConfig) -> Self {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .config = config;
        self
    }

    /// Loads body blobs through `store` instead of the filesystem.
    #[must_use]
    pub fn with_store(self, store: Arc<dyn BodyStore>) -> Self {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .store = store;
        self
    }

    /// The key this player registers under.
    #[must_use]
    pub fn key(&self) -> CallerKey {
        self.key
    }

    /// Returns `true` if both handles share one cursor.
    #[must_use]
    pub fn ptr_eq(&self, other: &Player) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }

    fn lock(&self) -> Result<MutexGuard<'_, PlayerState>> {
        Ok(self.state.lock()?)
    }

    /// Loads the chain if needed and starts answering intercepted calls.
    ///
    /// # Errors
    ///
    /// Returns an error if the chain cannot be loaded or a lock is poisoned.
    pub fn start(&self, registry: &SharedRegistry) -> Result<()> {
        {
            let mut state = self.lock()?;
            if state.chain.is_none() {
                let chain = LoadedChain::load(
                    &state.directory,
                    &state.config,
                    Arc::clone(&state.store),
                )?;
                log::info!(
                    "loaded chain {} ({} steps) from {}",
                    chain.name(),
                    chain.len(),
                    state.directory.display()
                );
                state.current = chain.entry().map(str::to_string);
                state.chain = Some(chain);
            }
        }
        let previous = registry::activate(registry, self.key, Session::Playback(self.clone()))?;
        self.lock()?.saved_global.get_or_insert(previous);
        Ok(())
    }

    /// Stops answering intercepted calls. The cursor is kept.
    ///
    /// Stopping a player that is not started does nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if a lock is poisoned.
    pub fn stop(&self, registry: &SharedRegistry) -> Result<()> {
        let Some(saved_global) = self.lock()?.saved_global.take() else {
            log::debug!("stop called on inactive player for {}", self.key);
            return Ok(());
        };
        registry::deactivate(
            registry,
            self.key,
            &Session::Playback(self.clone()),
            saved_global,
        )
    }

    /// Returns `true` between [`Player::start`] and [`Player::stop`].
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.lock().is_ok_and(|state| state.saved_global.is_some())
    }

    /// Runs `f` with the player started, stopping it afterwards even if `f`
    /// panics.
    ///
    /// # Errors
    ///
    /// Returns an error if the player cannot be started or stopped.
    pub fn playing<T>(&self, registry: &SharedRegistry, f: impl FnOnce() -> T) -> Result<T> {
        self.start(registry)?;
        let guard = StopGuard::new(|| self.stop(registry));
        let value = f();
        guard.finish()?;
        Ok(value)
    }

    /// Holds `request` until the matching [`Player::receive_response`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChainExhausted`] once every step has been served.
    pub fn issue_request(&self, request: &Request) -> Result<()> {
        let mut state = self.lock()?;
        if state.current.is_none() {
            return Err(Error::ChainExhausted);
        }
        log::debug!("playback request {}", request.describe());
        state.pending = Some(request.clone());
        Ok(())
    }

    /// Answers the held request from the current step and advances.
    ///
    /// On a mismatch the cursor stays where it is and the held request is
    /// dropped: calling this again without a new [`Player::issue_request`]
    /// returns [`Error::NoPendingRequest`]. Re-issue the request to retry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChainExhausted`] with no current step,
    /// [`Error::NoPendingRequest`] if nothing was issued since the last
    /// response, or [`Error::Mismatch`] if the request does not match.
    pub fn receive_response(&self) -> Result<Response> {
        let mut state = self.lock()?;
        let current = state.current.clone().ok_or(Error::ChainExhausted)?;
        let request = state.pending.take().ok_or(Error::NoPendingRequest)?;

        let step = state
            .chain
            .as_ref()
            .and_then(|chain| chain.step(&current))
            .ok_or_else(|| Error::InvalidChain(format!("current step {current} is not loaded")))?;

        let (next, response) = step.handle(&request).inspect_err(|err| {
            log::warn!("playback diverged: {err}");
        })?;
        log::debug!(
            "{current} answered {} with {}",
            request.describe(),
            response.status
        );
        state.current = next;
        Ok(response)
    }

    /// Identifier of the step that will answer the next request.
    #[must_use]
    pub fn current_step(&self) -> Option<String> {
        self.lock().ok().and_then(|state| state.current.clone())
    }

    /// Returns `true` once a loaded chain has no step left to serve.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.lock()
            .is_ok_and(|state| state.chain.is_some() && state.current.is_none())
    }
}

impl fmt::Debug for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Player")
            .field("key", &self.key)
            .field("current", &self.current_step())
            .finish()
    }
}
