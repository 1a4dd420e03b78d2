//! Records intercepted exchanges into an interaction chain.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;

use super::config::ChainConfig;
use super::format::PersistedChain;
use super::step::{step_id, InteractionStep, PendingStep};
use super::StopGuard;
use crate::adapters::live::FsBodyStore;
use crate::errors::{Error, Result};
use crate::ports::body_store::BodyStore;
use crate::ports::transport::{Body, Request, Response};
use crate::registry::{self, CallerKey, Session, SharedRegistry};

#[derive(Debug, Default)]
struct RecorderState {
    steps: Vec<InteractionStep>,
    open: Option<PendingStep>,
    saved_global: Option<bool>,
}

/// Recording session.
///
/// While started, every call resolved to this recorder's caller key is
/// forwarded to the real transport and captured as an [`InteractionStep`].
/// Stopping keeps the captured steps, so a recorder can be stopped and
/// started again and keeps appending to the same chain until it is saved.
///
/// `Recorder` is a cheap handle; clones share the same chain.
#[derive(Clone)]
pub struct Recorder {
    key: CallerKey,
    state: Arc<Mutex<RecorderState>>,
}

impl Recorder {
    /// Creates a recorder for calls owned by `caller`.
    #[must_use]
    pub fn new(caller: CallerKey) -> Self {
        Self {
            key: caller,
            state: Arc::new(Mutex::new(RecorderState::default())),
        }
    }

    /// Creates a recorder that captures every call made through the
    /// registry it is started on.
    #[must_use]
    pub fn global() -> Self {
        Self::new(CallerKey::Global)
    }

    /// The key this recorder registers under.
    #[must_use]
    pub fn key(&self) -> CallerKey {
        self.key
    }

    /// Returns `true` if both handles share one chain.
    #[must_use]
    pub fn ptr_eq(&self, other: &Recorder) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }

    fn lock(&self) -> Result<MutexGuard<'_, RecorderState>> {
        Ok(self.state.lock()?)
    }

    /// Begins or resumes recording.
    ///
    /// Starting an already started recorder re-registers it and keeps the
    /// override value saved by the first start.
    ///
    /// # Errors
    ///
    /// Returns an error if a lock is poisoned.
    pub fn start(&self, registry: &SharedRegistry) -> Result<()> {
        let previous = registry::activate(registry, self.key, Session::Recording(self.clone()))?;
        let mut state = self.lock()?;
        state.saved_global.get_or_insert(previous);
        Ok(())
    }

    /// Stops recording. Captured steps are kept for [`Recorder::save`].
    ///
    /// Stopping a recorder that is not started does nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if a lock is poisoned.
    pub fn stop(&self, registry: &SharedRegistry) -> Result<()> {
        let Some(saved_global) = self.lock()?.saved_global.take() else {
            log::debug!("stop called on inactive recorder for {}", self.key);
            return Ok(());
        };
        registry::deactivate(
            registry,
            self.key,
            &Session::Recording(self.clone()),
            saved_global,
        )
    }

    /// Returns `true` between [`Recorder::start`] and [`Recorder::stop`].
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.lock().is_ok_and(|state| state.saved_global.is_some())
    }

    /// Runs `f` with the recorder started, stopping it afterwards even if
    /// `f` panics.
    ///
    /// # Errors
    ///
    /// Returns an error if the recorder cannot be started or stopped.
    pub fn recording<T>(&self, registry: &SharedRegistry, f: impl FnOnce() -> T) -> Result<T> {
        self.start(registry)?;
        let guard = StopGuard::new(|| self.stop(registry));
        let value = f();
        guard.finish()?;
        Ok(value)
    }

    /// Opens a step for a request about to be sent to `host`.
    ///
    /// Any step still waiting for its response is discarded.
    ///
    /// # Errors
    ///
    /// Returns an error if the recorder lock is poisoned.
    pub fn record_request(&self, host: &str, request: &Request) -> Result<()> {
        let mut state = self.lock()?;
        if let Some(abandoned) = state.open.replace(PendingStep::new(host, request)) {
            log::warn!(
                "discarding unanswered request {}",
                abandoned.request().describe(),
            );
        }
        log::debug!("recording request {} to {host}", request.describe());
        Ok(())
    }

    /// Completes the open step from `response`.
    ///
    /// The body is drained into the step and `response` gets an in-memory
    /// copy, so the caller still reads exactly what the server sent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoOpenRequest`] if no request is open, or an I/O
    /// error if the body cannot be read.
    pub fn record_response(&self, response: &mut Response) -> Result<()> {
        let mut state = self.lock()?;
        if state.open.is_none() {
            return Err(Error::NoOpenRequest);
        }
        let body = response.bytes()?;
        response.replace_body(Body::from_bytes(body.clone()));

        let open = state.open.take().ok_or(Error::NoOpenRequest)?;
        let step = open.complete(response, body);
        log::debug!(
            "recorded {} {} -> {} {}",
            step.request_method,
            step.request_url,
            step.response_status,
            step.response_reason
        );
        state.steps.push(step);
        Ok(())
    }

    /// Number of completed steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().map_or(0, |state| state.steps.len())
    }

    /// Returns `true` if no step has been completed yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies of the completed steps, in order.
    ///
    /// # Errors
    ///
    /// Returns an error if the recorder lock is poisoned.
    pub fn steps(&self) -> Result<Vec<InteractionStep>> {
        Ok(self.lock()?.steps.clone())
    }

    /// Saves the chain to `directory` with default settings and the
    /// filesystem body store.
    ///
    /// # Errors
    ///
    /// See [`Recorder::save_with`].
    pub fn save(&self, directory: &Path) -> Result<PathBuf> {
        self.save_with(directory, &FsBodyStore, &ChainConfig::default())
    }

    /// Saves the chain to `directory`, creating it if needed.
    ///
    /// Step `n` is saved as `step_<n>` and points at `step_<n+1>`; the last
    /// step ends the chain. Returns the path of the chain file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotADirectory`] if `directory` exists as something
    /// else, or a storage error if writing fails.
    pub fn save_with(
        &self,
        directory: &Path,
        store: &dyn BodyStore,
        config: &ChainConfig,
    ) -> Result<PathBuf> {
        if directory.exists() && !directory.is_dir() {
            return Err(Error::NotADirectory(directory.to_path_buf()));
        }
        std::fs::create_dir_all(directory)?;

        let steps = self.steps()?;
        let records = steps
            .iter()
            .enumerate()
            .map(|(n, step)| {
                let next = (n + 1 < steps.len()).then(|| step_id(n + 1));
                step.to_record(n, next, directory, store, config)
            })
            .collect::<Result<Vec<_>>>()?;

        let name = config.name.clone().unwrap_or_else(|| {
            directory
                .file_name()
                .map_or_else(|| "chain".to_string(), |n| n.to_string_lossy().into_owned())
        });
        let chain = PersistedChain {
            name,
            recorded_at: Utc::now(),
            steps: records,
        };
        let path = chain.write(directory, config)?;
        log::info!("saved {} steps to {}", chain.steps.len(), path.display());
        Ok(path)
    }
}

impl fmt::Debug for Recorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recorder").field("key", &self.key).field("steps", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cassette::format::StoredBody;

    fn exchange(recorder: &Recorder, request: &Request, status: u16, body: &'static [u8]) {
        recorder.record_request("www.example.com", request).unwrap();
        let mut response = Response::new(status, "OK").with_body(Body::from_reader(body));
        recorder.record_response(&mut response).unwrap();
        assert_eq!(
            response.bytes().unwrap(),
            body,
            "caller must still see the body"
        );
    }

    #[test]
    fn record_response_without_request_fails() {
        let recorder = Recorder::global();
        let mut response = Response::new(200, "OK");
        assert!(matches!(
            recorder.record_response(&mut response),
            Err(Error::NoOpenRequest),
        ));
    }

    #[test]
    fn new_request_discards_open_step() {
        let recorder = Recorder::global();
        recorder.record_request("h", &Request::get("/first")).unwrap();
        recorder.record_request("h", &Request::get("/second")).unwrap();
        let mut response = Response::new(200, "OK");
        recorder.record_response(&mut response).unwrap();

        let steps = recorder.steps().unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].request_url, "/second");
    }

    #[test]
    fn start_and_stop_restore_override() {
        let registry = SharedRegistry::new();
        let recorder = Recorder::global();

        recorder.start(&registry).unwrap();
        assert!(recorder.is_active());
        assert!(registry.lock().unwrap().is_global());

        recorder.stop(&registry).unwrap();
        assert!(!recorder.is_active());
        assert!(!registry.lock().unwrap().is_global());
        assert!(registry.lock().unwrap().is_empty());
    }

    #[test]
    fn double_start_keeps_first_saved_override() {
        let registry = SharedRegistry::new();
        let recorder = Recorder::global();
        recorder.start(&registry).unwrap();
        recorder.start(&registry).unwrap();
        recorder.stop(&registry).unwrap();
        assert!(!registry.lock().unwrap().is_global());
    }

    #[test]
    fn stop_keeps_recorded_steps() {
        let registry = SharedRegistry::new();
        let recorder = Recorder::global();
        for url in ["/a", "/b"] {
            recorder
                .recording(&registry, || exchange(&recorder, &Request::get(url), 200, b"ok"))
                .unwrap();
        }
        assert_eq!(recorder.len(), 2);
    }

    #[test]
    fn recording_stops_after_panic() {
        let registry = SharedRegistry::new();
        let recorder = Recorder::global();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = recorder.recording(&registry, || panic!("boom"));
        }));
        assert!(result.is_err());
        assert!(!recorder.is_active());
        assert!(registry.lock().unwrap().is_empty());
    }

    #[test]
    fn save_rejects_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("occupied");
        std::fs::write(&target, "not a directory").unwrap();

        let err = Recorder::global().save(&target).unwrap_err();
        assert!(matches!(err, Error::NotADirectory(path) if path == target));
    }

    #[test]
    fn save_links_steps_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("google_test");
        let recorder = Recorder::global();
        exchange(&recorder, &Request::get("/"), 200, b"hello");
        exchange(&recorder, &Request::post("/", "x=1"), 201, b"created");

        let path = recorder.save(&target).unwrap();
        assert_eq!(path, target.join("chain.yaml"));
        assert!(target.join("step_1_request.body").is_file());

        let chain = PersistedChain::read(&target, &ChainConfig::default()).unwrap();
        assert_eq!(chain.name, "google_test");
        assert_eq!(chain.steps.len(), 2);
        assert_eq!(chain.steps[0].next.as_deref(), Some("step_1"));
        assert_eq!(chain.steps[1].next, None);
        assert_eq!(chain.steps[0].request.body, None);
        assert_eq!(
            chain.steps[1].response.body,
            Some(StoredBody::File("step_1_response.body".into()))
        );
    }

    #[test]
    fn save_empty_recorder_writes_empty_chain() {
        let dir = tempfile::tempdir().unwrap();
        let config = ChainConfig {
            name: Some("empty".into()),
            ..ChainConfig::default()
        };
        Recorder::global().save_with(dir.path(), &FsBodyStore, &config).unwrap();

        let chain = PersistedChain::read(dir.path(), &config).unwrap();
        assert_eq!(chain.name, "empty");
        assert!(chain.steps.is_empty());
    }
}
