//! Session registry: which recording or playback session owns which caller.
//!
//! A [`Registry`] maps [`CallerKey`]s to active [`Session`]s and carries
//! the global-override flag. It is owned by whatever unit of work sets it
//! up (usually one test) and shared by handle through [`SharedRegistry`];
//! there is no process-wide instance.
//!
//! Instead of inspecting live stack frames, callers bind themselves into
//! the current call chain with [`SharedRegistry::enter`]. The resolver in
//! [`resolve`] walks those bindings outward from the call site.

pub mod resolve;

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, ThreadId};

use uuid::Uuid;

use crate::cassette::recorder::Recorder;
use crate::cassette::replayer::Player;
use crate::errors::Result;

pub use resolve::{resolve, Intercept};

/// Identity of one caller instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallerId(Uuid);

impl CallerId {
    /// Generates a fresh random identity.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CallerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CallerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Type identity of a caller, compared by [`TypeId`] and displayed by
/// type name.
#[derive(Debug, Clone, Copy)]
pub struct CallerKind {
    id: TypeId,
    name: &'static str,
}

impl CallerKind {
    /// The kind of every `C`.
    #[must_use]
    pub fn of<C: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<C>(),
            name: std::any::type_name::<C>(),
        }
    }

    /// Type name, for logs only.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for CallerKind {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for CallerKind {}

impl Hash for CallerKind {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for CallerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Anything that can own interception: a client object, a service, a test.
pub trait Caller: 'static {
    /// Stable identity of this instance.
    fn caller_id(&self) -> CallerId;

    /// Concrete type of this instance, also through `dyn Caller`.
    fn caller_kind(&self) -> CallerKind {
        CallerKind::of::<Self>()
    }
}

/// One binding in the explicit call chain: an instance and its type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    /// Instance identity.
    pub id: CallerId,
    /// Concrete type of the instance.
    pub kind: CallerKind,
}

impl Frame {
    /// Builds the frame describing `caller`.
    pub fn of<C: Caller + ?Sized>(caller: &C) -> Self {
        Self {
            id: caller.caller_id(),
            kind: caller.caller_kind(),
        }
    }
}

/// Whose calls a session intercepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallerKey {
    /// One specific caller instance.
    Instance(CallerId),
    /// Every instance of a type.
    Kind(CallerKind),
    /// Registry-wide wildcard, only reachable through the override flag.
    Global,
}

impl CallerKey {
    /// Key matching exactly `caller`.
    pub fn instance<C: Caller + ?Sized>(caller: &C) -> Self {
        CallerKey::Instance(caller.caller_id())
    }

    /// Key matching every instance of `C`.
    #[must_use]
    pub fn kind<C: ?Sized + 'static>() -> Self {
        CallerKey::Kind(CallerKind::of::<C>())
    }

    /// Returns `true` for the wildcard key.
    #[must_use]
    pub fn is_global(&self) -> bool {
        matches!(self, CallerKey::Global)
    }
}

impl fmt::Display for CallerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallerKey::Instance(id) => write!(f, "instance {id}"),
            CallerKey::Kind(kind) => write!(f, "kind {kind}"),
            CallerKey::Global => f.write_str("global"),
        }
    }
}

/// What a registered session does with intercepted calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Forward to the real transport and record the exchange.
    Recording,
    /// Answer from a persisted chain without touching the network.
    Playback,
}

/// Session descriptor stored in the registry.
#[derive(Clone)]
pub enum Session {
    /// An active recorder.
    Recording(Recorder),
    /// An active player.
    Playback(Player),
}

impl Session {
    /// The session's mode.
    #[must_use]
    pub fn mode(&self) -> Mode {
        match self {
            Session::Recording(_) => Mode::Recording,
            Session::Playback(_) => Mode::Playback,
        }
    }

    fn same_as(&self, other: &Session) -> bool {
        match (self, other) {
            (Session::Recording(a), Session::Recording(b)) => a.ptr_eq(b),
            (Session::Playback(a), Session::Playback(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Session({:?})", self.mode())
    }
}

/// Table of active sessions plus the explicit call chains.
///
/// Each thread has its own chain of entered frames; a call only ever sees
/// the frames entered on the thread making it.
#[derive(Debug, Default)]
pub struct Registry {
    callers: HashMap<CallerKey, Session>,
    global: bool,
    chains: HashMap<ThreadId, Vec<(u64, Frame)>>,
    next_token: u64,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `session` under `key`, replacing any session already there.
    pub fn register(&mut self, key: CallerKey, session: Session) -> Option<Session> {
        log::debug!("registering {:?} session for {key}", session.mode());
        self.callers.insert(key, session)
    }

    /// Removes whatever session is registered under `key`.
    pub fn unregister(&mut self, key: &CallerKey) -> Option<Session> {
        let removed = self.callers.remove(key);
        if removed.is_some() {
            log::debug!("unregistered session for {key}");
        }
        removed
    }

    /// Removes the session under `key` only if it is `session` itself.
    pub(crate) fn unregister_if(&mut self, key: &CallerKey, session: &Session) -> bool {
        if self.callers.get(key).is_some_and(|current| current.same_as(session)) {
            self.unregister(key);
            true
        } else {
            false
        }
    }

    /// Session registered under `key`, if any.
    #[must_use]
    pub fn get(&self, key: &CallerKey) -> Option<&Session> {
        self.callers.get(key)
    }

    /// Returns `true` when no session is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.callers.is_empty()
    }

    /// Number of registered sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.callers.len()
    }

    /// Current value of the global-override flag.
    #[must_use]
    pub fn is_global(&self) -> bool {
        self.global
    }

    /// Sets the global-override flag and returns its previous value.
    pub fn set_global(&mut self, global: bool) -> bool {
        std::mem::replace(&mut self.global, global)
    }

    /// Frames entered on the current thread, oldest first.
    #[must_use]
    pub fn frames(&self) -> Vec<Frame> {
        self.chains
            .get(&thread::current().id())
            .map(|chain| chain.iter().map(|(_, frame)| *frame).collect())
            .unwrap_or_default()
    }

    fn push_frame(&mut self, thread: ThreadId, frame: Frame) -> u64 {
        let token = self.next_token;
        self.next_token += 1;
        self.chains.entry(thread).or_default().push((token, frame));
        token
    }

    fn pop_frame(&mut self, thread: ThreadId, token: u64) {
        if let Some(chain) = self.chains.get_mut(&thread) {
            chain.retain(|(entered, _)| *entered != token);
            if chain.is_empty() {
                self.chains.remove(&thread);
            }
        }
    }
}

/// Cloneable handle to a [`Registry`] owned by one unit of work.
#[derive(Debug, Clone, Default)]
pub struct SharedRegistry(Arc<Mutex<Registry>>);

impl SharedRegistry {
    /// Creates a handle to a fresh, empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the registry.
    ///
    /// # Errors
    ///
    /// Returns an error if a previous holder panicked.
    pub fn lock(&self) -> Result<MutexGuard<'_, Registry>> {
        Ok(self.0.lock()?)
    }

    /// Binds `caller` into the current thread's call chain until the guard
    /// drops.
    ///
    /// Calls made on this thread through an intercepting transport while
    /// the guard is alive can be attributed to `caller` by key. Guards may be
    /// dropped in any order; each removes only its own frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry lock is poisoned.
    pub fn enter<C: Caller + ?Sized>(&self, caller: &C) -> Result<FrameGuard> {
        let thread = thread::current().id();
        let token = self.lock()?.push_frame(thread, Frame::of(caller));
        Ok(FrameGuard {
            registry: self.clone(),
            thread,
            token,
        })
    }
}

/// Registers `session` under `key` and points the override flag at it.
///
/// Returns the override value seen before the change, which the session
/// restores when it stops.
pub(crate) fn activate(
    registry: &SharedRegistry,
    key: CallerKey,
    session: Session,
) -> Result<bool> {
    let mut registry = registry.lock()?;
    let mode = session.mode();
    registry.register(key, session);
    let previous = registry.set_global(key.is_global());
    log::info!(
        "{mode:?} session started for {key} (global override {previous} -> {})",
        key.is_global()
    );
    Ok(previous)
}

/// Unregisters `session` from `key` and restores the saved override value.
pub(crate) fn deactivate(
    registry: &SharedRegistry,
    key: CallerKey,
    session: &Session,
    saved_global: bool,
) -> Result<()> {
    let mut registry = registry.lock()?;
    if !registry.unregister_if(&key, session) {
        log::debug!("{key} was already re-registered by another session");
    }
    registry.set_global(saved_global);
    log::info!(
        "{:?} session stopped for {key} (global override restored to {saved_global})",
        session.mode()
    );
    Ok(())
}

/// Unbinds a frame entered with [`SharedRegistry::enter`] on drop.
#[must_use = "the frame is unbound as soon as the guard is dropped"]
pub struct FrameGuard {
    registry: SharedRegistry,
    thread: ThreadId,
    token: u64,
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        if let Ok(mut registry) = self.registry.lock() {
            registry.pop_frame(self.thread, self.token);
        }
    }
}
