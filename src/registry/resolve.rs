//! Caller resolution: decides which session, if any, owns an intercepted call.

use super::{CallerKey, Frame, Registry, Session};
use crate::cassette::recorder::Recorder;
use crate::cassette::replayer::Player;

/// Outcome of resolving one intercepted call.
#[derive(Debug, Clone)]
pub enum Intercept {
    /// No session applies; use the real transport unmodified.
    PassThrough,
    /// Record the exchange while forwarding it.
    Recording(Recorder),
    /// Serve the exchange from a persisted chain.
    Playback(Player),
}

impl From<Session> for Intercept {
    fn from(session: Session) -> Self {
        match session {
            Session::Recording(recorder) => Intercept::Recording(recorder),
            Session::Playback(player) => Intercept::Playback(player),
        }
    }
}

/// Resolves the session owning a call made at `call_site`.
///
/// With nothing registered the call passes through. With the global
/// override set the globally registered session wins outright and no
/// frames are inspected. Otherwise `call_site` and then the frames entered on
/// the calling thread, most recent first, are checked against the registered keys; the first
/// frame matching by instance or by type decides.
///
/// The returned value holds its own session handle and nothing borrowed
/// from the registry.
#[must_use]
pub fn resolve(registry: &Registry, call_site: &Frame) -> Intercept {
    if registry.is_empty() {
        return Intercept::PassThrough;
    }

    if registry.is_global() {
        return registry
            .get(&CallerKey::Global)
            .cloned()
            .map_or(Intercept::PassThrough, Into::into);
    }

    let frames = registry.frames();
    std::iter::once(call_site)
        .chain(frames.iter().rev())
        .find_map(|frame| lookup(registry, frame))
        .cloned()
        .map_or(Intercept::PassThrough, Into::into)
}

fn lookup<'a>(registry: &'a Registry, frame: &Frame) -> Option<&'a Session> {
    registry
        .get(&CallerKey::Instance(frame.id))
        .or_else(|| registry.get(&CallerKey::Kind(frame.kind)))
}
