//! Decorator transport that hands each call to the session owning it.

use crate::errors::Result;
use crate::ports::transport::{Request, Response, Transport};
use crate::registry::{resolve, Caller, CallerId, Frame, Intercept, SharedRegistry};

/// Wraps a real transport and consults a [`SharedRegistry`] on every call.
///
/// The wrapper is a [`Caller`] itself and forms the innermost frame of each
/// call it makes. Depending on the resolved session a call is recorded while
/// forwarded, answered from a chain without touching `inner`, or forwarded
/// unmodified.
pub struct InterceptingTransport<T> {
    inner: T,
    registry: SharedRegistry,
    id: CallerId,
}

impl<T: Transport + 'static> InterceptingTransport<T> {
    /// Wraps `inner`, resolving sessions through `registry`.
    pub fn new(inner: T, registry: SharedRegistry) -> Self {
        Self {
            inner,
            registry,
            id: CallerId::new(),
        }
    }

    /// The wrapped transport.
    pub fn inner(&self) -> &T {
        &self.inner
    }

    /// Unwraps the real transport.
    pub fn into_inner(self) -> T {
        self.inner
    }

    fn intercept(&self) -> Result<Intercept> {
        let registry = self.registry.lock()?;
        Ok(resolve(&registry, &Frame::of(self)))
    }
}

impl<T: 'static> Caller for InterceptingTransport<T> {
    fn caller_id(&self) -> CallerId {
        self.id
    }
}

impl<T: Transport + 'static> Transport for InterceptingTransport<T> {
    fn host(&self) -> &str {
        self.inner.host()
    }

    fn issue(&mut self, request: &Request) -> Result<()> {
        match self.intercept()? {
            Intercept::Recording(recorder) => {
                log::debug!("recording {} on {}", request.describe(), self.inner.host());
                recorder.record_request(self.inner.host(), request)?;
                self.inner.issue(request)
            }
            Intercept::Playback(player) => {
                log::debug!("playing back {}", request.describe());
                player.issue_request(request)
            }
            Intercept::PassThrough => self.inner.issue(request),
        }
    }

    fn complete(&mut self) -> Result<Response> {
        match self.intercept()? {
            Intercept::Recording(recorder) => {
                let mut response = self.inner.complete()?;
                recorder.record_response(&mut response)?;
                Ok(response)
            }
            Intercept::Playback(player) => player.receive_response(),
            Intercept::PassThrough => self.inner.complete(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::fake::{CannedResponse, FakeTransport};
    use crate::cassette::recorder::Recorder;
    use crate::errors::Error;
    use crate::registry::CallerKey;

    fn fake() -> FakeTransport {
        FakeTransport::new("www.example.com")
            .respond(CannedResponse::ok("hello"))
            .respond(CannedResponse::new(201, "Created").with_body("created"))
    }

    #[test]
    fn passes_through_without_sessions() {
        let registry = SharedRegistry::new();
        let mut transport = InterceptingTransport::new(fake(), registry);
        let mut response = transport.send(&Request::get("/")).unwrap();
        assert_eq!(response.text().unwrap(), "hello");
        assert_eq!(transport.inner().issued().len(), 1);
    }

    #[test]
    fn records_while_forwarding() {
        let registry = SharedRegistry::new();
        let recorder = Recorder::global();
        let mut transport = InterceptingTransport::new(fake(), registry.clone());

        recorder.start(&registry).unwrap();
        let mut response = transport.send(&Request::get("/")).unwrap();
        recorder.stop(&registry).unwrap();

        assert_eq!(response.text().unwrap(), "hello");
        let steps = recorder.steps().unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].host, "www.example.com");
        assert_eq!(steps[0].response_body.as_deref(), Some(&b"hello"[..]));
        assert_eq!(transport.inner().issued().len(), 1);
    }

    #[test]
    fn instance_key_selects_this_transport_only() {
        let registry = SharedRegistry::new();
        let mut watched = InterceptingTransport::new(fake(), registry.clone());
        let mut other = InterceptingTransport::new(fake(), registry.clone());
        let recorder = Recorder::new(CallerKey::instance(&watched));

        recorder.start(&registry).unwrap();
        watched.send(&Request::get("/")).unwrap();
        other.send(&Request::get("/")).unwrap();
        recorder.stop(&registry).unwrap();

        assert_eq!(recorder.len(), 1);
    }

    #[test]
    fn complete_without_issue_is_a_transport_error() {
        let registry = SharedRegistry::new();
        let mut transport = InterceptingTransport::new(fake(), registry);
        assert!(matches!(transport.complete(), Err(Error::Transport(_))));
    }
}
