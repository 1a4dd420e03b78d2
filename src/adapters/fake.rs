//! Scripted in-memory transport.

use std::collections::VecDeque;
use std::io::Cursor;

use crate::errors::{Error, Result};
use crate::ports::transport::{Body, Headers, HttpVersion, Request, Response, Transport};

/// A response queued on a [`FakeTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CannedResponse {
    /// Status code.
    pub status: u16,
    /// Reason phrase.
    pub reason: String,
    /// Protocol version.
    pub version: HttpVersion,
    /// Response headers.
    pub headers: Headers,
    /// Response body.
    pub body: Vec<u8>,
}

impl CannedResponse {
    /// An empty response with the given status line.
    pub fn new(status: u16, reason: impl Into<String>) -> Self {
        Self {
            status,
            reason: reason.into(),
            version: HttpVersion::default(),
            headers: Headers::new(),
            body: Vec::new(),
        }
    }

    /// A `200 OK` response carrying `body`.
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self::new(200, "OK").with_body(body)
    }

    /// Sets the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(name, value);
        self
    }

    fn into_response(self) -> Response {
        Response::new(self.status, self.reason)
            .with_version(self.version)
            .with_headers(self.headers)
            .with_body(Body::from_reader(Cursor::new(self.body)))
    }
}

/// Serves queued responses in order and keeps every request it was given.
///
/// Bodies are handed out as streams, so they behave like a live response
/// that can be read once.
#[derive(Debug, Default)]
pub struct FakeTransport {
    host: String,
    responses: VecDeque<CannedResponse>,
    issued: Vec<Request>,
    in_flight: bool,
}

impl FakeTransport {
    /// A transport for `host` with no queued responses.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }

    /// Queues `response` behind the ones already queued.
    #[must_use]
    pub fn respond(mut self, response: CannedResponse) -> Self {
        self.responses.push_back(response);
        self
    }

    /// Requests received so far, oldest first.
    #[must_use]
    pub fn issued(&self) -> &[Request] {
        &self.issued
    }

    /// Number of queued responses not yet served.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.responses.len()
    }
}

impl Transport for FakeTransport {
    fn host(&self) -> &str {
        &self.host
    }

    fn issue(&mut self, request: &Request) -> Result<()> {
        if self.in_flight {
            return Err(Error::Transport(format!(
                "{} issued while another request is in flight",
                request.describe()
            )));
        }
        self.issued.push(request.clone());
        self.in_flight = true;
        Ok(())
    }

    fn complete(&mut self) -> Result<Response> {
        if !std::mem::take(&mut self.in_flight) {
            return Err(Error::Transport("complete called before issue".into()));
        }
        let canned = self
            .responses
            .pop_front()
            .ok_or_else(|| Error::Transport(format!("no response queued on {}", self.host)))?;
        Ok(canned.into_response())
    }
}
