//! Transport port: the two-call shape of the HTTP client being wrapped.
//!
//! A transport issues one request, then completes it into a response
//! whose body is a one-shot reader. The engine only needs that much from
//! the real client, which keeps live, fake and intercepting
//! implementations interchangeable.

use std::fmt;
use std::io::{self, Cursor, Read};
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::body_store::BodyStore;
use crate::errors::Result;

/// A header multimap that keeps insertion order but compares without it.
#[derive(Debug, Clone, Default, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    /// Creates an empty header list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a header, keeping any earlier value with the same name.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    /// Returns the first value recorded for `name`, compared case-insensitively.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.iter().find(|(n, _)| n.eq_ignore_ascii_case(name)).map(|(_, v)| v.as_str())
    }

    /// Iterates over `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Number of header entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` when no headers are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn sorted(&self) -> Vec<&(String, String)> {
        let mut pairs: Vec<_> = self.0.iter().collect();
        pairs.sort();
        pairs
    }
}

impl PartialEq for Headers {
    fn eq(&self, other: &Self) -> bool {
        self.0.len() == other.0.len() && self.sorted() == other.sorted()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Protocol version reported by a response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum HttpVersion {
    /// HTTP/0.9
    #[serde(rename = "HTTP/0.9")]
    Http09,
    /// HTTP/1.0
    #[serde(rename = "HTTP/1.0")]
    Http10,
    /// HTTP/1.1
    #[default]
    #[serde(rename = "HTTP/1.1")]
    Http11,
    /// HTTP/2
    #[serde(rename = "HTTP/2.0")]
    H2,
    /// HTTP/3
    #[serde(rename = "HTTP/3.0")]
    H3,
}

impl fmt::Display for HttpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            HttpVersion::Http09 => "HTTP/0.9",
            HttpVersion::Http10 => "HTTP/1.0",
            HttpVersion::Http11 => "HTTP/1.1",
            HttpVersion::H2 => "HTTP/2.0",
            HttpVersion::H3 => "HTTP/3.0",
        };
        f.write_str(text)
    }
}

/// An outbound request as handed to [`Transport::issue`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Request method, e.g. `GET`.
    pub method: String,
    /// Request target, usually a path relative to the transport's host.
    pub url: String,
    /// Optional request body.
    pub body: Option<Vec<u8>>,
    /// Request headers.
    pub headers: Headers,
}

impl Request {
    /// Creates a body-less request with no headers.
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            body: None,
            headers: Headers::new(),
        }
    }

    /// Shorthand for a `GET` request.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new("GET", url)
    }

    /// Shorthand for a `POST` request carrying `body`.
    pub fn post(url: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self::new("POST", url).with_body(body)
    }

    /// Sets the request body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Appends a request header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(name, value);
        self
    }

    /// `METHOD url`, as used in logs and mismatch reports.
    #[must_use]
    pub fn describe(&self) -> String {
        format!("{} {}", self.method, self.url)
    }
}

/// A body stored by a [`BodyStore`] that is only read when first needed.
struct DeferredBlob {
    store: Arc<dyn BodyStore>,
    directory: PathBuf,
    name: String,
}

enum BodySource {
    Bytes(Cursor<Vec<u8>>),
    Stream(Box<dyn Read + Send>),
    Deferred(DeferredBlob),
}

/// One-shot readable response body.
///
/// The source can be swapped after the fact with [`Response::replace_body`],
/// which is what lets the recorder drain a live body and hand the caller an
/// identical in-memory copy.
pub struct Body {
    source: BodySource,
}

impl Body {
    /// A body with no content.
    #[must_use]
    pub fn empty() -> Self {
        Self::from_bytes(Vec::new())
    }

    /// A body backed by an in-memory buffer.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            source: BodySource::Bytes(Cursor::new(bytes.into())),
        }
    }

    /// A body streamed from an arbitrary reader, e.g. a live socket.
    pub fn from_reader(reader: impl Read + Send + 'static) -> Self {
        Self {
            source: BodySource::Stream(Box::new(reader)),
        }
    }

    /// A body loaded from `store` on first read.
    pub fn deferred(
        store: Arc<dyn BodyStore>,
        directory: impl Into<PathBuf>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            source: BodySource::Deferred(DeferredBlob {
                store,
                directory: directory.into(),
                name: name.into(),
            }),
        }
    }

    /// Returns `true` while the content still sits in the body store.
    #[must_use]
    pub fn is_deferred(&self) -> bool {
        matches!(self.source, BodySource::Deferred(_))
    }

    /// Reads everything that is left in the body.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying reader or body store fails.
    pub fn read_all(&mut self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.read_to_end(&mut buf)?;
        Ok(buf)
    }
}

impl Default for Body {
    fn default() -> Self {
        Self::empty()
    }
}

impl Read for Body {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if let BodySource::Deferred(blob) = &self.source {
            log::debug!(
                "loading deferred body {} from {}",
                blob.name,
                blob.directory.display(),
            );
            let content = blob.store.load(&blob.name, &blob.directory)?;
            self.source = BodySource::Bytes(Cursor::new(content));
        }
        match &mut self.source {
            BodySource::Bytes(cursor) => cursor.read(buf),
            BodySource::Stream(reader) => reader.read(buf),
            // materialized above
            BodySource::Deferred(_) => Ok(0),
        }
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            BodySource::Bytes(cursor) => f
                .debug_struct("Body")
                .field("len", &cursor.get_ref().len())
                .field("position", &cursor.position())
                .finish(),
            BodySource::Stream(_) => f.write_str("Body(<stream>)"),
            BodySource::Deferred(blob) => write!(f, "Body(<deferred {}>)", blob.name),
        }
    }
}

/// A response produced by [`Transport::complete`].
#[derive(Debug)]
pub struct Response {
    /// Status code.
    pub status: u16,
    /// Reason phrase, e.g. `OK`.
    pub reason: String,
    /// Protocol version.
    pub version: HttpVersion,
    /// Response headers.
    pub headers: Headers,
    body: Body,
}

impl Response {
    /// Creates an HTTP/1.1 response with no headers and an empty body.
    pub fn new(status: u16, reason: impl Into<String>) -> Self {
        Self {
            status,
            reason: reason.into(),
            version: HttpVersion::default(),
            headers: Headers::new(),
            body: Body::empty(),
        }
    }

    /// Sets the protocol version.
    #[must_use]
    pub fn with_version(mut self, version: HttpVersion) -> Self {
        self.version = version;
        self
    }

    /// Replaces the header list.
    #[must_use]
    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    /// Sets the body.
    #[must_use]
    pub fn with_body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }

    /// First value of header `name`, compared case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Mutable access to the body for streaming reads.
    pub fn body_mut(&mut self) -> &mut Body {
        &mut self.body
    }

    /// Swaps in a new body, returning the previous one.
    pub fn replace_body(&mut self, body: Body) -> Body {
        std::mem::replace(&mut self.body, body)
    }

    /// Reads the remaining body bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the body cannot be read.
    pub fn bytes(&mut self) -> io::Result<Vec<u8>> {
        self.body.read_all()
    }

    /// Reads the remaining body as UTF-8 text.
    ///
    /// # Errors
    ///
    /// Returns an error if the body cannot be read or is not valid UTF-8.
    pub fn text(&mut self) -> io::Result<String> {
        let bytes = self.bytes()?;
        String::from_utf8(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

/// The underlying HTTP client capability the engine wraps.
///
/// Exactly one request may be in flight per transport: `issue` starts it,
/// `complete` finishes it.
pub trait Transport {
    /// Host the transport talks to, recorded alongside each step.
    fn host(&self) -> &str;

    /// Starts a request.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be sent.
    fn issue(&mut self, request: &Request) -> Result<()>;

    /// Waits for the response to the last issued request.
    ///
    /// # Errors
    ///
    /// Returns an error if no request was issued or the exchange fails.
    fn complete(&mut self) -> Result<Response>;

    /// Issues `request` and completes it in one call.
    ///
    /// # Errors
    ///
    /// Propagates any error from [`Transport::issue`] or [`Transport::complete`].
    fn send(&mut self, request: &Request) -> Result<Response> {
        self.issue(request)?;
        self.complete()
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn host(&self) -> &str {
        (**self).host()
    }

    fn issue(&mut self, request: &Request) -> Result<()> {
        (**self).issue(request)
    }

    fn complete(&mut self) -> Result<Response> {
        (**self).complete()
    }
}
