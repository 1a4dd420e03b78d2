//! Live transport adapter backed by reqwest's blocking client.

use reqwest::blocking::{Client, Request as WireRequest};
use reqwest::{Method, Url, Version};

use crate::errors::{Error, Result};
use crate::ports::transport::{Body, Headers, HttpVersion, Request, Response, Transport};

/// Real network transport talking to a single base URL.
///
/// Request URLs are resolved against the base, so `/search?q=x` on a
/// transport built for `http://example.com` goes to
/// `http://example.com/search?q=x`.
///
/// reqwest does not expose the reason phrase a server sent. Responses carry
/// the canonical phrase for their status code, or an empty string for
/// codes without one, so a non-standard phrase is not recorded.
pub struct ReqwestTransport {
    client: Client,
    base: Url,
    host: String,
    pending: Option<WireRequest>,
}

impl ReqwestTransport {
    /// Creates a transport with a default reqwest client.
    ///
    /// # Errors
    ///
    /// Returns an error if `base_url` is not a valid absolute URL.
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_client(Client::new(), base_url)
    }

    /// Creates a transport reusing an existing reqwest client.
    ///
    /// # Errors
    ///
    /// Returns an error if `base_url` is not a valid absolute URL.
    pub fn with_client(client: Client, base_url: &str) -> Result<Self> {
        let base = Url::parse(base_url)
            .map_err(|e| Error::Transport(format!("invalid base url {base_url}: {e}")))?;
        let host = match (base.host_str(), base.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            (None, _) => String::new(),
        };
        Ok(Self {
            client,
            base,
            host,
            pending: None,
        })
    }
}

fn protocol_version(version: Version) -> HttpVersion {
    if version == Version::HTTP_09 {
        HttpVersion::Http09
    } else if version == Version::HTTP_10 {
        HttpVersion::Http10
    } else if version == Version::HTTP_2 {
        HttpVersion::H2
    } else if version == Version::HTTP_3 {
        HttpVersion::H3
    } else {
        HttpVersion::Http11
    }
}

impl Transport for ReqwestTransport {
    fn host(&self) -> &str {
        &self.host
    }

    fn issue(&mut self, request: &Request) -> Result<()> {
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|e| Error::Transport(format!("invalid method {}: {e}", request.method)))?;
        let url = self
            .base
            .join(&request.url)
            .map_err(|e| Error::Transport(format!("invalid url {}: {e}", request.url)))?;

        let mut builder = self.client.request(method, url);
        for (name, value) in request.headers.iter() {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }
        self.pending = Some(builder.build()?);
        Ok(())
    }

    /// Executes the issued request. The reason phrase is the canonical
    /// one for the status, not the server's own.
    fn complete(&mut self) -> Result<Response> {
        let request = self
            .pending
            .take()
            .ok_or_else(|| Error::Transport("complete called before issue".into()))?;
        let response = self.client.execute(request)?;

        let status = response.status();
        let headers: Headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();

        let reason = status.canonical_reason().unwrap_or_default();
        Ok(Response::new(status.as_u16(), reason)
            .with_version(protocol_version(response.version()))
            .with_headers(headers)
            .with_body(Body::from_reader(response)))
    }
}
