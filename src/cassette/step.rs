//! Interaction steps: one request/response exchange captured during recording.

use std::path::Path;

use super::config::ChainConfig;
use super::format::{ExpectedRequest, ResponseRecord, StepRecord, StoredBody};
use crate::errors::Result;
use crate::ports::body_store::BodyStore;
use crate::ports::transport::{Headers, HttpVersion, Request, Response};

/// Identifier of the `n`th step of a chain.
#[must_use]
pub fn step_id(step_number: usize) -> String {
    format!("step_{step_number}")
}

/// Body store name for one side (`request` or `response`) of a step.
#[must_use]
pub fn blob_name(step_number: usize, side: &str) -> String {
    format!("step_{step_number}_{side}.body")
}

/// A step whose request was recorded but whose response is still pending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingStep {
    host: String,
    request: Request,
}

impl PendingStep {
    /// Opens a step for `request` sent to `host`.
    #[must_use]
    pub fn new(host: &str, request: &Request) -> Self {
        Self {
            host: host.to_string(),
            request: request.clone(),
        }
    }

    /// The recorded request.
    #[must_use]
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Closes the step with the response metadata and the drained body.
    #[must_use]
    pub fn complete(self, response: &Response, body: Vec<u8>) -> InteractionStep {
        InteractionStep {
            host: self.host,
            request_method: self.request.method,
            request_url: self.request.url,
            request_body: self.request.body,
            request_headers: self.request.headers,
            response_status: response.status,
            response_reason: response.reason.clone(),
            response_version: response.version,
            response_headers: response.headers.clone(),
            response_body: Some(body),
        }
    }
}

/// A completed exchange, as appended to a recorder's chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InteractionStep {
    /// Host the request went to.
    pub host: String,
    /// Request method.
    pub request_method: String,
    /// Request URL.
    pub request_url: String,
    /// Request body.
    pub request_body: Option<Vec<u8>>,
    /// Request headers.
    pub request_headers: Headers,
    /// Response status code.
    pub response_status: u16,
    /// Response reason phrase.
    pub response_reason: String,
    /// Response protocol version.
    pub response_version: HttpVersion,
    /// Response headers.
    pub response_headers: Headers,
    /// Response body.
    pub response_body: Option<Vec<u8>>,
}

impl InteractionStep {
    /// Renders the step as step number `step_number` of a chain saved in
    /// `directory`, writing oversized bodies to `store`.
    ///
    /// # Errors
    ///
    /// Returns an error if a body blob cannot be written.
    pub fn to_record(
        &self,
        step_number: usize,
        next: Option<String>,
        directory: &Path,
        store: &dyn BodyStore,
        config: &ChainConfig,
    ) -> Result<StepRecord> {
        let request_body = store_body(
            self.request_body.as_deref(),
            &blob_name(step_number, "request"),
            directory,
            store,
            config,
        )?;
        let response_body = store_body(
            self.response_body.as_deref(),
            &blob_name(step_number, "response"),
            directory,
            store,
            config,
        )?;

        Ok(StepRecord {
            id: step_id(step_number),
            host: self.host.clone(),
            request: ExpectedRequest {
                method: self.request_method.clone(),
                url: self.request_url.clone(),
                headers: self.request_headers.clone(),
                body: request_body,
            },
            response: ResponseRecord {
                status: self.response_status,
                reason: self.response_reason.clone(),
                version: self.response_version,
                headers: self.response_headers.clone(),
                body: response_body,
            },
            next,
        })
    }
}

fn store_body(
    body: Option<&[u8]>,
    name: &str,
    directory: &Path,
    store: &dyn BodyStore,
    config: &ChainConfig,
) -> Result<Option<StoredBody>> {
    let Some(body) = body else {
        return Ok(None);
    };
    if let Some(text) = config.inline_text(body) {
        return Ok(Some(StoredBody::Inline(text.to_string())));
    }
    store.write(name, directory, body)?;
    Ok(Some(StoredBody::File(name.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::live::FsBodyStore;
    use crate::ports::transport::Body;

    fn completed(request: &Request, status: u16, body: &[u8]) -> InteractionStep {
        let response = Response::new(status, "OK").with_body(Body::empty());
        PendingStep::new("www.example.com", request).complete(&response, body.to_vec())
    }

    #[test]
    fn names_are_deterministic() {
        assert_eq!(step_id(3), "step_3");
        assert_eq!(blob_name(1, "request"), "step_1_request.body");
    }

    #[test]
    fn complete_copies_request_and_response() {
        let request = Request::post("/", "x=1").with_header("content-type", "form");
        let step = completed(&request, 201, b"created");
        assert_eq!(step.host, "www.example.com");
        assert_eq!(step.request_method, "POST");
        assert_eq!(step.request_body.as_deref(), Some(&b"x=1"[..]));
        assert_eq!(step.request_headers.get("Content-Type"), Some("form"));
        assert_eq!(step.response_status, 201);
        assert_eq!(step.response_body.as_deref(), Some(&b"created"[..]));
    }

    #[test]
    fn to_record_writes_non_trivial_bodies_to_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let step = completed(&Request::post("/", "x=1"), 201, b"created");

        let record = step
            .to_record(1, None, dir.path(), &FsBodyStore, &ChainConfig::default())
            .unwrap();

        assert_eq!(record.id, "step_1");
        assert_eq!(record.next, None);
        assert_eq!(
            record.request.body,
            Some(StoredBody::File("step_1_request.body".into()))
        );
        assert_eq!(
            record.response.body,
            Some(StoredBody::File("step_1_response.body".into()))
        );
        assert_eq!(
            std::fs::read(dir.path().join("step_1_request.body")).unwrap(),
            b"x=1"
        );
    }

    #[test]
    fn to_record_inlines_small_text_and_keeps_null_bodies() {
        let dir = tempfile::tempdir().unwrap();
        let config = ChainConfig {
            inline_body_limit: 64,
            ..ChainConfig::default()
        };
        let step = completed(&Request::get("/"), 200, b"hello");

        let record =
            step.to_record(0, Some(step_id(1)), dir.path(), &FsBodyStore, &config).unwrap();

        assert_eq!(record.next.as_deref(), Some("step_1"));
        assert_eq!(record.request.body, None);
        assert_eq!(
            record.response.body,
            Some(StoredBody::Inline("hello".into()))
        );
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }
}
