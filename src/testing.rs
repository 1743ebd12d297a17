//! Utilities for testing instrumented code without a collector.

use crate::export::{Bytes, HttpClient, HttpError, Request, Response};
use std::sync::{Arc, Mutex, PoisonError};

/// A request captured by [`MockHttpClient`].
#[derive(Clone, Debug)]
pub struct CapturedRequest {
    /// Request URI as a string.
    pub uri: String,
    /// `content-type` header, if set.
    pub content_type: Option<String>,
    /// Raw request body.
    pub body: Vec<u8>,
}

impl CapturedRequest {
    /// Parse the body as JSON.
    pub fn body_json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("captured body is valid JSON")
    }
}

/// An [`HttpClient`] that records requests in memory instead of sending
/// them, optionally failing after a set number of successful sends.
#[derive(Clone, Debug)]
pub struct MockHttpClient {
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
    fail_after: usize,
}

impl MockHttpClient {
    /// A client that accepts every request.
    pub fn new() -> Self {
        Self::failing_after(usize::MAX)
    }

    /// A client that fails every request.
    pub fn failing() -> Self {
        Self::failing_after(0)
    }

    /// A client that accepts `successes` requests, then fails the rest.
    pub fn failing_after(successes: usize) -> Self {
        MockHttpClient {
            requests: Arc::new(Mutex::new(Vec::new())),
            fail_after: successes,
        }
    }

    /// Requests captured so far, in send order.
    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for MockHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient for MockHttpClient {
    fn send(&self, request: Request<Vec<u8>>) -> Result<Response<Bytes>, HttpError> {
        let mut requests = self.requests.lock().unwrap_or_else(PoisonError::into_inner);
        if requests.len() >= self.fail_after {
            return Err("mock transport failure".into());
        }

        requests.push(CapturedRequest {
            uri: request.uri().to_string(),
            content_type: request
                .headers()
                .get(http::header::CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string),
            body: request.into_body(),
        });

        Ok(Response::builder().status(200).body(Bytes::new())?)
    }
}
