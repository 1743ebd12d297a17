//! Export pipeline: the OTLP wire-format adapter and the HTTP transport
//! seam it hands batches to.

use std::fmt::Debug;

#[doc(no_inline)]
pub use bytes::Bytes;
#[doc(no_inline)]
pub use http::{Request, Response};

pub mod trace;

/// Opaque transport error.
pub type HttpError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A minimal interface necessary for sending trace batches over HTTP.
///
/// The client ships with an implementation for `reqwest::blocking::Client`;
/// implement this to bring your own transport, impose timeouts, or capture
/// requests in tests.
pub trait HttpClient: Debug + Send + Sync {
    /// Send the specified HTTP request with `Vec<u8>` payload, blocking
    /// until it completes.
    ///
    /// Returns an error if it can't connect to the server or the request
    /// could not be completed.
    fn send(&self, request: Request<Vec<u8>>) -> Result<Response<Bytes>, HttpError>;
}

impl HttpClient for reqwest::blocking::Client {
    fn send(&self, request: Request<Vec<u8>>) -> Result<Response<Bytes>, HttpError> {
        tracing::debug!(uri = %request.uri(), "sending trace batch");
        let request = request.try_into()?;
        let mut response = self.execute(request)?.error_for_status()?;
        let headers = std::mem::take(response.headers_mut());
        let mut http_response = Response::builder()
            .status(response.status())
            .body(response.bytes()?)?;
        *http_response.headers_mut() = headers;

        Ok(http_response)
    }
}
