//! Errors surfaced by the tracing client.

use crate::export::HttpError;
use thiserror::Error;

/// Describe the result of operations in the tracing API.
pub type TraceResult<T> = Result<T, TraceError>;

/// Errors returned by the trace API and the export pipeline.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TraceError {
    /// A span was started from a context with no trace bound in it. This is
    /// instrumentation misuse, not a transient condition: the caller started
    /// a span outside a traced call path.
    #[error("no trace found in the supplied context")]
    NoActiveTrace,

    /// The wire batch could not be encoded.
    #[error("failed to serialize trace batch: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The export request could not be built from the configured endpoint.
    #[error("failed to build export request: {0}")]
    RequestFailed(#[from] http::Error),

    /// The transport reported a failure sending a batch.
    #[error("failed to send trace batch: {0}")]
    Transport(#[source] HttpError),

    /// Other types of failures not covered by the variants above.
    #[error("{0}")]
    Other(String),
}
