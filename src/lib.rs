//! A minimal, embeddable tracing client.
//!
//! `minit` is an in-process API for creating traces and spans, propagating
//! parent/child relationships through a request-scoped [`Context`], and
//! exporting completed spans as OTLP/JSON trace batches over HTTP. It is
//! aimed at instrumenting code paths without pulling in a full tracing SDK:
//! no sampling, no processors, no propagation across process boundaries.
//!
//! The model is small:
//!
//! - a [`TracingClient`] registers every [`Trace`] started during a run and
//!   owns the export operation;
//! - a [`Trace`] is a mutex-guarded, append-only list of [`Span`]s sharing
//!   one trace id;
//! - a [`Span`] is a single timed operation with attributes, events, a
//!   two-valued [`Status`], and an optional parent span;
//! - a [`Context`] is an immutable, chainable value carrier that threads
//!   the current trace and span through call chains, so nested
//!   [`start_span_from_context`] calls form a parent/child tree without
//!   explicit parameter passing.
//!
//! On export, spans are grouped by the [`Service`] they were tagged with
//! and each group is posted to the configured endpoint as one OTLP resource
//! batch. Spans are never cleared: exporting twice re-sends everything
//! accumulated so far.
//!
//! # Examples
//!
//! ```no_run
//! use minit::{start_span_from_context, Context, Service, TracingClient};
//!
//! fn main() -> minit::TraceResult<()> {
//!     let client = TracingClient::new("http://localhost:4318/v1/traces");
//!     let (_trace, cx) = client.start_trace_with_context(&Context::new());
//!
//!     let (root, cx) = start_span_from_context(&cx, "main")?;
//!
//!     // A nested operation, attributed to a downstream system.
//!     let (query, _cx) = start_span_from_context(&cx, "get_users")?;
//!     query.set_service(Service::new("db").with_attribute("db.type", "mysql"));
//!     query.set_attribute("db.statement", "SELECT * FROM users");
//!     query.add_event([("event".to_string(), "query_finished".to_string())]);
//!     query.finish();
//!
//!     root.finish();
//!     client.export()
//! }
//! ```

#![warn(
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    unreachable_pub,
    unused
)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod client;
mod context;
mod error;
pub mod export;
mod id_generator;
mod span;
mod trace;
mod trace_context;

#[cfg(any(test, feature = "testing"))]
#[cfg_attr(docsrs, doc(cfg(feature = "testing")))]
pub mod testing;

pub use client::{TracingClient, TracingClientBuilder};
pub use context::Context;
pub use error::{TraceError, TraceResult};
#[cfg(any(test, feature = "testing"))]
pub use id_generator::IncrementIdGenerator;
pub use id_generator::{IdGenerator, RandomIdGenerator};
pub use span::{Event, Service, Span, SpanData, Status};
pub use trace::{start_span_from_context, Trace, TraceContextExt};
pub use trace_context::{SpanContext, SpanId, TraceId};

/// This library's identity: the default [`Service`] name for new spans and
/// the instrumentation scope name in exported batches.
pub const LIBRARY_NAME: &str = env!("CARGO_PKG_NAME");
