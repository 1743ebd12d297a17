use crate::context::Context;
use crate::error::{TraceError, TraceResult};
use crate::id_generator::IdGenerator;
use crate::span::{Span, SpanData};
use crate::trace_context::{SpanId, TraceId};
use std::sync::{Arc, Mutex, PoisonError};

/// A set of causally related spans sharing one trace id.
///
/// Created by [`TracingClient::start_trace`]; spans only accumulate, they
/// are never removed. Handles are cheap to clone and all refer to the same
/// underlying span list.
///
/// [`TracingClient::start_trace`]: crate::TracingClient::start_trace
#[derive(Clone, Debug)]
pub struct Trace {
    inner: Arc<TraceInner>,
}

#[derive(Debug)]
struct TraceInner {
    trace_id: TraceId,
    id_generator: Arc<dyn IdGenerator>,
    spans: Mutex<Vec<Span>>,
}

impl Trace {
    pub(crate) fn new(trace_id: TraceId, id_generator: Arc<dyn IdGenerator>) -> Self {
        Trace {
            inner: Arc::new(TraceInner {
                trace_id,
                id_generator,
                spans: Mutex::new(Vec::new()),
            }),
        }
    }

    /// The id shared by every span of this trace.
    pub fn trace_id(&self) -> TraceId {
        self.inner.trace_id
    }

    /// Start a root-level span under this trace.
    ///
    /// The span is registered into the trace's span list at creation time,
    /// so an export that runs before [`Span::finish`] still sees it (with no
    /// end time). Safe to call from multiple threads sharing one trace.
    pub fn start_span(&self, operation: impl Into<String>) -> Span {
        self.start_span_with_parent(operation, None)
    }

    /// Start a span with an explicit parent span id.
    ///
    /// Usually reached through [`start_span_from_context`], which discovers
    /// the parent from the context chain instead of threading it by hand.
    pub fn start_span_with_parent(
        &self,
        operation: impl Into<String>,
        parent_span_id: Option<SpanId>,
    ) -> Span {
        let span = Span::new(
            self.inner.trace_id,
            self.inner.id_generator.new_span_id(),
            parent_span_id,
            operation,
        );
        self.lock_spans().push(span.clone());
        span
    }

    /// Snapshot every span registered so far, in registration order.
    ///
    /// Holds the trace's lock while snapshotting so export cannot race a
    /// concurrent `start_span`.
    pub(crate) fn span_snapshots(&self) -> Vec<SpanData> {
        self.lock_spans().iter().map(Span::data).collect()
    }

    fn lock_spans(&self) -> std::sync::MutexGuard<'_, Vec<Span>> {
        self.inner
            .spans
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Methods for binding and reading the current trace and span on a
/// [`Context`].
pub trait TraceContextExt {
    /// Returns a clone of this context with the given trace bound as the
    /// current trace.
    fn with_trace(&self, trace: Trace) -> Context;

    /// The current trace, if one is bound.
    fn trace(&self) -> Option<&Trace>;

    /// Returns a clone of this context with the given span bound as the
    /// current span.
    fn with_span(&self, span: Span) -> Context;

    /// The current span, if one is bound.
    fn span(&self) -> Option<&Span>;
}

impl TraceContextExt for Context {
    fn with_trace(&self, trace: Trace) -> Context {
        self.with_value(trace)
    }

    fn trace(&self) -> Option<&Trace> {
        self.get::<Trace>()
    }

    fn with_span(&self, span: Span) -> Context {
        self.with_value(span)
    }

    fn span(&self) -> Option<&Span> {
        self.get::<Span>()
    }
}

/// Start a span under the current trace of `cx`, parented to the current
/// span of `cx` if one is bound.
///
/// Returns the new span and a derived context carrying it as the current
/// span, so nested instrumentation calls form a parent/child tree without
/// explicit parameter threading. The trace binding is inherited unchanged.
///
/// # Errors
///
/// Returns [`TraceError::NoActiveTrace`] when `cx` carries no trace. This
/// is instrumentation used outside a traced call path.
pub fn start_span_from_context(
    cx: &Context,
    operation: impl Into<String>,
) -> TraceResult<(Span, Context)> {
    let trace = cx.trace().ok_or(TraceError::NoActiveTrace)?;
    let parent_span_id = cx.span().map(Span::span_id);
    let span = trace.start_span_with_parent(operation, parent_span_id);
    let cx = cx.with_span(span.clone());
    Ok((span, cx))
}
