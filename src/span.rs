use crate::trace_context::{SpanContext, SpanId, TraceId};
use indexmap::IndexMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;

/// The export status of a [`Span`].
///
/// Maps onto the two-valued OTLP status enumeration: code `1` for `Ok`,
/// code `2` for `Error`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Status {
    /// The operation completed successfully.
    #[default]
    Ok,
    /// The operation failed.
    Error,
}

/// A timestamped, attributed marker attached to a [`Span`].
///
/// Immutable once appended. Field insertion order is preserved so output is
/// reproducible.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Event {
    /// When the event occurred.
    pub timestamp: SystemTime,
    /// String key-value payload of the event.
    pub fields: IndexMap<String, String>,
}

impl Event {
    /// Create an event stamped with the current time.
    pub fn new(fields: impl IntoIterator<Item = (String, String)>) -> Self {
        Event::with_timestamp(SystemTime::now(), fields)
    }

    /// Create an event with an explicit timestamp.
    pub fn with_timestamp(
        timestamp: SystemTime,
        fields: impl IntoIterator<Item = (String, String)>,
    ) -> Self {
        Event {
            timestamp,
            fields: fields.into_iter().collect(),
        }
    }
}

/// The logical component a [`Span`] is attributed to for export grouping,
/// e.g. `"db"` with a `db.type=mysql` attribute.
///
/// Spans default to the library identity service; instrumentation wrappers
/// overwrite it via [`Span::set_service`] to tag a span as belonging to a
/// downstream system.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Service {
    /// Service name, the export grouping key.
    pub name: String,
    /// Attributes describing the service, exported as resource attributes.
    pub attributes: IndexMap<String, String>,
}

impl Service {
    /// Create a service with the given name and no attributes.
    pub fn new(name: impl Into<String>) -> Self {
        Service {
            name: name.into(),
            attributes: IndexMap::new(),
        }
    }

    /// Add an attribute to the service, returning the service.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

impl Default for Service {
    fn default() -> Self {
        Service::new(crate::LIBRARY_NAME)
    }
}

/// Everything a [`Span`] has recorded, captured at one point in time.
///
/// This is what the export pipeline consumes; an unfinished span yields a
/// snapshot with `end_time: None`.
#[derive(Clone, Debug)]
pub struct SpanData {
    /// Trace/span/parent identity.
    pub span_context: SpanContext,
    /// Operation name, exported as the span name.
    pub operation: String,
    /// Service the span is attributed to.
    pub service: Service,
    /// Span attributes in insertion order.
    pub attributes: IndexMap<String, String>,
    /// Events in append order.
    pub events: Vec<Event>,
    /// Current status.
    pub status: Status,
    /// Start timestamp, stamped at creation.
    pub start_time: SystemTime,
    /// End timestamp, `None` until [`Span::finish`] is called.
    pub end_time: Option<SystemTime>,
}

/// A single timed operation within a trace.
///
/// Handles are cheap to clone and share the same underlying record; the
/// owning [`Trace`] keeps one for export. A span is expected to be mutated
/// only by the logical flow of execution that created it: the interior
/// mutex exists so the exporter can take a consistent snapshot, not to make
/// concurrent mutation part of the contract.
///
/// [`Trace`]: crate::Trace
#[derive(Clone, Debug)]
pub struct Span {
    span_context: SpanContext,
    operation: Arc<str>,
    start_time: SystemTime,
    state: Arc<Mutex<SpanState>>,
}

#[derive(Clone, Debug)]
struct SpanState {
    service: Service,
    attributes: IndexMap<String, String>,
    events: Vec<Event>,
    status: Status,
    end_time: Option<SystemTime>,
}

impl Span {
    pub(crate) fn new(
        trace_id: TraceId,
        span_id: SpanId,
        parent_span_id: Option<SpanId>,
        operation: impl Into<String>,
    ) -> Self {
        Span {
            span_context: SpanContext::new(trace_id, span_id, parent_span_id),
            operation: operation.into().into(),
            start_time: SystemTime::now(),
            state: Arc::new(Mutex::new(SpanState {
                service: Service::default(),
                attributes: IndexMap::new(),
                events: Vec::new(),
                status: Status::Ok,
                end_time: None,
            })),
        }
    }

    /// The span's identity within its trace.
    pub fn span_context(&self) -> &SpanContext {
        &self.span_context
    }

    /// The id of the trace this span belongs to.
    pub fn trace_id(&self) -> TraceId {
        self.span_context.trace_id()
    }

    /// The span's own id.
    pub fn span_id(&self) -> SpanId {
        self.span_context.span_id()
    }

    /// The operation name given at start.
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Overwrite the service this span is attributed to.
    pub fn set_service(&self, service: Service) -> &Self {
        self.lock_state().service = service;
        self
    }

    /// Record a string attribute on the span. A later value for the same
    /// key overwrites the earlier one in place.
    pub fn set_attribute(&self, key: impl Into<String>, value: impl Into<String>) -> &Self {
        self.lock_state().attributes.insert(key.into(), value.into());
        self
    }

    /// Append an event stamped with the current time.
    pub fn add_event(&self, fields: impl IntoIterator<Item = (String, String)>) -> &Self {
        self.add_event_with_timestamp(SystemTime::now(), fields)
    }

    /// Append an event with an explicit timestamp.
    pub fn add_event_with_timestamp(
        &self,
        timestamp: SystemTime,
        fields: impl IntoIterator<Item = (String, String)>,
    ) -> &Self {
        self.lock_state()
            .events
            .push(Event::with_timestamp(timestamp, fields));
        self
    }

    /// Set the span status to [`Status::Error`]. Idempotent.
    pub fn mark_failed(&self) -> &Self {
        self.lock_state().status = Status::Error;
        self
    }

    /// Stamp the end time with the current time.
    ///
    /// Returns the span to support release-on-scope-exit chaining. Calling
    /// `finish` again overwrites the end time; correct usage calls it once.
    pub fn finish(&self) -> &Self {
        self.lock_state().end_time = Some(SystemTime::now());
        self
    }

    /// Capture a consistent snapshot of everything the span has recorded.
    pub fn data(&self) -> SpanData {
        let state = self.lock_state();
        SpanData {
            span_context: self.span_context,
            operation: self.operation.to_string(),
            service: state.service.clone(),
            attributes: state.attributes.clone(),
            events: state.events.clone(),
            status: state.status,
            start_time: self.start_time,
            end_time: state.end_time,
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, SpanState> {
        // A poisoned span still holds consistent maps; keep accepting data.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_span() -> Span {
        Span::new(TraceId::from(1u128), SpanId::from(2u64), None, "op")
    }

    #[test]
    fn new_span_defaults() {
        let span = test_span();
        let data = span.data();
        assert_eq!(data.operation, "op");
        assert_eq!(data.status, Status::Ok);
        assert_eq!(data.service.name, crate::LIBRARY_NAME);
        assert!(data.attributes.is_empty());
        assert!(data.events.is_empty());
        assert_eq!(data.end_time, None);
    }

    #[test]
    fn finish_stamps_end_time() {
        let span = test_span();
        span.finish();
        let data = span.data();
        let end = data.end_time.expect("span was finished");
        assert!(data.start_time <= end);
    }

    #[test]
    fn mark_failed_is_idempotent() {
        let span = test_span();
        span.mark_failed().mark_failed();
        assert_eq!(span.data().status, Status::Error);
    }

    #[test]
    fn attributes_preserve_insertion_order() {
        let span = test_span();
        span.set_attribute("b", "2");
        span.set_attribute("a", "1");
        let keys: Vec<_> = span.data().attributes.keys().cloned().collect();
        assert_eq!(keys, vec!["b", "a"]);
    }

    #[test]
    fn set_service_overwrites_default() {
        let span = test_span();
        span.set_service(Service::new("db").with_attribute("db.type", "mysql"));
        let data = span.data();
        assert_eq!(data.service.name, "db");
        assert_eq!(data.service.attributes.get("db.type").map(String::as_str), Some("mysql"));
    }

    #[test]
    fn events_record_fields() {
        let span = test_span();
        span.add_event([("event".to_string(), "query_finished".to_string())]);
        let data = span.data();
        assert_eq!(data.events.len(), 1);
        assert_eq!(
            data.events[0].fields.get("event").map(String::as_str),
            Some("query_finished")
        );
    }
}
