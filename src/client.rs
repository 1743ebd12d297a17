use crate::context::Context;
use crate::error::{TraceError, TraceResult};
use crate::export::{self, HttpClient};
use crate::id_generator::{IdGenerator, RandomIdGenerator};
use crate::span::{Service, SpanData};
use crate::trace::{Trace, TraceContextExt};
use http::header::CONTENT_TYPE;
use http::{Method, Request};
use indexmap::IndexMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Process-wide registry of traces and owner of the export operation.
///
/// A `TracingClient` accumulates every trace started through it for the
/// lifetime of the process and sends them to the configured OTLP endpoint
/// when [`export`] is called. Construct one explicitly and thread it through
/// your program; there is no implicit global instance.
///
/// Lock order is client before trace before span, and nothing else ever
/// acquires a trace lock while holding another trace's, so export cannot
/// deadlock against concurrent `start_trace`/`start_span` callers.
///
/// # Examples
///
/// ```no_run
/// use minit::{start_span_from_context, Context, TracingClient};
///
/// let client = TracingClient::new("http://localhost:4318/v1/traces");
/// let (_trace, cx) = client.start_trace_with_context(&Context::new());
///
/// let (span, _cx) = start_span_from_context(&cx, "main")?;
/// // ... instrumented work ...
/// span.finish();
///
/// client.export()?;
/// # Ok::<(), minit::TraceError>(())
/// ```
///
/// [`export`]: TracingClient::export
#[derive(Debug)]
pub struct TracingClient {
    endpoint: String,
    http_client: Box<dyn HttpClient>,
    id_generator: Arc<dyn IdGenerator>,
    traces: Mutex<Vec<Trace>>,
}

impl TracingClient {
    /// Create a client exporting to the given endpoint URL with the default
    /// transport and id generator.
    pub fn new(endpoint: impl Into<String>) -> Self {
        TracingClient::builder(endpoint).build()
    }

    /// Start configuring a client with a custom transport or id generator.
    pub fn builder(endpoint: impl Into<String>) -> TracingClientBuilder {
        TracingClientBuilder {
            endpoint: endpoint.into(),
            http_client: None,
            id_generator: None,
        }
    }

    /// The endpoint URL batches are posted to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Start a new trace and register it with this client.
    pub fn start_trace(&self) -> Trace {
        let trace = Trace::new(
            self.id_generator.new_trace_id(),
            Arc::clone(&self.id_generator),
        );
        tracing::debug!(trace_id = %trace.trace_id(), "started trace");
        self.lock_traces().push(trace.clone());
        trace
    }

    /// Start a new trace and return a derived context carrying it, ready
    /// for [`start_span_from_context`].
    ///
    /// [`start_span_from_context`]: crate::start_span_from_context
    pub fn start_trace_with_context(&self, cx: &Context) -> (Trace, Context) {
        let trace = self.start_trace();
        let cx = cx.with_trace(trace.clone());
        (trace, cx)
    }

    /// Export every span accumulated so far, one HTTP POST per service
    /// group.
    ///
    /// Spans are partitioned by the service name they carry at export time,
    /// across trace boundaries: a single trace can contribute spans to
    /// several groups, and one group can hold spans from several traces.
    /// Within a group spans keep the order they were registered in their
    /// trace; traces contribute in registration order.
    ///
    /// Spans are not cleared or marked as exported. Calling `export` again
    /// re-sends everything accumulated so far, giving at-least-once
    /// semantics across calls.
    ///
    /// # Errors
    ///
    /// Returns the first serialization, request-construction, or transport
    /// error encountered and stops processing further groups. Groups
    /// already posted stay posted; a failed export is not atomic.
    pub fn export(&self) -> TraceResult<()> {
        let traces = self.lock_traces();

        let mut groups: IndexMap<String, (Service, Vec<SpanData>)> = IndexMap::new();
        for trace in traces.iter() {
            for data in trace.span_snapshots() {
                let (_, spans) = groups
                    .entry(data.service.name.clone())
                    .or_insert_with(|| (data.service.clone(), Vec::new()));
                spans.push(data);
            }
        }

        for (name, (service, spans)) in &groups {
            tracing::debug!(service = %name, spans = spans.len(), "exporting trace batch");
            let batch = export::trace::build_batch(service, spans);
            let body = serde_json::to_vec(&batch)?;
            let request = Request::builder()
                .method(Method::POST)
                .uri(self.endpoint.as_str())
                .header(CONTENT_TYPE, "application/json")
                .body(body)?;
            self.http_client
                .send(request)
                .map_err(TraceError::Transport)?;
        }

        Ok(())
    }

    fn lock_traces(&self) -> std::sync::MutexGuard<'_, Vec<Trace>> {
        self.traces.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Configure and build a [`TracingClient`].
#[derive(Debug)]
pub struct TracingClientBuilder {
    endpoint: String,
    http_client: Option<Box<dyn HttpClient>>,
    id_generator: Option<Arc<dyn IdGenerator>>,
}

impl TracingClientBuilder {
    /// Use a custom transport instead of the default blocking reqwest
    /// client.
    pub fn with_http_client(mut self, http_client: impl HttpClient + 'static) -> Self {
        self.http_client = Some(Box::new(http_client));
        self
    }

    /// Use a custom id generator instead of the default random one.
    pub fn with_id_generator(mut self, id_generator: impl IdGenerator + 'static) -> Self {
        self.id_generator = Some(Arc::new(id_generator));
        self
    }

    /// Build the client.
    pub fn build(self) -> TracingClient {
        TracingClient {
            endpoint: self.endpoint,
            http_client: self
                .http_client
                .unwrap_or_else(|| Box::new(reqwest::blocking::Client::new())),
            id_generator: self
                .id_generator
                .unwrap_or_else(|| Arc::new(RandomIdGenerator::default())),
            traces: Mutex::new(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id_generator::IncrementIdGenerator;
    use crate::span::Service;
    use crate::testing::MockHttpClient;
    use crate::trace::start_span_from_context;
    use serde_json::Value;

    fn test_client(mock: MockHttpClient) -> TracingClient {
        TracingClient::builder("http://localhost:4318/v1/traces")
            .with_http_client(mock)
            .with_id_generator(IncrementIdGenerator::new())
            .build()
    }

    fn group_spans(body: &Value) -> &Vec<Value> {
        body["resourceSpans"][0]["scopeSpans"][0]["spans"]
            .as_array()
            .expect("span array")
    }

    fn service_name(body: &Value) -> &str {
        body["resourceSpans"][0]["resource"]["attributes"][0]["value"]["stringValue"]
            .as_str()
            .expect("service.name value")
    }

    #[test]
    fn export_with_no_spans_sends_nothing() {
        let mock = MockHttpClient::new();
        let client = test_client(mock.clone());
        client.start_trace();

        client.export().expect("export succeeds");
        assert!(mock.requests().is_empty());
    }

    #[test]
    fn main_and_db_scenario_exports_two_groups() {
        let mock = MockHttpClient::new();
        let client = test_client(mock.clone());

        let (_, cx) = client.start_trace_with_context(&Context::new());
        let (root, cx) = start_span_from_context(&cx, "main").expect("trace bound");

        let (child, _) = start_span_from_context(&cx, "query").expect("trace bound");
        child.set_service(Service::new("db").with_attribute("db.type", "mysql"));
        child.set_attribute("db.statement", "SELECT * FROM users");
        child.add_event([("event".to_string(), "query_finished".to_string())]);
        child.finish();
        root.finish();

        client.export().expect("export succeeds");

        let requests = mock.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests
            .iter()
            .all(|r| r.content_type.as_deref() == Some("application/json")));

        let bodies: Vec<Value> = requests.iter().map(|r| r.body_json()).collect();
        let default_group = bodies
            .iter()
            .find(|b| service_name(b) == crate::LIBRARY_NAME)
            .expect("default service group");
        let db_group = bodies
            .iter()
            .find(|b| service_name(b) == "db")
            .expect("db service group");

        let main_spans = group_spans(default_group);
        assert_eq!(main_spans.len(), 1);
        assert_eq!(main_spans[0]["name"], "main");
        assert!(main_spans[0].get("parentSpanId").is_none());

        let db_spans = group_spans(db_group);
        assert_eq!(db_spans.len(), 1);
        assert_eq!(db_spans[0]["name"], "query");
        assert_eq!(db_spans[0]["parentSpanId"], root.span_id().to_string());
        assert_eq!(db_spans[0]["attributes"].as_array().map(Vec::len), Some(1));
        assert_eq!(db_spans[0]["events"].as_array().map(Vec::len), Some(1));
    }

    #[test]
    fn spans_group_by_service_across_traces() {
        let mock = MockHttpClient::new();
        let client = test_client(mock.clone());

        client.start_trace().start_span("one").finish();
        client.start_trace().start_span("two").finish();

        client.export().expect("export succeeds");

        let requests = mock.requests();
        assert_eq!(requests.len(), 1);
        let body = requests[0].body_json();
        assert_eq!(service_name(&body), crate::LIBRARY_NAME);
        assert_eq!(group_spans(&body).len(), 2);
    }

    #[test]
    fn distinct_services_export_as_distinct_groups() {
        let mock = MockHttpClient::new();
        let client = test_client(mock.clone());

        let trace = client.start_trace();
        trace.start_span("main").finish();
        let db = trace.start_span("query");
        db.set_service(Service::new("db"));
        db.finish();

        client.export().expect("export succeeds");

        let requests = mock.requests();
        assert_eq!(requests.len(), 2);
        for request in &requests {
            let body = request.body_json();
            let spans = group_spans(&body);
            assert_eq!(spans.len(), 1);
            match service_name(&body) {
                "db" => assert_eq!(spans[0]["name"], "query"),
                name => {
                    assert_eq!(name, crate::LIBRARY_NAME);
                    assert_eq!(spans[0]["name"], "main");
                }
            }
        }
    }

    #[test]
    fn failed_span_exports_error_status() {
        let mock = MockHttpClient::new();
        let client = test_client(mock.clone());

        let span = client.start_trace().start_span("broken");
        span.mark_failed();
        span.finish();

        client.export().expect("export succeeds");

        let body = mock.requests()[0].body_json();
        assert_eq!(group_spans(&body)[0]["status"]["code"], 2);
    }

    #[test]
    fn repeated_export_resends_identical_batches() {
        let mock = MockHttpClient::new();
        let client = test_client(mock.clone());
        client.start_trace().start_span("main").finish();

        client.export().expect("first export succeeds");
        client.export().expect("second export succeeds");

        let requests = mock.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].body, requests[1].body);
    }

    #[test]
    fn transport_failure_surfaces_as_error() {
        let client = test_client(MockHttpClient::failing());
        client.start_trace().start_span("main").finish();

        let err = client.export().unwrap_err();
        assert!(matches!(err, TraceError::Transport(_)));
    }

    #[test]
    fn export_stops_at_first_failing_group() {
        let mock = MockHttpClient::failing_after(1);
        let client = test_client(mock.clone());

        let trace = client.start_trace();
        trace.start_span("main").finish();
        trace.start_span("query").set_service(Service::new("db"));

        let err = client.export().unwrap_err();
        assert!(matches!(err, TraceError::Transport(_)));
        // The group sent before the failure stays sent.
        assert_eq!(mock.requests().len(), 1);
    }
}
