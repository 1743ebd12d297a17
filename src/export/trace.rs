//! OTLP/JSON wire model and the adapter from [`SpanData`] records into it.
//!
//! One batch covers one service group: a single resource entry carrying the
//! service identity, a single scope entry naming this library, and one wire
//! span per input span. Field names, hex-encoded ids, and decimal-string
//! nanosecond timestamps follow the OTLP/JSON encoding.

use crate::span::{Event as SpanEvent, Service, SpanData, Status as SpanStatus};
use indexmap::IndexMap;
use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};

/// Top-level OTLP trace export payload.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportTraceServiceRequest {
    /// One entry per resource; this client emits exactly one per batch.
    pub resource_spans: Vec<ResourceSpans>,
}

/// A collection of scope spans from a single resource.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSpans {
    /// The resource the spans are attributed to.
    pub resource: Resource,
    /// One entry per instrumentation scope; this client emits exactly one.
    pub scope_spans: Vec<ScopeSpans>,
}

/// The entity producing telemetry, described by attributes.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    /// `service.name` plus the service's own attributes.
    pub attributes: Vec<KeyValue>,
}

/// A collection of spans from a single instrumentation scope.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeSpans {
    /// The scope that produced the spans.
    pub scope: InstrumentationScope,
    /// The spans themselves.
    pub spans: Vec<Span>,
}

/// Identity of the library that produced a batch of spans.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstrumentationScope {
    /// Scope name, fixed to this library's identity.
    pub name: String,
}

/// A single wire span.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Span {
    /// Hex-encoded 16-byte trace id.
    pub trace_id: String,
    /// Hex-encoded 8-byte span id.
    pub span_id: String,
    /// Hex-encoded parent span id, omitted for root spans.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<String>,
    /// Operation name.
    pub name: String,
    /// Start time, decimal nanoseconds since the Unix epoch.
    pub start_time_unix_nano: String,
    /// End time in the same representation; `"0"` for unfinished spans.
    pub end_time_unix_nano: String,
    /// Two-valued completion status.
    pub status: Status,
    /// Span attributes.
    pub attributes: Vec<KeyValue>,
    /// Events attached to the span.
    pub events: Vec<Event>,
}

/// A timestamped marker within a wire span.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Event time, decimal nanoseconds since the Unix epoch.
    pub time_unix_nano: String,
    /// Event payload.
    pub attributes: Vec<KeyValue>,
}

/// A string-valued attribute.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyValue {
    /// Attribute key.
    pub key: String,
    /// Attribute value.
    pub value: AnyValue,
}

impl KeyValue {
    fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        KeyValue {
            key: key.into(),
            value: AnyValue {
                string_value: value.into(),
            },
        }
    }
}

/// The OTLP value wrapper; this client only records string values.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnyValue {
    /// The string payload.
    pub string_value: String,
}

/// Wire status: code `1` for ok, `2` for error.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    /// Status code.
    pub code: u32,
}

impl From<SpanStatus> for Status {
    fn from(status: SpanStatus) -> Self {
        match status {
            SpanStatus::Ok => Status { code: 1 },
            SpanStatus::Error => Status { code: 2 },
        }
    }
}

/// Build the wire batch for one service group.
pub(crate) fn build_batch(service: &Service, spans: &[SpanData]) -> ExportTraceServiceRequest {
    let mut attributes = vec![KeyValue::new("service.name", service.name.clone())];
    attributes.extend(key_values(&service.attributes));

    ExportTraceServiceRequest {
        resource_spans: vec![ResourceSpans {
            resource: Resource { attributes },
            scope_spans: vec![ScopeSpans {
                scope: InstrumentationScope {
                    name: crate::LIBRARY_NAME.to_string(),
                },
                spans: spans.iter().map(wire_span).collect(),
            }],
        }],
    }
}

fn wire_span(data: &SpanData) -> Span {
    Span {
        trace_id: data.span_context.trace_id().to_string(),
        span_id: data.span_context.span_id().to_string(),
        parent_span_id: data.span_context.parent_span_id().map(|id| id.to_string()),
        name: data.operation.clone(),
        start_time_unix_nano: unix_nanos(data.start_time),
        end_time_unix_nano: data
            .end_time
            .map(unix_nanos)
            .unwrap_or_else(|| "0".to_string()),
        status: data.status.into(),
        attributes: key_values(&data.attributes).collect(),
        events: data.events.iter().map(wire_event).collect(),
    }
}

fn wire_event(event: &SpanEvent) -> Event {
    Event {
        time_unix_nano: unix_nanos(event.timestamp),
        attributes: key_values(&event.fields).collect(),
    }
}

fn key_values(map: &IndexMap<String, String>) -> impl Iterator<Item = KeyValue> + '_ {
    map.iter().map(|(k, v)| KeyValue::new(k.clone(), v.clone()))
}

fn unix_nanos(time: SystemTime) -> String {
    time.duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace_context::{SpanContext, SpanId, TraceId};
    use std::time::Duration;

    fn span_data(parent: Option<SpanId>) -> SpanData {
        SpanData {
            span_context: SpanContext::new(TraceId::from(0xabcu128), SpanId::from(0x1u64), parent),
            operation: "get_users".to_string(),
            service: Service::new("db"),
            attributes: [("db.statement".to_string(), "SELECT 1".to_string())]
                .into_iter()
                .collect(),
            events: vec![SpanEvent::with_timestamp(
                UNIX_EPOCH + Duration::from_nanos(42),
                [("event".to_string(), "query_finished".to_string())],
            )],
            status: SpanStatus::Ok,
            start_time: UNIX_EPOCH + Duration::from_nanos(10),
            end_time: Some(UNIX_EPOCH + Duration::from_nanos(20)),
        }
    }

    #[test]
    fn batch_shape_matches_otlp_json() {
        let service = Service::new("db").with_attribute("db.type", "mysql");
        let batch = build_batch(&service, &[span_data(None)]);
        let json = serde_json::to_value(&batch).expect("serializable");

        let resource_spans = &json["resourceSpans"][0];
        let resource_attrs = resource_spans["resource"]["attributes"]
            .as_array()
            .expect("attribute array");
        assert_eq!(resource_attrs[0]["key"], "service.name");
        assert_eq!(resource_attrs[0]["value"]["stringValue"], "db");
        assert_eq!(resource_attrs[1]["key"], "db.type");
        assert_eq!(resource_attrs[1]["value"]["stringValue"], "mysql");

        let scope_spans = &resource_spans["scopeSpans"][0];
        assert_eq!(scope_spans["scope"]["name"], crate::LIBRARY_NAME);

        let span = &scope_spans["spans"][0];
        assert_eq!(span["traceId"], "00000000000000000000000000000abc");
        assert_eq!(span["spanId"], "0000000000000001");
        assert_eq!(span["name"], "get_users");
        assert_eq!(span["startTimeUnixNano"], "10");
        assert_eq!(span["endTimeUnixNano"], "20");
        assert_eq!(span["status"]["code"], 1);
        assert_eq!(span["attributes"][0]["key"], "db.statement");
        assert_eq!(span["events"][0]["timeUnixNano"], "42");
        assert_eq!(span["events"][0]["attributes"][0]["value"]["stringValue"], "query_finished");
    }

    #[test]
    fn root_span_omits_parent_span_id() {
        let batch = build_batch(&Service::new("db"), &[span_data(None)]);
        let json = serde_json::to_value(&batch).expect("serializable");
        let span = &json["resourceSpans"][0]["scopeSpans"][0]["spans"][0];
        assert!(span.get("parentSpanId").is_none());
    }

    #[test]
    fn child_span_carries_hex_parent_id() {
        let batch = build_batch(&Service::new("db"), &[span_data(Some(SpanId::from(0xbeefu64)))]);
        let json = serde_json::to_value(&batch).expect("serializable");
        let span = &json["resourceSpans"][0]["scopeSpans"][0]["spans"][0];
        assert_eq!(span["parentSpanId"], "000000000000beef");
    }

    #[test]
    fn unfinished_span_exports_zero_end_time() {
        let mut data = span_data(None);
        data.end_time = None;
        let batch = build_batch(&Service::new("db"), &[data]);
        let json = serde_json::to_value(&batch).expect("serializable");
        assert_eq!(
            json["resourceSpans"][0]["scopeSpans"][0]["spans"][0]["endTimeUnixNano"],
            "0"
        );
    }

    #[test]
    fn failed_status_maps_to_error_code() {
        let mut data = span_data(None);
        data.status = SpanStatus::Error;
        let batch = build_batch(&Service::new("db"), &[data]);
        let json = serde_json::to_value(&batch).expect("serializable");
        assert_eq!(
            json["resourceSpans"][0]["scopeSpans"][0]["spans"][0]["status"]["code"],
            2
        );
    }
}
