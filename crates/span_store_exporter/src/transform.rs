//! Span Transformer
//!
//! Pure conversion from the SDK's span model to [`StorageRecord`]s. No I/O,
//! no shared state: the flush coordinator calls [`transform_batch`] with the
//! wall-clock time of the flush and maps any error to a failed batch.
//!
//! # Rules
//!
//! | Field                     | Storage form                                   |
//! |---------------------------|------------------------------------------------|
//! | start/end time            | `ns / 1000` (truncating) as microseconds       |
//! | status, events, links     | JSON string; absent encodes as `{}` / `[]`     |
//! | residual fields           | JSON object string                             |
//! | attributes                | JSON object, one scalar per key                |
//!
//! A span without a start or end timestamp fails the whole batch. Spans are
//! never skipped individually.

use crate::error::TransformError;
use crate::record::StorageRecord;
use crate::span::{AnyValue, KeyValue, RawSpan, ScopeSpans};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

/// Converts a whole ingested batch, preserving order across and within
/// scope groups.
pub fn transform_batch(
    batch: &[ScopeSpans],
    created_at: DateTime<Utc>,
) -> Result<Vec<StorageRecord>, TransformError> {
    let mut records = Vec::with_capacity(span_count(batch));
    for group in batch {
        for span in &group.spans {
            records.push(transform_span(span, &group.scope, created_at)?);
        }
    }
    Ok(records)
}

/// Converts a single span belonging to `scope`.
pub fn transform_span(
    span: &RawSpan,
    scope: &str,
    created_at: DateTime<Utc>,
) -> Result<StorageRecord, TransformError> {
    let start_time = required_micros(span, span.start_time_unix_nano, "startTimeUnixNano")?;
    let end_time = required_micros(span, span.end_time_unix_nano, "endTimeUnixNano")?;

    let status = match &span.status {
        Some(status) => encode(span, "status", status)?,
        None => "{}".to_string(),
    };

    Ok(StorageRecord {
        id: span.span_id.clone(),
        parent_span_id: span.parent_span_id.clone().filter(|p| !p.is_empty()),
        trace_id: span.trace_id.clone(),
        name: span.name.clone(),
        scope: scope.to_string(),
        kind: span.kind.as_i32(),
        status,
        events: encode(span, "events", &span.events)?,
        links: encode(span, "links", &span.links)?,
        attributes: encode(span, "attributes", &flatten_attributes(&span.attributes))?,
        start_time,
        end_time,
        other: encode(span, "other", &span.other)?,
        created_at,
    })
}

/// Flattens typed attributes into a plain key → value map.
///
/// Attributes whose value carries no type are omitted. When a key repeats,
/// the last occurrence wins.
pub fn flatten_attributes(attributes: &[KeyValue]) -> Map<String, Value> {
    let mut flat = Map::new();
    for kv in attributes {
        if let Some(value) = flatten_value(&kv.value) {
            flat.insert(kv.key.clone(), value);
        }
    }
    flat
}

fn flatten_value(value: &AnyValue) -> Option<Value> {
    match value {
        AnyValue::String(s) => Some(Value::String(s.clone())),
        AnyValue::Int(i) => Some(Value::from(*i)),
        // NaN and infinities have no JSON form
        AnyValue::Double(d) => Some(serde_json::Number::from_f64(*d).map_or(Value::Null, Value::Number)),
        AnyValue::Bool(b) => Some(Value::Bool(*b)),
        AnyValue::Array(values) => Some(Value::Array(
            values.iter().filter_map(flatten_value).collect(),
        )),
        AnyValue::KvList(values) => Some(Value::Object(flatten_attributes(values))),
        AnyValue::Bytes(b) => Some(Value::String(b.clone())),
        AnyValue::Empty => None,
    }
}

/// Nanoseconds since the epoch to microseconds, truncating.
#[inline]
pub fn nanos_to_micros(nanos: u64) -> i64 {
    // u64::MAX / 1000 < i64::MAX
    (nanos / 1_000) as i64
}

/// Total number of spans across all scope groups of a batch.
pub fn span_count(batch: &[ScopeSpans]) -> usize {
    batch.iter().map(|group| group.spans.len()).sum()
}

fn required_micros(
    span: &RawSpan,
    nanos: Option<u64>,
    field: &'static str,
) -> Result<i64, TransformError> {
    nanos
        .map(nanos_to_micros)
        .ok_or_else(|| TransformError::MissingTimestamp {
            span_id: span.span_id.clone(),
            field,
        })
}

fn encode<T: Serialize + ?Sized>(
    span: &RawSpan,
    field: &'static str,
    value: &T,
) -> Result<String, TransformError> {
    serde_json::to_string(value).map_err(|e| TransformError::Encode {
        span_id: span.span_id.clone(),
        field,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::{SpanEvent, SpanKind, SpanLink, SpanStatus};
    use chrono::TimeZone;

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_time_conversion() {
        let span = RawSpan::new("t1", "s1", "op", 1_000_000_000, 2_500_000_000);
        let record = transform_span(&span, "scope", fixed_time()).unwrap();

        assert_eq!(record.start_time, 1_000_000);
        assert_eq!(record.end_time, 2_500_000);
        assert_eq!(record.duration_micros(), 1_500_000);
    }

    #[test]
    fn test_time_conversion_truncates() {
        assert_eq!(nanos_to_micros(1_999), 1);
        assert_eq!(nanos_to_micros(999), 0);
        assert_eq!(nanos_to_micros(u64::MAX), 18_446_744_073_709_551);
    }

    #[test]
    fn test_attribute_flattening() {
        let attributes = vec![
            KeyValue::new("http.method", AnyValue::from("GET")),
            KeyValue::new("http.status_code", AnyValue::Int(200)),
            KeyValue::new("sampled", AnyValue::Bool(true)),
            KeyValue::new("ratio", AnyValue::Double(0.5)),
            KeyValue::new("empty", AnyValue::Empty),
        ];

        let flat = flatten_attributes(&attributes);

        assert_eq!(flat.len(), 4);
        assert_eq!(flat["http.method"], Value::from("GET"));
        assert_eq!(flat["http.status_code"], Value::from(200));
        assert_eq!(flat["sampled"], Value::Bool(true));
        assert_eq!(flat["ratio"], Value::from(0.5));
        assert!(!flat.contains_key("empty"));
    }

    #[test]
    fn test_attribute_flattening_from_wire_shape() {
        let attributes: Vec<KeyValue> = serde_json::from_str(
            r#"[{"key": "http.method", "value": {"stringValue": "GET"}},
                {"key": "nothing", "value": {}}]"#,
        )
        .unwrap();

        let span = RawSpan {
            attributes,
            ..RawSpan::new("t", "s", "n", 0, 0)
        };
        let record = transform_span(&span, "scope", fixed_time()).unwrap();

        assert_eq!(record.attributes, r#"{"http.method":"GET"}"#);
    }

    #[test]
    fn test_array_and_non_finite_values() {
        let attributes = vec![
            KeyValue::new(
                "tags",
                AnyValue::Array(vec![
                    AnyValue::from("a"),
                    AnyValue::Empty,
                    AnyValue::Int(2),
                ]),
            ),
            KeyValue::new("nan", AnyValue::Double(f64::NAN)),
        ];

        let flat = flatten_attributes(&attributes);
        assert_eq!(flat["tags"], serde_json::json!(["a", 2]));
        assert_eq!(flat["nan"], Value::Null);
    }

    #[test]
    fn test_kvlist_and_bytes_from_wire_shape() {
        let attributes: Vec<KeyValue> = serde_json::from_str(
            r#"[{"key": "peer", "value": {"kvlistValue": {"values": [
                    {"key": "host", "value": {"stringValue": "db-1"}},
                    {"key": "port", "value": {"intValue": "5432"}}
                ]}}},
                {"key": "payload", "value": {"bytesValue": "aGVsbG8="}}]"#,
        )
        .unwrap();

        let flat = flatten_attributes(&attributes);
        assert_eq!(flat["peer"], serde_json::json!({"host": "db-1", "port": 5432}));
        assert_eq!(flat["payload"], Value::from("aGVsbG8="));
    }

    #[test]
    fn test_duplicate_keys_last_wins() {
        let attributes = vec![
            KeyValue::new("k", AnyValue::from("first")),
            KeyValue::new("k", AnyValue::from("second")),
        ];
        assert_eq!(flatten_attributes(&attributes)["k"], Value::from("second"));
    }

    #[test]
    fn test_absent_collections_encode_empty() {
        let span = RawSpan::new("t", "s", "n", 10_000, 20_000);
        let record = transform_span(&span, "lib", fixed_time()).unwrap();

        assert_eq!(record.status, "{}");
        assert_eq!(record.events, "[]");
        assert_eq!(record.links, "[]");
        assert_eq!(record.attributes, "{}");
        assert_eq!(record.other, "{}");
        assert_eq!(record.parent_span_id, None);
    }

    #[test]
    fn test_nested_structures_are_encoded() {
        let mut span = RawSpan::new("t", "s", "n", 0, 1_000)
            .with_parent("p")
            .with_kind(SpanKind::Client)
            .with_status(SpanStatus::error("boom"));
        span.events.push(SpanEvent {
            time_unix_nano: Some(500),
            name: "retry".into(),
            attributes: vec![],
        });
        span.links.push(SpanLink {
            trace_id: "t2".into(),
            span_id: "s2".into(),
            attributes: vec![],
        });
        span.other.insert("droppedEventsCount".into(), Value::from(1));

        let record = transform_span(&span, "db", fixed_time()).unwrap();

        assert_eq!(record.parent_span_id.as_deref(), Some("p"));
        assert_eq!(record.kind, 3);
        assert_eq!(record.scope, "db");
        assert_eq!(record.created_at, fixed_time());

        let status: Value = serde_json::from_str(&record.status).unwrap();
        assert_eq!(status, serde_json::json!({"code": 2, "message": "boom"}));
        let events: Value = serde_json::from_str(&record.events).unwrap();
        assert_eq!(events[0]["name"], "retry");
        let links: Value = serde_json::from_str(&record.links).unwrap();
        assert_eq!(links[0]["spanId"], "s2");
        assert_eq!(record.other, r#"{"droppedEventsCount":1}"#);
    }

    #[test]
    fn test_empty_parent_treated_as_root() {
        let span = RawSpan::new("t", "s", "n", 0, 0).with_parent("");
        let record = transform_span(&span, "x", fixed_time()).unwrap();
        assert_eq!(record.parent_span_id, None);
    }

    #[test]
    fn test_missing_timestamp_fails_batch() {
        let good = RawSpan::new("t", "s1", "ok", 0, 1);
        let bad = RawSpan {
            end_time_unix_nano: None,
            ..RawSpan::new("t", "s2", "bad", 0, 1)
        };
        let batch = vec![ScopeSpans::new("lib", vec![good, bad])];

        let err = transform_batch(&batch, fixed_time()).unwrap_err();
        assert_eq!(
            err,
            TransformError::MissingTimestamp {
                span_id: "s2".into(),
                field: "endTimeUnixNano",
            }
        );
    }

    #[test]
    fn test_batch_order_preserved_across_scopes() {
        let batch = vec![
            ScopeSpans::new(
                "http",
                vec![
                    RawSpan::new("t", "a", "a", 0, 0),
                    RawSpan::new("t", "b", "b", 0, 0),
                ],
            ),
            ScopeSpans::new("db", vec![]),
            ScopeSpans::new("cache", vec![RawSpan::new("t", "c", "c", 0, 0)]),
        ];

        let records = transform_batch(&batch, fixed_time()).unwrap();
        let ids: Vec<_> = records.iter().map(|r| (r.id.as_str(), r.scope.as_str())).collect();
        assert_eq!(ids, vec![("a", "http"), ("b", "http"), ("c", "cache")]);
        assert_eq!(span_count(&batch), 3);
    }
}
