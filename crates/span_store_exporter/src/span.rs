//! Raw span data model.
//!
//! These types mirror the OTLP/JSON encoding produced by the instrumentation
//! layer's span serializer. They are immutable once handed to the exporter;
//! the transformer only reads them.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// A group of spans emitted by one instrumentation scope.
///
/// One call to [`SpanStoreExporter::export`](crate::SpanStoreExporter::export)
/// carries a sequence of these.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeSpans {
    /// Instrumentation scope (library) name
    #[serde(default)]
    pub scope: String,
    /// Spans in emission order
    #[serde(default)]
    pub spans: Vec<RawSpan>,
}

impl ScopeSpans {
    pub fn new(scope: impl Into<String>, spans: Vec<RawSpan>) -> Self {
        Self {
            scope: scope.into(),
            spans,
        }
    }
}

/// A completed span as produced by the tracing SDK.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSpan {
    pub span_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<String>,
    pub trace_id: String,
    pub name: String,
    #[serde(default)]
    pub kind: SpanKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<SpanStatus>,
    #[serde(default)]
    pub events: Vec<SpanEvent>,
    #[serde(default)]
    pub links: Vec<SpanLink>,
    /// Start time (Unix nanoseconds)
    #[serde(default, deserialize_with = "de_opt_u64")]
    pub start_time_unix_nano: Option<u64>,
    /// End time (Unix nanoseconds)
    #[serde(default, deserialize_with = "de_opt_u64")]
    pub end_time_unix_nano: Option<u64>,
    #[serde(default)]
    pub attributes: Vec<KeyValue>,
    /// Scope-specific fields the pipeline does not interpret.
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl RawSpan {
    /// Creates a span with the given identity and timing; everything else empty.
    pub fn new(
        trace_id: impl Into<String>,
        span_id: impl Into<String>,
        name: impl Into<String>,
        start_time_unix_nano: u64,
        end_time_unix_nano: u64,
    ) -> Self {
        Self {
            span_id: span_id.into(),
            trace_id: trace_id.into(),
            name: name.into(),
            start_time_unix_nano: Some(start_time_unix_nano),
            end_time_unix_nano: Some(end_time_unix_nano),
            ..Default::default()
        }
    }

    /// Adds an attribute to the span
    pub fn with_attribute(mut self, key: impl Into<String>, value: AnyValue) -> Self {
        self.attributes.push(KeyValue::new(key, value));
        self
    }

    pub fn with_parent(mut self, parent_span_id: impl Into<String>) -> Self {
        self.parent_span_id = Some(parent_span_id.into());
        self
    }

    pub fn with_kind(mut self, kind: SpanKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_status(mut self, status: SpanStatus) -> Self {
        self.status = Some(status);
        self
    }
}

/// Span kind according to the OpenTelemetry specification.
///
/// Deserializes from either the OTLP integer or the `SPAN_KIND_*` name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SpanKind {
    #[default]
    Unspecified,
    Internal,
    Server,
    Client,
    Producer,
    Consumer,
}

impl SpanKind {
    /// OTLP numeric value
    pub fn as_i32(self) -> i32 {
        match self {
            Self::Unspecified => 0,
            Self::Internal => 1,
            Self::Server => 2,
            Self::Client => 3,
            Self::Producer => 4,
            Self::Consumer => 5,
        }
    }

    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::Unspecified),
            1 => Some(Self::Internal),
            2 => Some(Self::Server),
            3 => Some(Self::Client),
            4 => Some(Self::Producer),
            5 => Some(Self::Consumer),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unspecified => "SPAN_KIND_UNSPECIFIED",
            Self::Internal => "SPAN_KIND_INTERNAL",
            Self::Server => "SPAN_KIND_SERVER",
            Self::Client => "SPAN_KIND_CLIENT",
            Self::Producer => "SPAN_KIND_PRODUCER",
            Self::Consumer => "SPAN_KIND_CONSUMER",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        let name = name.strip_prefix("SPAN_KIND_").unwrap_or(name);
        match name.to_ascii_uppercase().as_str() {
            "UNSPECIFIED" => Some(Self::Unspecified),
            "INTERNAL" => Some(Self::Internal),
            "SERVER" => Some(Self::Server),
            "CLIENT" => Some(Self::Client),
            "PRODUCER" => Some(Self::Producer),
            "CONSUMER" => Some(Self::Consumer),
            _ => None,
        }
    }
}

impl std::fmt::Display for SpanKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for SpanKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(self.as_i32())
    }
}

impl<'de> Deserialize<'de> for SpanKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Num(i32),
            Name(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Num(n) => Self::from_i32(n)
                .ok_or_else(|| serde::de::Error::custom(format!("unknown span kind {n}"))),
            Repr::Name(s) => Self::from_name(&s)
                .ok_or_else(|| serde::de::Error::custom(format!("unknown span kind {s:?}"))),
        }
    }
}

/// Span status as reported by the SDK. Stored verbatim as JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpanStatus {
    #[serde(default)]
    pub code: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SpanStatus {
    pub fn ok() -> Self {
        Self {
            code: 1,
            message: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            code: 2,
            message: Some(message.into()),
        }
    }
}

/// Timestamped annotation on a span.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpanEvent {
    #[serde(default, deserialize_with = "de_opt_u64")]
    pub time_unix_nano: Option<u64>,
    pub name: String,
    #[serde(default)]
    pub attributes: Vec<KeyValue>,
}

/// Causal reference to a span in another (or the same) trace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpanLink {
    pub trace_id: String,
    pub span_id: String,
    #[serde(default)]
    pub attributes: Vec<KeyValue>,
}

/// Attribute key paired with its typed value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,
    #[serde(default)]
    pub value: AnyValue,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: AnyValue) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// Typed attribute value.
///
/// On the wire this is a single-key object naming the type
/// (`{"stringValue": "GET"}`). An object with none of the known keys
/// decodes to [`AnyValue::Empty`]. Bytes stay in the base64 text form
/// OTLP/JSON uses for them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "AnyValueRepr", into = "AnyValueRepr")]
pub enum AnyValue {
    String(String),
    Int(i64),
    Double(f64),
    Bool(bool),
    Array(Vec<AnyValue>),
    KvList(Vec<KeyValue>),
    /// Base64-encoded
    Bytes(String),
    #[default]
    Empty,
}

impl From<&str> for AnyValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for AnyValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for AnyValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for AnyValue {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

impl From<bool> for AnyValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

#[derive(Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnyValueRepr {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    string_value: Option<String>,
    #[serde(
        default,
        deserialize_with = "de_opt_i64",
        skip_serializing_if = "Option::is_none"
    )]
    int_value: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    double_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    bool_value: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    array_value: Option<ArrayValueRepr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    kvlist_value: Option<KvListRepr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    bytes_value: Option<String>,
}

#[derive(Default, Serialize, Deserialize)]
struct ArrayValueRepr {
    #[serde(default)]
    values: Vec<AnyValue>,
}

#[derive(Default, Serialize, Deserialize)]
struct KvListRepr {
    #[serde(default)]
    values: Vec<KeyValue>,
}

impl From<AnyValueRepr> for AnyValue {
    fn from(repr: AnyValueRepr) -> Self {
        if let Some(s) = repr.string_value {
            Self::String(s)
        } else if let Some(i) = repr.int_value {
            Self::Int(i)
        } else if let Some(d) = repr.double_value {
            Self::Double(d)
        } else if let Some(b) = repr.bool_value {
            Self::Bool(b)
        } else if let Some(a) = repr.array_value {
            Self::Array(a.values)
        } else if let Some(kv) = repr.kvlist_value {
            Self::KvList(kv.values)
        } else if let Some(b) = repr.bytes_value {
            Self::Bytes(b)
        } else {
            Self::Empty
        }
    }
}

impl From<AnyValue> for AnyValueRepr {
    fn from(value: AnyValue) -> Self {
        let mut repr = Self::default();
        match value {
            AnyValue::String(s) => repr.string_value = Some(s),
            AnyValue::Int(i) => repr.int_value = Some(i),
            AnyValue::Double(d) => repr.double_value = Some(d),
            AnyValue::Bool(b) => repr.bool_value = Some(b),
            AnyValue::Array(values) => repr.array_value = Some(ArrayValueRepr { values }),
            AnyValue::KvList(values) => repr.kvlist_value = Some(KvListRepr { values }),
            AnyValue::Bytes(b) => repr.bytes_value = Some(b),
            AnyValue::Empty => {}
        }
        repr
    }
}

// OTLP/JSON encodes 64-bit integers as decimal strings; some producers emit
// plain numbers instead. Accept both.

#[derive(Deserialize)]
#[serde(untagged)]
enum IntRepr<T> {
    Num(T),
    Str(String),
}

fn de_opt_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    match Option::<IntRepr<u64>>::deserialize(deserializer)? {
        None => Ok(None),
        Some(IntRepr::Num(n)) => Ok(Some(n)),
        Some(IntRepr::Str(s)) => s.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

fn de_opt_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    match Option::<IntRepr<i64>>::deserialize(deserializer)? {
        None => Ok(None),
        Some(IntRepr::Num(n)) => Ok(Some(n)),
        Some(IntRepr::Str(s)) => s.parse().map(Some).map_err(serde::de::Error::custom),
    }
}
