//! JSON encoding and decoding for resource output.
//!
//! serde already knows how to encode plain data. What it cannot express on
//! its own is the fallback chain a response encoder needs for values the
//! base encoder has no rule for:
//!
//! 1. a type that provides its own representation ([`JsonSerializer`]),
//! 2. set-like collections, encoded as a list,
//! 3. timestamps, encoded as ISO-8601 strings,
//! 4. anything else fails with "not JSON serializable".
//!
//! [`Document`] is the value model that carries those cases to the
//! [`JsonCodec`], which turns it into bytes. Decoding goes the other way
//! through an object hook that is the identity unless replaced.

use std::any::type_name;
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::hash::BuildHasher;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Offset, SecondsFormat, TimeZone};
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::ser::Error as _;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::ser::PrettyFormatter;
use serde_json::{Map, Value};

// ── Errors ────────────────────────────────────────────────────────────────────

/// Encoding a [`Document`] failed.
#[derive(Debug, thiserror::Error)]
#[error("failed to encode JSON: {0}")]
pub struct EncodeError(#[from] serde_json::Error);

/// A request body was not valid JSON, or did not fit the requested type.
#[derive(Debug, thiserror::Error)]
#[error("failed to decode JSON: {0}")]
pub struct DecodeError(#[from] serde_json::Error);

// ── Custom representation capability ──────────────────────────────────────────

/// Implemented by domain types that pick their own JSON representation.
///
/// ```rust
/// use restle::{Document, JsonCodec, JsonSerializer};
/// use serde_json::json;
///
/// struct Secret { name: String, token: String }
///
/// impl JsonSerializer for Secret {
///     fn json_serializer(&self) -> Document {
///         json!({ "name": self.name }).into()
///     }
/// }
///
/// let doc = Document::custom(Secret { name: "db".into(), token: "hunter2".into() });
/// let out = JsonCodec::compact().encode(&doc).unwrap();
/// assert_eq!(out, br#"{"name":"db"}"#);
/// ```
pub trait JsonSerializer: Send + Sync {
    fn json_serializer(&self) -> Document;
}

// ── Document ──────────────────────────────────────────────────────────────────

/// A value on its way to the JSON encoder.
#[derive(Clone)]
pub enum Document {
    /// Plain JSON. `Value::Null` means "no body" to a resource.
    Json(Value),
    Array(Vec<Document>),
    /// Insertion-ordered object; keys are sorted at encode time when the
    /// codec asks for it.
    Object(IndexMap<String, Document>),
    /// Set-like collection. Encoded as a list in unspecified order.
    Set(Vec<Document>),
    /// Encoded with [`DateTime::to_rfc3339_opts`].
    Timestamp(DateTime<FixedOffset>),
    Custom(Arc<dyn JsonSerializer>),
    /// A value of the named type the encoder has no rule for.
    Opaque(&'static str),
    /// A value whose own `Serialize` impl failed, with serde's message.
    Invalid { type_name: &'static str, reason: String },
}

impl Document {
    pub fn custom<T: JsonSerializer + 'static>(value: T) -> Self {
        Self::Custom(Arc::new(value))
    }

    /// A `T` the encoder must refuse.
    pub fn opaque<T: ?Sized>() -> Self {
        Self::Opaque(type_name::<T>())
    }

    /// Goes through serde. A `Serialize` impl that fails yields a document
    /// that refuses to encode and carries serde's error.
    pub fn from_serde<T: Serialize + ?Sized>(value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(v) => Self::Json(v),
            Err(e) => Self::Invalid { type_name: type_name::<T>(), reason: e.to_string() },
        }
    }

    pub fn set<I>(items: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Document>,
    {
        Self::Set(items.into_iter().map(Into::into).collect())
    }

    /// `true` for JSON `null`, the only document that yields an empty body.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Json(Value::Null))
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json(v)      => f.debug_tuple("Json").field(v).finish(),
            Self::Array(v)     => f.debug_tuple("Array").field(v).finish(),
            Self::Object(v)    => f.debug_tuple("Object").field(v).finish(),
            Self::Set(v)       => f.debug_tuple("Set").field(v).finish(),
            Self::Timestamp(v) => f.debug_tuple("Timestamp").field(v).finish(),
            Self::Custom(_)    => f.write_str("Custom(..)"),
            Self::Opaque(name) => f.debug_tuple("Opaque").field(name).finish(),
            Self::Invalid { type_name, reason } => f
                .debug_struct("Invalid")
                .field("type_name", type_name)
                .field("reason", reason)
                .finish(),
        }
    }
}

impl From<Value> for Document {
    fn from(v: Value) -> Self { Self::Json(v) }
}

impl From<&str> for Document {
    fn from(v: &str) -> Self { Self::Json(Value::String(v.to_owned())) }
}

impl From<String> for Document {
    fn from(v: String) -> Self { Self::Json(Value::String(v)) }
}

impl From<i64> for Document {
    fn from(v: i64) -> Self { Self::Json(v.into()) }
}

impl From<bool> for Document {
    fn from(v: bool) -> Self { Self::Json(Value::Bool(v)) }
}

impl<T: Into<Document>> From<Vec<T>> for Document {
    fn from(v: Vec<T>) -> Self {
        Self::Array(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Document>> From<IndexMap<String, T>> for Document {
    fn from(v: IndexMap<String, T>) -> Self {
        Self::Object(v.into_iter().map(|(k, d)| (k, d.into())).collect())
    }
}

impl<T: Into<Document>, S: BuildHasher> From<HashSet<T, S>> for Document {
    fn from(v: HashSet<T, S>) -> Self { Self::set(v) }
}

impl<T: Into<Document>> From<BTreeSet<T>> for Document {
    fn from(v: BTreeSet<T>) -> Self { Self::set(v) }
}

impl<Tz: TimeZone> From<DateTime<Tz>> for Document {
    fn from(v: DateTime<Tz>) -> Self {
        let offset = v.offset().fix();
        Self::Timestamp(v.with_timezone(&offset))
    }
}

// ── Codec ─────────────────────────────────────────────────────────────────────

/// Serde view of [`JsonCodec`]'s options.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct JsonConfig {
    /// Spaces per indentation level; `None` writes compact JSON.
    pub indent: Option<usize>,
    pub sort_keys: bool,
}

impl Default for JsonConfig {
    fn default() -> Self {
        Self { indent: Some(4), sort_keys: true }
    }
}

type ObjectHook = Arc<dyn Fn(Map<String, Value>) -> Value + Send + Sync>;

/// Encoder/decoder pair used for resource bodies and error bodies.
///
/// Configured once on the [`Router`](crate::Router) and handed to every
/// request. The default writes 4-space indented JSON with sorted keys.
/// `sort_keys` governs [`Document::Object`] and objects inside
/// [`Document::Json`] alike; with it off both keep insertion order.
#[derive(Clone)]
pub struct JsonCodec {
    indent: Option<usize>,
    sort_keys: bool,
    object_hook: ObjectHook,
}

impl JsonCodec {
    pub fn from_config(config: JsonConfig) -> Self {
        Self {
            indent: config.indent,
            sort_keys: config.sort_keys,
            object_hook: Arc::new(Value::Object),
        }
    }

    /// No whitespace, sorted keys.
    pub fn compact() -> Self {
        Self::from_config(JsonConfig { indent: None, sort_keys: true })
    }

    /// Replaces the decoder's object hook. It runs on every decoded object,
    /// innermost first, and its result takes the object's place.
    pub fn with_object_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(Map<String, Value>) -> Value + Send + Sync + 'static,
    {
        self.object_hook = Arc::new(hook);
        self
    }

    pub fn config(&self) -> JsonConfig {
        JsonConfig { indent: self.indent, sort_keys: self.sort_keys }
    }

    pub fn encode(&self, doc: &Document) -> Result<Vec<u8>, EncodeError> {
        let encoding = Encoding { doc, sort_keys: self.sort_keys };
        let mut out = Vec::new();
        match self.indent {
            Some(width) => {
                let indent = vec![b' '; width];
                let formatter = PrettyFormatter::with_indent(&indent);
                let mut ser = serde_json::Serializer::with_formatter(&mut out, formatter);
                encoding.serialize(&mut ser)?;
            }
            None => {
                let mut ser = serde_json::Serializer::new(&mut out);
                encoding.serialize(&mut ser)?;
            }
        }
        Ok(out)
    }

    pub fn encode_value<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, EncodeError> {
        self.encode(&Document::Json(serde_json::to_value(value)?))
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<Value, DecodeError> {
        let value: Value = serde_json::from_slice(bytes)?;
        Ok(self.apply_hook(value))
    }

    pub fn decode_as<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, DecodeError> {
        Ok(serde_json::from_value(self.decode(bytes)?)?)
    }

    fn apply_hook(&self, value: Value) -> Value {
        match value {
            Value::Array(items) => {
                Value::Array(items.into_iter().map(|v| self.apply_hook(v)).collect())
            }
            Value::Object(map) => {
                let map = map.into_iter().map(|(k, v)| (k, self.apply_hook(v))).collect();
                (self.object_hook)(map)
            }
            other => other,
        }
    }
}

impl Default for JsonCodec {
    fn default() -> Self { Self::from_config(JsonConfig::default()) }
}

impl fmt::Debug for JsonCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonCodec")
            .field("indent", &self.indent)
            .field("sort_keys", &self.sort_keys)
            .finish_non_exhaustive()
    }
}

// ── Serialization ─────────────────────────────────────────────────────────────

struct Encoding<'a> {
    doc: &'a Document,
    sort_keys: bool,
}

/// Encodes a plain `Value` with the same key ordering rule as
/// `Document::Object`. Unsorted output relies on serde_json's
/// `preserve_order` map.
struct Plain<'a> {
    value: &'a Value,
    sort_keys: bool,
}

impl<'a> Encoding<'a> {
    fn child(&self, doc: &'a Document) -> Encoding<'a> {
        Encoding { doc, sort_keys: self.sort_keys }
    }
}

impl Serialize for Encoding<'_> {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        match self.doc {
            Document::Json(value) => Plain { value, sort_keys: self.sort_keys }.serialize(s),
            Document::Array(items) | Document::Set(items) => {
                s.collect_seq(items.iter().map(|d| self.child(d)))
            }
            Document::Object(map) => {
                let mut entries: Vec<_> = map.iter().collect();
                if self.sort_keys {
                    entries.sort_by(|a, b| a.0.cmp(b.0));
                }
                s.collect_map(entries.into_iter().map(|(k, d)| (k, self.child(d))))
            }
            Document::Timestamp(ts) => {
                s.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::AutoSi, false))
            }
            Document::Custom(custom) => {
                let doc = custom.json_serializer();
                Encoding { doc: &doc, sort_keys: self.sort_keys }.serialize(s)
            }
            Document::Opaque(name) => Err(S::Error::custom(format!(
                "Object of type {name} is not JSON serializable"
            ))),
            Document::Invalid { type_name, reason } => Err(S::Error::custom(format!(
                "Object of type {type_name} is not JSON serializable: {reason}"
            ))),
        }
    }
}

impl Serialize for Plain<'_> {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        let sort_keys = self.sort_keys;
        match self.value {
            Value::Array(items) => {
                s.collect_seq(items.iter().map(|value| Plain { value, sort_keys }))
            }
            Value::Object(map) => {
                let mut entries: Vec<_> = map.iter().collect();
                if sort_keys {
                    entries.sort_by(|a, b| a.0.cmp(b.0));
                }
                s.collect_map(entries.into_iter().map(|(k, value)| (k, Plain { value, sort_keys })))
            }
            scalar => scalar.serialize(s),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::NaiveDate;
    use serde_json::json;

    use super::*;

    struct Point { x: i64, y: i64 }

    impl JsonSerializer for Point {
        fn json_serializer(&self) -> Document {
            Document::from(vec![self.x, self.y])
        }
    }

    fn compact(doc: &Document) -> String {
        String::from_utf8(JsonCodec::compact().encode(doc).unwrap()).unwrap()
    }

    #[test]
    fn custom_representation_wins() {
        assert_eq!(compact(&Document::custom(Point { x: 1, y: 2 })), "[1,2]");
    }

    #[test]
    fn nested_custom_values() {
        let mut map = IndexMap::new();
        map.insert("origin".to_owned(), Document::custom(Point { x: 0, y: 0 }));
        assert_eq!(compact(&map.into()), r#"{"origin":[0,0]}"#);
    }

    #[test]
    fn sets_become_lists() {
        let set: HashSet<i64> = [3, 1, 2].into_iter().collect();
        let out: Value = serde_json::from_str(&compact(&set.into())).unwrap();
        let mut items: Vec<i64> = out
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_i64().unwrap())
            .collect();
        items.sort_unstable();
        assert_eq!(items, vec![1, 2, 3]);
    }

    #[test]
    fn timestamps_are_iso8601() {
        let ts = NaiveDate::from_ymd_opt(2013, 5, 11)
            .unwrap()
            .and_hms_opt(21, 23, 58)
            .unwrap()
            .and_utc();
        assert_eq!(compact(&ts.into()), r#""2013-05-11T21:23:58+00:00""#);
        let with_nanos = ts + chrono::Duration::milliseconds(250);
        assert_eq!(compact(&with_nanos.into()), r#""2013-05-11T21:23:58.250+00:00""#);
    }

    #[test]
    fn unknown_types_fail() {
        struct Socket;
        let err = JsonCodec::default().encode(&Document::opaque::<Socket>()).unwrap_err();
        assert!(err.to_string().contains("is not JSON serializable"), "{err}");
    }

    #[test]
    fn default_output_is_indented_and_sorted() {
        let mut map = IndexMap::new();
        map.insert("b".to_owned(), Document::from(1_i64));
        map.insert("a".to_owned(), Document::from(2_i64));
        let out = JsonCodec::default().encode(&map.into()).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "{\n    \"a\": 2,\n    \"b\": 1\n}");
    }

    #[test]
    fn unsorted_keeps_insertion_order() {
        let codec = JsonCodec::from_config(JsonConfig { indent: None, sort_keys: false });
        let mut map = IndexMap::new();
        map.insert("b".to_owned(), Document::from(1_i64));
        map.insert("a".to_owned(), Document::from(2_i64));
        assert_eq!(codec.encode(&map.into()).unwrap(), br#"{"b":1,"a":2}"#);
    }

    #[test]
    fn unsorted_plain_values_keep_source_order() {
        let codec = JsonCodec::from_config(JsonConfig { indent: None, sort_keys: false });
        let value: Value = serde_json::from_str(r#"{"b":1,"a":{"d":2,"c":3}}"#).unwrap();
        assert_eq!(codec.encode(&Document::Json(value.clone())).unwrap(), br#"{"b":1,"a":{"d":2,"c":3}}"#);
        assert_eq!(
            JsonCodec::compact().encode(&Document::Json(value)).unwrap(),
            br#"{"a":{"c":3,"d":2},"b":1}"#
        );
    }

    #[test]
    fn failing_serialize_keeps_serde_reason() {
        let tuple_keys = BTreeMap::from([((1, 2), "x")]);
        let doc = Document::from_serde(&tuple_keys);
        assert!(matches!(doc, Document::Invalid { .. }), "{doc:?}");
        let err = JsonCodec::compact().encode(&doc).unwrap_err().to_string();
        assert!(err.contains("is not JSON serializable: key must be a string"), "{err}");
    }

    #[test]
    fn decode_is_identity_by_default() {
        let value = JsonCodec::default().decode(br#"{"a":[{"b":1}]}"#).unwrap();
        assert_eq!(value, json!({"a": [{"b": 1}]}));
    }

    #[test]
    fn object_hook_runs_innermost_first() {
        let codec = JsonCodec::default().with_object_hook(|mut obj| {
            let depth = obj.values().filter_map(|v| v["depth"].as_i64()).max().unwrap_or(0);
            obj.insert("depth".to_owned(), json!(depth + 1));
            Value::Object(obj)
        });
        let value = codec.decode(br#"{"inner":{"x":1}}"#).unwrap();
        assert_eq!(value["inner"]["depth"], 1);
        assert_eq!(value["depth"], 2);
    }

    #[test]
    fn config_round_trips_through_serde() {
        let config: JsonConfig = serde_json::from_str(r#"{"indent":null}"#).unwrap();
        assert_eq!(config, JsonConfig { indent: None, sort_keys: true });
        assert_eq!(JsonCodec::from_config(config.clone()).config(), config);
    }
}
