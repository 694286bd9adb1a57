//! Codec Registry: maps (schema kind, wire format) to an encode/decode pair.
//!
//! Lookup inspects the schema first and the format second. Registrations are
//! searched newest-first, so registering a binding for a kind that already has
//! one replaces it for every later lookup. Operations never hold bindings; the
//! dispatcher asks the registry at call time.

pub mod json;
mod msgpack;
mod raw;
pub(crate) mod scalar;
pub(crate) mod text;
pub(crate) mod tree;

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{DecodeError, EncodeError, UnsupportedFormatError};
use crate::options::CodecOptions;
use crate::schema::{SchemaId, SchemaSet};
use crate::types::Value;

// ---------------------------------------------------------------------------
// WireFormat
// ---------------------------------------------------------------------------

/// Serialized representation of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    /// Structured text.
    Json,
    /// Plain scalar text.
    Text,
    /// Raw byte payload.
    Bytes,
    /// Structured binary.
    MsgPack,
}

impl WireFormat {
    /// Media type conventionally used for the format.
    #[must_use]
    pub fn content_type(self) -> &'static str {
        match self {
            WireFormat::Json => "application/json",
            WireFormat::Text => "text/plain; charset=utf-8",
            WireFormat::Bytes => "application/octet-stream",
            WireFormat::MsgPack => "application/msgpack",
        }
    }
}

impl fmt::Display for WireFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WireFormat::Json => "json",
            WireFormat::Text => "text",
            WireFormat::Bytes => "bytes",
            WireFormat::MsgPack => "msgpack",
        })
    }
}

/// Error parsing a format name or media type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown wire format: {0}")]
pub struct UnknownFormat(pub String);

impl FromStr for WireFormat {
    type Err = UnknownFormat;

    /// Accepts short names (`json`) and media types (`application/json`),
    /// ignoring media type parameters.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let essence = s.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
        match essence.as_str() {
            "json" | "application/json" => Ok(WireFormat::Json),
            "text" | "text/plain" => Ok(WireFormat::Text),
            "bytes" | "application/octet-stream" => Ok(WireFormat::Bytes),
            "msgpack" | "application/msgpack" | "application/x-msgpack" => {
                Ok(WireFormat::MsgPack)
            }
            _ => Err(UnknownFormat(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// CodecBinding
// ---------------------------------------------------------------------------

/// Everything a codec needs besides the value: the schema arena and options.
#[derive(Debug, Clone, Copy)]
pub struct CodecContext<'a> {
    pub schemas: &'a SchemaSet,
    pub options: &'a CodecOptions,
}

impl<'a> CodecContext<'a> {
    #[must_use]
    pub fn new(schemas: &'a SchemaSet, options: &'a CodecOptions) -> Self {
        Self { schemas, options }
    }
}

/// Selects the schemas a registration applies to.
pub type KindPredicate = fn(&SchemaSet, SchemaId) -> bool;
pub type EncodeFn = fn(&CodecContext<'_>, &Value, SchemaId) -> Result<Bytes, EncodeError>;
pub type DecodeFn = fn(&CodecContext<'_>, &[u8], SchemaId) -> Result<Value, DecodeError>;

/// Immutable encode/decode pair for one wire format.
#[derive(Clone, Copy)]
pub struct CodecBinding {
    format: WireFormat,
    encode: EncodeFn,
    decode: DecodeFn,
}

impl CodecBinding {
    #[must_use]
    pub fn format(&self) -> WireFormat {
        self.format
    }

    /// Encodes a value. Total for values that conform to the schema.
    ///
    /// # Errors
    ///
    /// Returns an [`EncodeError`] if `value` does not conform.
    pub fn encode(
        &self,
        cx: &CodecContext<'_>,
        value: &Value,
        id: SchemaId,
    ) -> Result<Bytes, EncodeError> {
        (self.encode)(cx, value, id)
    }

    /// Decodes a wire payload.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] with the path and reason of the first
    /// nonconforming sub-value.
    pub fn decode(
        &self,
        cx: &CodecContext<'_>,
        raw: &[u8],
        id: SchemaId,
    ) -> Result<Value, DecodeError> {
        (self.decode)(cx, raw, id)
    }
}

impl fmt::Debug for CodecBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecBinding")
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// CodecRegistry
// ---------------------------------------------------------------------------

struct Registration {
    predicate: KindPredicate,
    binding: CodecBinding,
}

/// Registry of codec bindings. Built once, then shared read-only.
pub struct CodecRegistry {
    registrations: Vec<Registration>,
}

fn any_kind(_: &SchemaSet, _: SchemaId) -> bool {
    true
}

impl CodecRegistry {
    /// A registry with no bindings.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            registrations: Vec::new(),
        }
    }

    /// A registry with the built-in bindings:
    /// JSON, `MessagePack` and raw bytes for every kind, text for
    /// scalar-shaped schemas.
    #[must_use]
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(
            WireFormat::Json,
            any_kind,
            json::encode_binding,
            json::decode_binding,
        );
        registry.register(
            WireFormat::MsgPack,
            any_kind,
            msgpack::encode_binding,
            msgpack::decode_binding,
        );
        registry.register(
            WireFormat::Text,
            text::text_capable,
            text::encode_binding,
            text::decode_binding,
        );
        registry.register(
            WireFormat::Bytes,
            any_kind,
            raw::encode_binding,
            raw::decode_binding,
        );
        registry
    }

    /// Registers a binding for the schemas matching `predicate` in `format`.
    pub fn register(
        &mut self,
        format: WireFormat,
        predicate: KindPredicate,
        encode: EncodeFn,
        decode: DecodeFn,
    ) {
        tracing::debug!(%format, "registering codec binding");
        self.registrations.push(Registration {
            predicate,
            binding: CodecBinding {
                format,
                encode,
                decode,
            },
        });
    }

    /// Finds the binding for a schema in a format.
    ///
    /// # Errors
    ///
    /// Returns [`UnsupportedFormatError`] if no registration matches.
    pub fn codec_for(
        &self,
        schemas: &SchemaSet,
        id: SchemaId,
        format: WireFormat,
    ) -> Result<CodecBinding, UnsupportedFormatError> {
        self.registrations
            .iter()
            .rev()
            .filter(|r| (r.predicate)(schemas, id))
            .find(|r| r.binding.format == format)
            .map(|r| r.binding)
            .ok_or_else(|| UnsupportedFormatError {
                kind: schemas.get(id).kind.name(),
                format,
            })
    }

    #[must_use]
    pub fn supports(&self, schemas: &SchemaSet, id: SchemaId, format: WireFormat) -> bool {
        self.codec_for(schemas, id, format).is_ok()
    }

    /// Picks the first format in `accepted` that the schema supports, falling
    /// back to `fallback` when none does (or `accepted` is empty).
    ///
    /// # Errors
    ///
    /// Returns [`UnsupportedFormatError`] if the fallback is not supported either.
    pub fn negotiate(
        &self,
        schemas: &SchemaSet,
        id: SchemaId,
        accepted: &[WireFormat],
        fallback: WireFormat,
    ) -> Result<WireFormat, UnsupportedFormatError> {
        accepted
            .iter()
            .copied()
            .find(|f| self.supports(schemas, id, *f))
            .map_or_else(
                || self.codec_for(schemas, id, fallback).map(|b| b.format()),
                Ok,
            )
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecRegistry")
            .field(
                "formats",
                &self
                    .registrations
                    .iter()
                    .map(|r| r.binding.format)
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Checks that a value conforms to a schema without keeping the encoding.
///
/// # Errors
///
/// Returns the [`EncodeError`] describing the first nonconforming sub-value.
pub fn conforms(schemas: &SchemaSet, id: SchemaId, value: &Value) -> Result<(), EncodeError> {
    let options = CodecOptions::default();
    let cx = CodecContext::new(schemas, &options);
    json::to_json(&cx, value, id).map(|_| ())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use chrono::DateTime;
    use proptest::prelude::*;
    use serde_json::json;

    use super::*;
    use crate::descriptor::TypeDescriptor;
    use crate::error::{DecodeReason, PathSegment};
    use crate::options::AbsentPolicy;
    use crate::resolver::SchemaResolver;
    use crate::schema::Constraints;

    fn resolve(descriptor: &TypeDescriptor) -> (Arc<SchemaSet>, SchemaId) {
        let mut r = SchemaResolver::new();
        let id = r.resolve(descriptor).unwrap();
        (r.finish(), id)
    }

    fn decode_json(
        set: &SchemaSet,
        id: SchemaId,
        options: &CodecOptions,
        body: &serde_json::Value,
    ) -> Result<Value, DecodeError> {
        let registry = CodecRegistry::new();
        let cx = CodecContext::new(set, options);
        registry
            .codec_for(set, id, WireFormat::Json)
            .unwrap()
            .decode(&cx, body.to_string().as_bytes(), id)
    }

    fn order() -> TypeDescriptor {
        let line = TypeDescriptor::structure("Line")
            .field("sku", TypeDescriptor::string())
            .field(
                "qty",
                TypeDescriptor::int().constrained(Constraints::default().minimum(1.0)),
            )
            .build();
        TypeDescriptor::structure("Order")
            .field("lines", TypeDescriptor::array(line))
            .optional_field("note", TypeDescriptor::optional(TypeDescriptor::string()))
            .build()
    }

    // ------ registry ------

    #[test]
    fn wire_format_parses_names_and_media_types() {
        assert_eq!("json".parse::<WireFormat>().unwrap(), WireFormat::Json);
        assert_eq!(
            "application/json; charset=utf-8".parse::<WireFormat>().unwrap(),
            WireFormat::Json
        );
        assert_eq!(
            "application/x-msgpack".parse::<WireFormat>().unwrap(),
            WireFormat::MsgPack
        );
        assert!("image/png".parse::<WireFormat>().is_err());
    }

    #[test]
    fn text_has_no_codec_for_objects() {
        let (set, id) = resolve(&order());
        let err = CodecRegistry::new()
            .codec_for(&set, id, WireFormat::Text)
            .unwrap_err();
        assert_eq!(err.kind, "object");
        assert_eq!(err.format, WireFormat::Text);
        assert!(CodecRegistry::empty()
            .codec_for(&set, id, WireFormat::Json)
            .is_err());
    }

    fn shout_encode(_: &CodecContext<'_>, value: &Value, _: SchemaId) -> Result<Bytes, EncodeError> {
        Ok(Bytes::from(value.as_str().unwrap_or_default().to_uppercase()))
    }

    fn shout_decode(_: &CodecContext<'_>, raw: &[u8], _: SchemaId) -> Result<Value, DecodeError> {
        Ok(Value::String(String::from_utf8_lossy(raw).to_lowercase()))
    }

    fn is_string(set: &SchemaSet, id: SchemaId) -> bool {
        matches!(
            set.get(id).kind,
            crate::schema::SchemaKind::Primitive(crate::schema::Primitive::String)
        )
    }

    #[test]
    fn newest_registration_wins() {
        let (set, id) = resolve(&TypeDescriptor::string());
        let mut registry = CodecRegistry::new();
        registry.register(WireFormat::Text, is_string, shout_encode, shout_decode);

        let options = CodecOptions::default();
        let cx = CodecContext::new(&set, &options);
        let binding = registry.codec_for(&set, id, WireFormat::Text).unwrap();
        assert_eq!(
            binding.encode(&cx, &Value::from("hi"), id).unwrap(),
            Bytes::from("HI")
        );

        // Other kinds still reach the built-in text codec.
        let (ints, int_id) = resolve(&TypeDescriptor::int());
        let cx = CodecContext::new(&ints, &options);
        let binding = registry.codec_for(&ints, int_id, WireFormat::Text).unwrap();
        assert_eq!(binding.decode(&cx, b"42", int_id).unwrap(), Value::Int(42));
    }

    #[test]
    fn negotiate_picks_first_supported() {
        let registry = CodecRegistry::new();
        let (set, id) = resolve(&order());
        assert_eq!(
            registry
                .negotiate(&set, id, &[WireFormat::Text, WireFormat::MsgPack], WireFormat::Json)
                .unwrap(),
            WireFormat::MsgPack
        );
        assert_eq!(
            registry
                .negotiate(&set, id, &[WireFormat::Text], WireFormat::Json)
                .unwrap(),
            WireFormat::Json
        );
        assert!(registry
            .negotiate(&set, id, &[], WireFormat::Text)
            .is_err());
    }

    // ------ structured decode ------

    #[test]
    fn decode_error_carries_nested_path() {
        let (set, id) = resolve(&order());
        let body = json!({"lines": [{"sku": "a", "qty": 1}, {"sku": "b", "qty": 0}]});
        let err = decode_json(&set, id, &CodecOptions::default(), &body).unwrap_err();
        assert_eq!(err.reason, DecodeReason::ConstraintViolation);
        assert_eq!(
            err.path,
            vec![
                PathSegment::field("lines"),
                PathSegment::Index(1),
                PathSegment::field("qty")
            ]
        );
        assert_eq!(
            err.to_string(),
            "constraint-violation at lines[1].qty: minimum value: 1"
        );
    }

    #[test]
    fn missing_required_field_is_reported() {
        let (set, id) = resolve(&order());
        let body = json!({"lines": [{"qty": 2}]});
        let err = decode_json(&set, id, &CodecOptions::default(), &body).unwrap_err();
        assert_eq!(err.reason, DecodeReason::MissingRequiredField);
        assert_eq!(crate::error::display_path(&err.path), "lines[0].sku");
    }

    #[test]
    fn malformed_json_is_a_root_mismatch() {
        let (set, id) = resolve(&order());
        let options = CodecOptions::default();
        let cx = CodecContext::new(&set, &options);
        let err = CodecRegistry::new()
            .codec_for(&set, id, WireFormat::Json)
            .unwrap()
            .decode(&cx, b"{\"lines\": [", id)
            .unwrap_err();
        assert_eq!(err.reason, DecodeReason::TypeMismatch);
        assert!(err.path.is_empty());
    }

    #[test]
    fn absent_and_null_survive_round_trip() {
        let (set, id) = resolve(&order());
        let options = CodecOptions::default();
        let cx = CodecContext::new(&set, &options);

        let absent = json!({"lines": []});
        let value = json::from_json(&cx, &absent, id).unwrap();
        assert_eq!(value.get("note"), None);
        assert_eq!(json::to_json(&cx, &value, id).unwrap(), absent);

        let null = json!({"lines": [], "note": null});
        let value = json::from_json(&cx, &null, id).unwrap();
        assert_eq!(value.get("note"), Some(&Value::Null));
        assert_eq!(json::to_json(&cx, &value, id).unwrap(), null);
    }

    #[test]
    fn absent_policy_null_records_explicit_null() {
        let (set, id) = resolve(&order());
        let options = CodecOptions {
            absent: AbsentPolicy::Null,
            ..CodecOptions::default()
        };
        let value = decode_json(&set, id, &options, &json!({"lines": []})).unwrap();
        assert_eq!(value.get("note"), Some(&Value::Null));
    }

    #[test]
    fn absent_field_takes_declared_default() {
        let (set, id) = resolve(
            &TypeDescriptor::structure("Query")
                .optional_field(
                    "limit",
                    TypeDescriptor::optional_with_default(TypeDescriptor::int(), 20),
                )
                .build(),
        );
        let value = decode_json(&set, id, &CodecOptions::default(), &json!({})).unwrap();
        assert_eq!(value.get("limit"), Some(&Value::Int(20)));
    }

    #[test]
    fn unknown_fields_are_ignored_unless_denied() {
        let (set, id) = resolve(&order());
        let body = json!({"lines": [], "extra": 1});
        assert!(decode_json(&set, id, &CodecOptions::default(), &body).is_ok());
        let strict = CodecOptions {
            deny_unknown_fields: true,
            ..CodecOptions::default()
        };
        let err = decode_json(&set, id, &strict, &body).unwrap_err();
        assert_eq!(err.path, vec![PathSegment::field("extra")]);
    }

    #[test]
    fn integral_float_decodes_as_int() {
        let (set, id) = resolve(&TypeDescriptor::int());
        let options = CodecOptions::default();
        assert_eq!(decode_json(&set, id, &options, &json!(3.0)).unwrap(), Value::Int(3));
        let err = decode_json(&set, id, &options, &json!(3.5)).unwrap_err();
        assert_eq!(err.reason, DecodeReason::TypeMismatch);
    }

    #[test]
    fn datetime_encodes_canonically() {
        let (set, id) = resolve(&TypeDescriptor::datetime());
        let options = CodecOptions::default();
        let cx = CodecContext::new(&set, &options);
        let value = decode_json(&set, id, &options, &json!("2021-03-04T05:06:07+01:00")).unwrap();
        assert_eq!(
            json::to_json(&cx, &value, id).unwrap(),
            json!("2021-03-04T04:06:07Z")
        );
    }

    #[test]
    fn tagged_union_selects_by_tag() {
        let circle = TypeDescriptor::structure("Circle")
            .field("type", TypeDescriptor::enumeration(["circle"]))
            .field("radius", TypeDescriptor::float())
            .build();
        let square = TypeDescriptor::structure("Square")
            .field("type", TypeDescriptor::enumeration(["square"]))
            .field("side", TypeDescriptor::float())
            .build();
        let (set, id) = resolve(&TypeDescriptor::tagged_union("type", vec![circle, square]));
        let options = CodecOptions::default();

        let value =
            decode_json(&set, id, &options, &json!({"type": "square", "side": 2.5})).unwrap();
        assert_eq!(value.get("side"), Some(&Value::Float(2.5)));

        let err = decode_json(&set, id, &options, &json!({"type": "hexagon"})).unwrap_err();
        assert_eq!(err.reason, DecodeReason::UnknownDiscriminator);
        assert_eq!(err.path, vec![PathSegment::field("type")]);

        let err = decode_json(&set, id, &options, &json!({"side": 1})).unwrap_err();
        assert_eq!(err.reason, DecodeReason::MissingRequiredField);
    }

    #[test]
    fn untagged_union_tries_variants_in_order() {
        let (set, id) = resolve(&TypeDescriptor::union(vec![
            TypeDescriptor::int(),
            TypeDescriptor::string(),
        ]));
        let options = CodecOptions::default();
        assert_eq!(decode_json(&set, id, &options, &json!(7)).unwrap(), Value::Int(7));
        assert_eq!(
            decode_json(&set, id, &options, &json!("7")).unwrap(),
            Value::from("7")
        );
        assert!(decode_json(&set, id, &options, &json!(true)).is_err());
    }

    #[test]
    fn mapping_keys_use_text_form() {
        let (set, id) = resolve(&TypeDescriptor::mapping(
            TypeDescriptor::int(),
            TypeDescriptor::bool(),
        ));
        let options = CodecOptions::default();
        let value = decode_json(&set, id, &options, &json!({"1": true})).unwrap();
        assert_eq!(value, Value::Map(vec![(Value::Int(1), Value::Bool(true))]));
        let err = decode_json(&set, id, &options, &json!({"x": true})).unwrap_err();
        assert_eq!(err.path, vec![PathSegment::field("x")]);
    }

    // ------ other formats ------

    #[test]
    fn msgpack_round_trips_bytes_natively() {
        let (set, id) = resolve(
            &TypeDescriptor::structure("Blob")
                .field("data", TypeDescriptor::bytes())
                .build(),
        );
        let options = CodecOptions::default();
        let cx = CodecContext::new(&set, &options);
        let binding = CodecRegistry::new()
            .codec_for(&set, id, WireFormat::MsgPack)
            .unwrap();
        let value = Value::object([("data", Value::Bytes(vec![0, 159, 255]))]);
        let raw = binding.encode(&cx, &value, id).unwrap();
        assert_eq!(binding.decode(&cx, &raw, id).unwrap(), value);

        let mut trailing = raw.to_vec();
        trailing.push(0xc0);
        assert!(binding.decode(&cx, &trailing, id).is_err());
    }

    #[test]
    fn text_codec_handles_scalar_arrays() {
        let (set, id) = resolve(&TypeDescriptor::array(TypeDescriptor::string()));
        let options = CodecOptions::default();
        let cx = CodecContext::new(&set, &options);
        let binding = CodecRegistry::new()
            .codec_for(&set, id, WireFormat::Text)
            .unwrap();
        let value = Value::Array(vec![Value::from("a,b"), Value::from("c")]);
        let raw = binding.encode(&cx, &value, id).unwrap();
        assert_eq!(raw, Bytes::from("\"a,b\",c"));
        assert_eq!(binding.decode(&cx, &raw, id).unwrap(), value);
    }

    #[test]
    fn raw_codec_passes_bytes_through() {
        let (set, id) = resolve(&TypeDescriptor::bytes());
        let options = CodecOptions::default();
        let cx = CodecContext::new(&set, &options);
        let binding = CodecRegistry::new()
            .codec_for(&set, id, WireFormat::Bytes)
            .unwrap();
        assert_eq!(
            binding.decode(&cx, &[1, 2, 3], id).unwrap(),
            Value::Bytes(vec![1, 2, 3])
        );
    }

    #[test]
    fn raw_codec_covers_every_kind() {
        let options = CodecOptions::default();
        let registry = CodecRegistry::new();
        for (descriptor, value, wire) in [
            (TypeDescriptor::int(), Value::Int(-12), &b"-12"[..]),
            (TypeDescriptor::bool(), Value::Bool(true), &b"true"[..]),
            (TypeDescriptor::string(), Value::from("héllo"), "héllo".as_bytes()),
            (
                TypeDescriptor::enumeration(["red", "blue"]),
                Value::from("blue"),
                &b"blue"[..],
            ),
            (
                TypeDescriptor::array(TypeDescriptor::int()),
                Value::Array(vec![Value::Int(1), Value::Int(2)]),
                &b"[1,2]"[..],
            ),
            (
                TypeDescriptor::optional(TypeDescriptor::string()),
                Value::from(""),
                &b"\"\""[..],
            ),
            (
                TypeDescriptor::optional(TypeDescriptor::string()),
                Value::Null,
                &b"null"[..],
            ),
        ] {
            let (set, id) = resolve(&descriptor);
            let cx = CodecContext::new(&set, &options);
            let binding = registry.codec_for(&set, id, WireFormat::Bytes).unwrap();
            let raw = binding.encode(&cx, &value, id).unwrap();
            assert_eq!(&raw[..], wire);
            assert_eq!(binding.decode(&cx, &raw, id).unwrap(), value);
        }

        let (set, id) = resolve(&order());
        let cx = CodecContext::new(&set, &options);
        let err = registry
            .codec_for(&set, id, WireFormat::Bytes)
            .unwrap()
            .decode(&cx, br#"{"lines": [{"sku": "a", "qty": 0}]}"#, id)
            .unwrap_err();
        assert_eq!(crate::error::display_path(&err.path), "lines[0].qty");
    }

    #[test]
    fn text_form_requires_textually_disjoint_variants() {
        let registry = CodecRegistry::new();
        let (set, id) = resolve(&TypeDescriptor::union(vec![
            TypeDescriptor::int(),
            TypeDescriptor::string(),
        ]));
        assert!(!registry.supports(&set, id, WireFormat::Text));
        assert!(registry.supports(&set, id, WireFormat::Json));

        // A literal spelled like a number collides with the int variant.
        let (set, id) = resolve(&TypeDescriptor::union(vec![
            TypeDescriptor::int(),
            TypeDescriptor::enumeration(["7"]),
        ]));
        assert!(!registry.supports(&set, id, WireFormat::Text));

        let mut r = SchemaResolver::new();
        let err = r
            .resolve(&TypeDescriptor::mapping(
                TypeDescriptor::union(vec![TypeDescriptor::int(), TypeDescriptor::string()]),
                TypeDescriptor::bool(),
            ))
            .unwrap_err();
        assert!(err.to_string().contains("no text form"));

        let (set, id) = resolve(&TypeDescriptor::union(vec![
            TypeDescriptor::int(),
            TypeDescriptor::bool(),
            TypeDescriptor::enumeration(["red", "blue"]),
        ]));
        let options = CodecOptions::default();
        let cx = CodecContext::new(&set, &options);
        let binding = registry.codec_for(&set, id, WireFormat::Text).unwrap();
        for value in [Value::Int(7), Value::Bool(false), Value::from("red")] {
            let raw = binding.encode(&cx, &value, id).unwrap();
            assert_eq!(binding.decode(&cx, &raw, id).unwrap(), value);
        }
        let err = binding.decode(&cx, b"1.5", id).unwrap_err();
        assert_eq!(err.reason, DecodeReason::TypeMismatch);
        assert_eq!(err.message, "expecting int; got \"1.5\"");
    }

    #[test]
    fn text_keeps_present_empty_distinct_from_null() {
        let options = CodecOptions::default();
        let registry = CodecRegistry::new();
        for (descriptor, value, wire) in [
            (TypeDescriptor::optional(TypeDescriptor::string()), Value::Null, ""),
            (
                TypeDescriptor::optional(TypeDescriptor::string()),
                Value::from(""),
                "\"\"",
            ),
            (
                TypeDescriptor::optional(TypeDescriptor::string()),
                Value::from("\"x\""),
                "\"\"\"x\"\"\"",
            ),
            (
                TypeDescriptor::optional(TypeDescriptor::string()),
                Value::from("\"a\",b"),
                "\"a\",b",
            ),
            (
                TypeDescriptor::optional(TypeDescriptor::array(TypeDescriptor::string())),
                Value::Array(vec![]),
                "\"\"",
            ),
            (
                TypeDescriptor::array(TypeDescriptor::optional(TypeDescriptor::string())),
                Value::Array(vec![Value::Null, Value::from("")]),
                ",\"\"\"\"\"\"",
            ),
        ] {
            let (set, id) = resolve(&descriptor);
            let cx = CodecContext::new(&set, &options);
            let binding = registry.codec_for(&set, id, WireFormat::Text).unwrap();
            let raw = binding.encode(&cx, &value, id).unwrap();
            assert_eq!(raw, Bytes::from(wire));
            assert_eq!(binding.decode(&cx, &raw, id).unwrap(), value);
        }
    }

    #[test]
    fn untagged_union_keeps_the_variant_error() {
        let line = TypeDescriptor::structure("Line")
            .field(
                "qty",
                TypeDescriptor::int().constrained(Constraints::default().minimum(1.0)),
            )
            .build();
        let (set, id) = resolve(&TypeDescriptor::array(TypeDescriptor::union(vec![
            line,
            TypeDescriptor::string(),
        ])));
        let options = CodecOptions::default();

        let err = decode_json(&set, id, &options, &json!(["a", {"qty": 0}])).unwrap_err();
        assert_eq!(err.reason, DecodeReason::ConstraintViolation);
        assert_eq!(crate::error::display_path(&err.path), "[1].qty");

        let err = decode_json(&set, id, &options, &json!([{"qty": "x"}])).unwrap_err();
        assert_eq!(err.reason, DecodeReason::TypeMismatch);
        assert_eq!(crate::error::display_path(&err.path), "[0].qty");

        let err = decode_json(&set, id, &options, &json!([true])).unwrap_err();
        assert_eq!(err.reason, DecodeReason::TypeMismatch);
        assert_eq!(err.path, vec![PathSegment::Index(0)]);
        assert_eq!(err.message, "expecting string, object; got bool");

        let cx = CodecContext::new(&set, &options);
        let bad = Value::Array(vec![Value::object([("qty", Value::Int(0))])]);
        let err = json::to_json(&cx, &bad, id).unwrap_err();
        assert_eq!(crate::error::display_path(&err.path), "[0].qty");
    }

    #[test]
    fn decimal_travels_as_string() {
        let (set, id) = resolve(
            &TypeDescriptor::decimal().constrained(Constraints::default().maximum(100.0)),
        );
        let options = CodecOptions::default();
        let cx = CodecContext::new(&set, &options);
        let value = decode_json(&set, id, &options, &json!("12.50")).unwrap();
        assert_eq!(value, Value::Decimal("12.50".parse().unwrap()));
        assert_eq!(json::to_json(&cx, &value, id).unwrap(), json!("12.50"));

        let err = decode_json(&set, id, &options, &json!(12.5)).unwrap_err();
        assert_eq!(err.reason, DecodeReason::TypeMismatch);
        let err = decode_json(&set, id, &options, &json!("twelve")).unwrap_err();
        assert_eq!(err.reason, DecodeReason::TypeMismatch);
        let err = decode_json(&set, id, &options, &json!("100.5")).unwrap_err();
        assert_eq!(err.reason, DecodeReason::ConstraintViolation);

        let exact = Value::Decimal("0.10000000000000000000001".parse().unwrap());
        let registry = CodecRegistry::new();
        for format in [WireFormat::Text, WireFormat::MsgPack, WireFormat::Bytes] {
            let binding = registry.codec_for(&set, id, format).unwrap();
            let raw = binding.encode(&cx, &exact, id).unwrap();
            assert_eq!(binding.decode(&cx, &raw, id).unwrap(), exact);
        }
    }

    #[test]
    fn sets_encode_sorted_and_reject_duplicates() {
        let (set, id) = resolve(&TypeDescriptor::set(TypeDescriptor::string()));
        let options = CodecOptions::default();
        let cx = CodecContext::new(&set, &options);
        let value = Value::Array(vec![Value::from("c"), Value::from("a"), Value::from("b")]);
        assert_eq!(json::to_json(&cx, &value, id).unwrap(), json!(["a", "b", "c"]));
        let text = CodecRegistry::new()
            .codec_for(&set, id, WireFormat::Text)
            .unwrap();
        assert_eq!(text.encode(&cx, &value, id).unwrap(), Bytes::from("a,b,c"));

        let err = decode_json(&set, id, &options, &json!(["a", "a"])).unwrap_err();
        assert_eq!(err.reason, DecodeReason::ConstraintViolation);
        assert_eq!(err.message, "items are not unique");
        let dup = Value::Array(vec![Value::from("a"), Value::from("a")]);
        assert!(json::to_json(&cx, &dup, id).is_err());

        let doc = serde_json::to_value(set.describe(id)).unwrap();
        assert_eq!(doc["unique_items"], json!(true));
    }

    #[test]
    fn json_fields_follow_declaration_order() {
        let (set, id) = resolve(
            &TypeDescriptor::structure("Reading")
                .field("zeta", TypeDescriptor::int())
                .field("alpha", TypeDescriptor::int())
                .field("mid", TypeDescriptor::int())
                .build(),
        );
        let options = CodecOptions::default();
        let cx = CodecContext::new(&set, &options);
        let value = Value::object([
            ("alpha", Value::Int(2)),
            ("mid", Value::Int(3)),
            ("zeta", Value::Int(1)),
        ]);
        let raw = CodecRegistry::new()
            .codec_for(&set, id, WireFormat::Json)
            .unwrap()
            .encode(&cx, &value, id)
            .unwrap();
        assert_eq!(raw, Bytes::from(r#"{"zeta":1,"alpha":2,"mid":3}"#));
    }

    #[test]
    fn conforms_reports_nonconforming_values() {
        let (set, id) = resolve(&order());
        assert!(conforms(&set, id, &Value::object([("lines", Value::Array(vec![]))])).is_ok());
        let err = conforms(&set, id, &Value::object([("lines", Value::Int(1))])).unwrap_err();
        assert_eq!(err.path, vec![PathSegment::field("lines")]);
    }

    // ------ round-trip properties ------

    fn record() -> TypeDescriptor {
        TypeDescriptor::structure("Record")
            .field("id", TypeDescriptor::uuid())
            .field("name", TypeDescriptor::string())
            .field("count", TypeDescriptor::int())
            .field("ratio", TypeDescriptor::float())
            .field("tags", TypeDescriptor::array(TypeDescriptor::string()))
            .field("blob", TypeDescriptor::bytes())
            .field("at", TypeDescriptor::datetime())
            .field("kind", TypeDescriptor::enumeration(["a", "b"]))
            .field(
                "scores",
                TypeDescriptor::mapping(TypeDescriptor::string(), TypeDescriptor::int()),
            )
            .optional_field("note", TypeDescriptor::optional(TypeDescriptor::string()))
            .build()
    }

    prop_compose! {
        fn arb_record()(
            id in any::<u128>(),
            name in ".*",
            count in any::<i64>(),
            quarters in -1_000_000i32..1_000_000,
            tags in proptest::collection::vec(".*", 0..4),
            blob in proptest::collection::vec(any::<u8>(), 0..16),
            secs in 0i64..4_000_000_000,
            nanos in 0u32..1_000_000_000,
            kind in prop_oneof![Just("a"), Just("b")],
            scores in proptest::collection::btree_map("[a-z]{1,4}", any::<i64>(), 0..3),
            note in proptest::option::of(proptest::option::of(".*")),
        ) -> Value {
            let mut fields = vec![
                ("id", Value::Uuid(uuid::Uuid::from_u128(id))),
                ("name", Value::String(name)),
                ("count", Value::Int(count)),
                ("ratio", Value::Float(f64::from(quarters) / 4.0)),
                ("tags", tags.into_iter().map(Value::String).collect()),
                ("blob", Value::Bytes(blob)),
                (
                    "at",
                    Value::DateTime(DateTime::from_timestamp(secs, nanos).unwrap_or_default()),
                ),
                ("kind", Value::from(kind)),
                (
                    "scores",
                    Value::Map(
                        scores
                            .into_iter()
                            .map(|(k, v)| (Value::String(k), Value::Int(v)))
                            .collect(),
                    ),
                ),
            ];
            match note {
                Some(Some(text)) => fields.push(("note", Value::String(text))),
                Some(None) => fields.push(("note", Value::Null)),
                None => {}
            }
            Value::object(fields)
        }
    }

    /// Encodes in each format and checks the decode gives back `expected`.
    fn round_trips_in(
        formats: &[WireFormat],
        descriptor: &TypeDescriptor,
        value: &Value,
        expected: &Value,
    ) -> Result<(), TestCaseError> {
        let (set, id) = resolve(descriptor);
        let options = CodecOptions::default();
        let cx = CodecContext::new(&set, &options);
        let registry = CodecRegistry::new();
        for format in formats {
            let binding = registry.codec_for(&set, id, *format).unwrap();
            let raw = binding.encode(&cx, value, id).unwrap();
            prop_assert_eq!(&binding.decode(&cx, &raw, id).unwrap(), expected, "{}", format);
        }
        Ok(())
    }

    const ALL_FORMATS: [WireFormat; 4] = [
        WireFormat::Json,
        WireFormat::MsgPack,
        WireFormat::Text,
        WireFormat::Bytes,
    ];
    const TREE_FORMATS: [WireFormat; 3] = [WireFormat::Json, WireFormat::MsgPack, WireFormat::Bytes];

    fn scalar_union() -> TypeDescriptor {
        TypeDescriptor::union(vec![
            TypeDescriptor::int(),
            TypeDescriptor::bool(),
            TypeDescriptor::enumeration(["red", "blue"]),
        ])
    }

    fn arb_scalar_union() -> impl Strategy<Value = Value> {
        prop_oneof![
            any::<i64>().prop_map(Value::Int),
            any::<bool>().prop_map(Value::Bool),
            prop_oneof![Just("red"), Just("blue")].prop_map(Value::from),
        ]
    }

    fn shapes() -> TypeDescriptor {
        let circle = TypeDescriptor::structure("Circle")
            .field("type", TypeDescriptor::enumeration(["circle"]))
            .field("radius", TypeDescriptor::float())
            .build();
        let square = TypeDescriptor::structure("Square")
            .field("type", TypeDescriptor::enumeration(["square"]))
            .field("side", TypeDescriptor::int())
            .build();
        TypeDescriptor::array(TypeDescriptor::tagged_union("type", vec![circle, square]))
    }

    fn arb_shape() -> impl Strategy<Value = Value> {
        prop_oneof![
            (-1.0e6f64..1.0e6).prop_map(|r| Value::object([
                ("type", Value::from("circle")),
                ("radius", Value::Float(r)),
            ])),
            any::<i64>().prop_map(|side| Value::object([
                ("type", Value::from("square")),
                ("side", Value::Int(side)),
            ])),
        ]
    }

    fn tree_node() -> TypeDescriptor {
        TypeDescriptor::structure("TreeNode")
            .field("value", TypeDescriptor::int())
            .optional_field(
                "label",
                TypeDescriptor::optional_with_default(TypeDescriptor::string(), "none"),
            )
            .field("children", TypeDescriptor::array(TypeDescriptor::lazy("TreeNode")))
            .build()
    }

    fn tree_value(value: i64, label: Option<Option<String>>, children: Vec<Value>) -> Value {
        let mut fields = vec![("value", Value::Int(value)), ("children", Value::Array(children))];
        match label {
            Some(Some(text)) => fields.push(("label", Value::String(text))),
            Some(None) => fields.push(("label", Value::Null)),
            None => {}
        }
        Value::object(fields)
    }

    fn arb_tree() -> impl Strategy<Value = Value> {
        let label = || proptest::option::of(proptest::option::of("[a-z]{0,6}"));
        let leaf = (any::<i64>(), label()).prop_map(|(v, l)| tree_value(v, l, Vec::new()));
        leaf.prop_recursive(3, 24, 4, move |inner| {
            (any::<i64>(), label(), proptest::collection::vec(inner, 0..4))
                .prop_map(|(v, l, children)| tree_value(v, l, children))
        })
    }

    /// What a decoder yields for a tree value: absent labels take the default.
    fn with_default_labels(value: &Value) -> Value {
        match value {
            Value::Array(items) => items.iter().map(with_default_labels).collect(),
            Value::Object(fields) => {
                let mut out: BTreeMap<String, Value> = fields
                    .iter()
                    .map(|(k, v)| (k.clone(), with_default_labels(v)))
                    .collect();
                out.entry("label".to_string())
                    .or_insert_with(|| Value::from("none"));
                Value::Object(out)
            }
            other => other.clone(),
        }
    }

    proptest! {
        #[test]
        fn structured_formats_round_trip(value in arb_record()) {
            let (set, id) = resolve(&record());
            let options = CodecOptions::default();
            let cx = CodecContext::new(&set, &options);
            let registry = CodecRegistry::new();
            for format in [WireFormat::Json, WireFormat::MsgPack] {
                let binding = registry.codec_for(&set, id, format).unwrap();
                let raw = binding.encode(&cx, &value, id).unwrap();
                prop_assert_eq!(&binding.decode(&cx, &raw, id).unwrap(), &value);
            }
        }

        #[test]
        fn text_arrays_round_trip(items in proptest::collection::vec(".*", 0..6)) {
            let (set, id) = resolve(&TypeDescriptor::array(TypeDescriptor::string()));
            let options = CodecOptions::default();
            let cx = CodecContext::new(&set, &options);
            let binding = CodecRegistry::new().codec_for(&set, id, WireFormat::Text).unwrap();
            let value = Value::Array(items.into_iter().map(Value::String).collect());
            let raw = binding.encode(&cx, &value, id).unwrap();
            prop_assert_eq!(binding.decode(&cx, &raw, id).unwrap(), value);
        }

        #[test]
        fn text_scalars_round_trip(n in any::<i64>(), secs in 0i64..4_000_000_000) {
            let options = CodecOptions::default();
            let registry = CodecRegistry::new();
            let at = DateTime::from_timestamp(secs, 0).unwrap_or_default();
            for (descriptor, value) in [
                (TypeDescriptor::int(), Value::Int(n)),
                (TypeDescriptor::datetime(), Value::DateTime(at)),
                (TypeDescriptor::optional(TypeDescriptor::int()), Value::Null),
            ] {
                let (set, id) = resolve(&descriptor);
                let cx = CodecContext::new(&set, &options);
                let binding = registry.codec_for(&set, id, WireFormat::Text).unwrap();
                let raw = binding.encode(&cx, &value, id).unwrap();
                prop_assert_eq!(binding.decode(&cx, &raw, id).unwrap(), value);
            }
        }

        #[test]
        fn untagged_scalar_unions_round_trip(value in arb_scalar_union()) {
            round_trips_in(&ALL_FORMATS, &scalar_union(), &value, &value)?;
        }

        #[test]
        fn tagged_unions_round_trip(items in proptest::collection::vec(arb_shape(), 0..4)) {
            let value = Value::Array(items);
            round_trips_in(&TREE_FORMATS, &shapes(), &value, &value)?;
        }

        #[test]
        fn recursive_schemas_round_trip_with_defaults(value in arb_tree()) {
            round_trips_in(&TREE_FORMATS, &tree_node(), &value, &with_default_labels(&value))?;
        }

        #[test]
        fn optionals_round_trip_everywhere(text in proptest::option::of(".*")) {
            let value = text.map_or(Value::Null, Value::String);
            round_trips_in(
                &ALL_FORMATS,
                &TypeDescriptor::optional(TypeDescriptor::string()),
                &value,
                &value,
            )?;
        }

        #[test]
        fn optional_lists_round_trip_everywhere(
            items in proptest::option::of(proptest::collection::vec(proptest::option::of(".*"), 0..4)),
        ) {
            let item = |text: Option<String>| text.map_or(Value::Null, Value::String);
            let value = items.map_or(Value::Null, |items| items.into_iter().map(item).collect());
            round_trips_in(
                &ALL_FORMATS,
                &TypeDescriptor::optional(TypeDescriptor::array(TypeDescriptor::optional(
                    TypeDescriptor::string(),
                ))),
                &value,
                &value,
            )?;
        }
    }
}
