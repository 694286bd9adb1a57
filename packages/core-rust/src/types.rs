use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generic runtime value flowing through codecs, handlers and storage adapters.
///
/// Supports every primitive a schema can describe plus the three container
/// shapes. An optional object field that was absent on the wire is represented
/// by the key being missing from [`Value::Object`], which keeps it distinct
/// from an explicit [`Value::Null`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Explicit null.
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed 64-bit integer.
    Int(i64),
    /// 64-bit IEEE 754 floating point.
    Float(f64),
    /// UTF-8 string.
    String(String),
    /// Opaque binary data.
    Bytes(Vec<u8>),
    /// Exact decimal number.
    Decimal(Decimal),
    /// Instant in time, normalized to UTC.
    DateTime(DateTime<Utc>),
    /// Calendar date without time zone.
    Date(NaiveDate),
    /// Universally unique identifier.
    Uuid(Uuid),
    /// Ordered sequence.
    Array(Vec<Value>),
    /// Mapping with arbitrary keys, in insertion order.
    Map(Vec<(Value, Value)>),
    /// Object with named fields.
    /// Uses `BTreeMap` for deterministic iteration order.
    Object(BTreeMap<String, Value>),
}

impl Value {
    /// Short name of the value's variant, used in diagnostics.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Decimal(_) => "decimal",
            Value::DateTime(_) => "datetime",
            Value::Date(_) => "date",
            Value::Uuid(_) => "uuid",
            Value::Array(_) => "array",
            Value::Map(_) => "mapping",
            Value::Object(_) => "object",
        }
    }

    /// Builds an object from `(name, value)` pairs.
    pub fn object<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Value::Object(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Numeric view used by bound checks. Integers and decimals widen to `f64`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Decimal(d) => d.to_f64(),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Object(fields) => Some(fields),
            _ => None,
        }
    }

    /// Looks up a field of an object value.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.as_object().and_then(|fields| fields.get(field))
    }

    /// Length used by `min_length`/`max_length` constraints, if the value has one.
    /// Strings count characters, not bytes.
    #[must_use]
    pub fn length(&self) -> Option<usize> {
        match self {
            Value::String(s) => Some(s.chars().count()),
            Value::Bytes(b) => Some(b.len()),
            Value::Array(items) => Some(items.len()),
            Value::Map(entries) => Some(entries.len()),
            Value::Object(fields) => Some(fields.len()),
            _ => None,
        }
    }

    /// Whether an array holds two equal items. Other values never do.
    #[must_use]
    pub fn has_duplicates(&self) -> bool {
        match self {
            Value::Array(items) => items
                .iter()
                .enumerate()
                .any(|(i, item)| items[..i].contains(item)),
            _ => false,
        }
    }

    /// Total order over values, used to emit set-like arrays canonically.
    ///
    /// Values of different kinds order by kind; ints and floats compare
    /// numerically with each other.
    #[must_use]
    pub fn total_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
                let (a, b) = (self.as_f64().unwrap_or(f64::NAN), other.as_f64().unwrap_or(f64::NAN));
                a.total_cmp(&b)
            }
            (Value::Decimal(a), Value::Decimal(b)) => a.cmp(b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Bytes(a), Value::Bytes(b)) => a.cmp(b),
            (Value::DateTime(a), Value::DateTime(b)) => a.cmp(b),
            (Value::Date(a), Value::Date(b)) => a.cmp(b),
            (Value::Uuid(a), Value::Uuid(b)) => a.cmp(b),
            (Value::Array(a), Value::Array(b)) => lexicographic(
                a.iter().zip(b).map(|(x, y)| x.total_cmp(y)),
                a.len().cmp(&b.len()),
            ),
            (Value::Map(a), Value::Map(b)) => lexicographic(
                a.iter()
                    .zip(b)
                    .map(|((ka, va), (kb, vb))| ka.total_cmp(kb).then_with(|| va.total_cmp(vb))),
                a.len().cmp(&b.len()),
            ),
            (Value::Object(a), Value::Object(b)) => lexicographic(
                a.iter()
                    .zip(b)
                    .map(|((ka, va), (kb, vb))| ka.cmp(kb).then_with(|| va.total_cmp(vb))),
                a.len().cmp(&b.len()),
            ),
            _ => self.rank().cmp(&other.rank()),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) | Value::Float(_) => 2,
            Value::Decimal(_) => 3,
            Value::String(_) => 4,
            Value::Bytes(_) => 5,
            Value::DateTime(_) => 6,
            Value::Date(_) => 7,
            Value::Uuid(_) => 8,
            Value::Array(_) => 9,
            Value::Map(_) => 10,
            Value::Object(_) => 11,
        }
    }
}

fn lexicographic(mut pairs: impl Iterator<Item = Ordering>, tail: Ordering) -> Ordering {
    pairs.find(|o| o.is_ne()).unwrap_or(tail)
}

// ---------------------------------------------------------------------------
// Decimal
// ---------------------------------------------------------------------------

/// Exact decimal number held as validated text, so no digit is lost to
/// binary floating point. The text is kept as written, minus a leading `+`.
///
/// Ordering is numeric; numbers that share an `f64` view fall back to their
/// text, so `1.0` and `1` are distinct values.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Decimal(String);

/// Text that is not a decimal number.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("expecting a string containing a decimal number; got {0:?}")]
pub struct ParseDecimalError(String);

impl Decimal {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Nearest `f64`, used for numeric bounds.
    #[must_use]
    pub fn to_f64(&self) -> Option<f64> {
        self.0.parse().ok()
    }
}

fn all_digits(s: &str) -> bool {
    s.bytes().all(|b| b.is_ascii_digit())
}

impl FromStr for Decimal {
    type Err = ParseDecimalError;

    /// Accepts `[+-]digits[.digits][e[+-]digits]`, with digits on at least
    /// one side of the point.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseDecimalError(s.to_string());
        let unsigned = s.strip_prefix(['+', '-']).unwrap_or(s);
        let (mantissa, exponent) = match unsigned.find(['e', 'E']) {
            Some(at) => (&unsigned[..at], Some(&unsigned[at + 1..])),
            None => (unsigned, None),
        };
        let (whole, fraction) = mantissa.split_once('.').unwrap_or((mantissa, ""));
        if whole.len() + fraction.len() == 0 || !all_digits(whole) || !all_digits(fraction) {
            return Err(invalid());
        }
        if let Some(exponent) = exponent {
            let digits = exponent
                .strip_prefix(['+', '-'])
                .unwrap_or(exponent);
            if digits.is_empty() || !all_digits(digits) {
                return Err(invalid());
            }
        }
        Ok(Decimal(s.strip_prefix('+').unwrap_or(s).to_string()))
    }
}

impl TryFrom<String> for Decimal {
    type Error = ParseDecimalError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Decimal> for String {
    fn from(d: Decimal) -> Self {
        d.0
    }
}

impl PartialEq for Decimal {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Decimal {}

impl PartialOrd for Decimal {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Decimal {
    /// Numeric where the `f64` views differ, textual otherwise.
    fn cmp(&self, other: &Self) -> Ordering {
        let numeric = match (self.to_f64(), other.to_f64()) {
            (Some(a), Some(b)) => a.total_cmp(&b),
            _ => Ordering::Equal,
        };
        numeric.then_with(|| self.0.cmp(&other.0))
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Value::Decimal(d) => write!(f, "{d}"),
            Value::DateTime(dt) => write!(f, "{}", dt.to_rfc3339()),
            Value::Date(d) => write!(f, "{d}"),
            Value::Uuid(u) => write!(f, "{u}"),
            Value::Array(items) => write!(f, "<array of {}>", items.len()),
            Value::Map(entries) => write!(f, "<mapping of {}>", entries.len()),
            Value::Object(fields) => write!(f, "<object of {}>", fields.len()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl From<Decimal> for Value {
    fn from(d: Decimal) -> Self {
        Value::Decimal(d)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(dt: DateTime<Utc>) -> Self {
        Value::DateTime(dt)
    }
}

impl From<Uuid> for Value {
    fn from(u: Uuid) -> Self {
        Value::Uuid(u)
    }
}

impl FromIterator<Value> for Value {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Value::Array(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_helper_collects_fields() {
        let v = Value::object([("id", Value::from("x1")), ("n", Value::from(3))]);
        assert_eq!(v.get("id"), Some(&Value::String("x1".into())));
        assert_eq!(v.get("n").and_then(Value::as_i64), Some(3));
        assert!(v.get("missing").is_none());
    }

    #[test]
    fn length_counts_chars_not_bytes() {
        assert_eq!(Value::from("héllo").length(), Some(5));
        assert_eq!(Value::Bytes(vec![1, 2]).length(), Some(2));
        assert_eq!(Value::Int(4).length(), None);
    }

    #[test]
    fn int_widens_to_f64() {
        assert_eq!(Value::Int(2).as_f64(), Some(2.0));
        assert_eq!(Value::Bool(true).as_f64(), None);
    }

    #[test]
    fn decimal_accepts_plain_and_exponent_forms() {
        for ok in ["0", "-1.50", "+2", ".5", "5.", "1e10", "6.02E+23", "-1e-3"] {
            assert!(ok.parse::<Decimal>().is_ok(), "{ok}");
        }
        for bad in ["", ".", "1.2.3", "1e", "e5", "abc", "1,5", "--1", "0x10", "NaN"] {
            assert!(bad.parse::<Decimal>().is_err(), "{bad}");
        }
        assert_eq!("+2.5".parse::<Decimal>().unwrap().as_str(), "2.5");
    }

    #[test]
    fn decimal_keeps_digits_floats_would_lose() {
        let d: Decimal = "0.10000000000000000000001".parse().unwrap();
        assert_eq!(d.to_string(), "0.10000000000000000000001");
        let rounded: Decimal = "0.1".parse().unwrap();
        assert_ne!(d, rounded);
        assert_eq!(Value::Decimal(d).kind_name(), "decimal");
    }

    #[test]
    fn total_cmp_orders_within_and_across_kinds() {
        assert_eq!(Value::Int(2).total_cmp(&Value::Float(1.5)), Ordering::Greater);
        assert_eq!(Value::from("a").total_cmp(&Value::from("b")), Ordering::Less);
        assert_eq!(Value::Bool(true).total_cmp(&Value::Int(0)), Ordering::Less);
        let short = Value::Array(vec![Value::Int(1)]);
        let long = Value::Array(vec![Value::Int(1), Value::Int(0)]);
        assert_eq!(short.total_cmp(&long), Ordering::Less);
    }

    #[test]
    fn duplicates_are_detected_in_arrays_only() {
        let dup = Value::Array(vec![Value::from("x"), Value::from("y"), Value::from("x")]);
        assert!(dup.has_duplicates());
        assert!(!Value::Array(vec![Value::Int(1), Value::Int(2)]).has_duplicates());
        assert!(!Value::from("xx").has_duplicates());
    }

    #[test]
    fn absent_and_null_are_distinct() {
        let with_null = Value::object([("a", Value::Null)]);
        let without = Value::object(Vec::<(&str, Value)>::new());
        assert_ne!(with_null, without);
        assert_eq!(with_null.get("a"), Some(&Value::Null));
        assert_eq!(without.get("a"), None);
    }
}
