//! Leaf values and source readers.
//!
//! A resolved leaf holds a [`Value`]; raw strings arriving from the
//! environment or the registry are coerced into one by a [`Reader`]. The
//! reader is inferred from the declared default's variant unless the
//! binding supplies one explicitly.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::endpoint::Endpoint;

/// A resolved configuration value.
///
/// Leaves are dynamically typed: the spec tree mixes strings, integers,
/// booleans, and service endpoints in one structure, so the result tree
/// carries a small sum type rather than a generic parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Str(String),
    Int(i64),
    Bool(bool),
    Endpoint(Endpoint),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_endpoint(&self) -> Option<&Endpoint> {
        match self {
            Value::Endpoint(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{}", s),
            Value::Int(n) => write!(f, "{}", n),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Endpoint(e) => write!(f, "{}", e),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n as i64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Endpoint> for Value {
    fn from(e: Endpoint) -> Self {
        Value::Endpoint(e)
    }
}

/// Coercion applied to a raw string from the environment or the registry.
///
/// `Int` uses leading-integer parse semantics: optional sign, then as many
/// ASCII digits as present, trailing garbage ignored. `Bool` treats the
/// literal string `"false"` (any case) as `false` and everything else as
/// `true`. `Custom` wraps a caller-supplied coercion.
#[derive(Clone)]
pub enum Reader {
    Str,
    Int,
    Bool,
    Custom(Arc<dyn Fn(&str) -> Value + Send + Sync>),
}

impl Reader {
    /// Coerce a raw string. Returns `None` only when an integer read finds
    /// no leading digits; the caller treats that as the source being absent.
    pub fn apply(&self, raw: &str) -> Option<Value> {
        match self {
            Reader::Str => Some(Value::Str(raw.to_string())),
            Reader::Int => leading_int(raw).map(Value::Int),
            Reader::Bool => Some(Value::Bool(!raw.eq_ignore_ascii_case("false"))),
            Reader::Custom(f) => Some(f(raw)),
        }
    }

    /// Wrap a caller-supplied coercion function.
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&str) -> Value + Send + Sync + 'static,
    {
        Reader::Custom(Arc::new(f))
    }

    /// Infer a reader from a declared default's variant.
    ///
    /// No default (or a string default) infers the identity reader.
    pub(crate) fn infer(default: Option<&Value>) -> Reader {
        match default {
            Some(Value::Int(_)) => Reader::Int,
            Some(Value::Bool(_)) => Reader::Bool,
            _ => Reader::Str,
        }
    }
}

impl fmt::Debug for Reader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reader::Str => write!(f, "Reader::Str"),
            Reader::Int => write!(f, "Reader::Int"),
            Reader::Bool => write!(f, "Reader::Bool"),
            Reader::Custom(_) => write!(f, "Reader::Custom(..)"),
        }
    }
}

/// Render a value for trace output, honoring sensitivity.
///
/// Change bus observers are trusted; logs are not, so sensitive values
/// are suppressed here and only here.
pub(crate) fn redacted(value: &Value, sensitive: bool) -> String {
    if sensitive {
        "<redacted>".to_string()
    } else {
        value.to_string()
    }
}

/// Leading-integer parse: optional sign, then leading ASCII digits.
///
/// `"179837"` → 179837, `"12abc"` → 12, `"abc"` → None.
pub(crate) fn leading_int(raw: &str) -> Option<i64> {
    let s = raw.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'+') => (false, &s[1..]),
        Some(b'-') => (true, &s[1..]),
        _ => (false, s),
    };
    let end = digits.bytes().take_while(|b| b.is_ascii_digit()).count();
    if end == 0 {
        return None;
    }
    digits[..end]
        .parse::<i64>()
        .ok()
        .map(|n| if negative { -n } else { n })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_reader_parses_integers() {
        assert_eq!(Reader::Int.apply("179837"), Some(Value::Int(179837)));
        assert_eq!(Reader::Int.apply("-42"), Some(Value::Int(-42)));
        assert_eq!(Reader::Int.apply("+7"), Some(Value::Int(7)));
    }

    #[test]
    fn test_int_reader_leading_digits_only() {
        assert_eq!(Reader::Int.apply("12abc"), Some(Value::Int(12)));
        assert_eq!(Reader::Int.apply("  99 bottles"), Some(Value::Int(99)));
    }

    #[test]
    fn test_int_reader_rejects_non_numeric() {
        assert_eq!(Reader::Int.apply("abc"), None);
        assert_eq!(Reader::Int.apply(""), None);
        assert_eq!(Reader::Int.apply("--3"), None);
    }

    #[test]
    fn test_bool_reader_false_is_case_insensitive() {
        assert_eq!(Reader::Bool.apply("false"), Some(Value::Bool(false)));
        assert_eq!(Reader::Bool.apply("FALSE"), Some(Value::Bool(false)));
        assert_eq!(Reader::Bool.apply("False"), Some(Value::Bool(false)));
    }

    #[test]
    fn test_bool_reader_everything_else_is_true() {
        assert_eq!(Reader::Bool.apply("true"), Some(Value::Bool(true)));
        assert_eq!(Reader::Bool.apply("0"), Some(Value::Bool(true)));
        assert_eq!(Reader::Bool.apply(""), Some(Value::Bool(true)));
        assert_eq!(Reader::Bool.apply("no"), Some(Value::Bool(true)));
    }

    #[test]
    fn test_str_reader_is_identity() {
        assert_eq!(
            Reader::Str.apply("179837"),
            Some(Value::Str("179837".to_string()))
        );
    }

    #[test]
    fn test_custom_reader_overrides() {
        let reader = Reader::custom(|_| Value::Bool(true));
        assert_eq!(reader.apply("false"), Some(Value::Bool(true)));
    }

    #[test]
    fn test_infer_from_default_variant() {
        assert!(matches!(
            Reader::infer(Some(&Value::Int(100))),
            Reader::Int
        ));
        assert!(matches!(
            Reader::infer(Some(&Value::Bool(true))),
            Reader::Bool
        ));
        assert!(matches!(
            Reader::infer(Some(&Value::Str("hello".to_string()))),
            Reader::Str
        ));
        assert!(matches!(Reader::infer(None), Reader::Str));
    }

    #[test]
    fn test_value_accessors() {
        assert_eq!(Value::from("tomato").as_str(), Some("tomato"));
        assert_eq!(Value::from(123).as_i64(), Some(123));
        assert_eq!(Value::from(false).as_bool(), Some(false));
        assert_eq!(Value::from(123).as_str(), None);
    }

    #[test]
    fn test_value_serde_roundtrip() {
        for value in [
            Value::from("hello"),
            Value::from(42),
            Value::from(true),
            Value::Endpoint(Endpoint::new("10.128.64.32", 5432)),
        ] {
            let json = serde_json::to_string(&value).unwrap();
            let roundtripped: Value = serde_json::from_str(&json).unwrap();
            assert_eq!(value, roundtripped);
        }
    }
}
