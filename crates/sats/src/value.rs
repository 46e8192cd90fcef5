use std::cmp::Ordering;
use std::fmt;

/// A scalar value as described in the data model: a tagged union over
/// `{null, int64, float64, bool, text, bytes}`. Every comparison, coercion,
/// and aggregate the executor performs dispatches on this tag.
///
/// Derives `serde` so the wire protocol (length-prefixed MessagePack
/// request/response frames) can serialize rows and bound parameters
/// directly, the same way the reference codebase's own scalar type doubles
/// as both its in-memory representation and its wire ABI.
#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    #[default]
    Null,
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
    Bytes(Vec<u8>),
}

/// The six scalar kinds, independent of any particular value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Null,
    Int,
    Float,
    Bool,
    Text,
    Bytes,
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::Int(_) => ValueKind::Int,
            Value::Float(_) => ValueKind::Float,
            Value::Bool(_) => ValueKind::Bool,
            Value::Text(_) => ValueKind::Text,
            Value::Bytes(_) => ValueKind::Bytes,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Truthiness per the executor's rules: a bool is itself, a number is
    /// true iff non-zero, a non-empty string is true, everything else
    /// (including null) is false.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Text(s) => !s.is_empty(),
            Value::Null | Value::Bytes(_) => false,
        }
    }

    /// Coerce to a textual representation, used by string-valued builtins
    /// and by `CONCAT`/textual row encoding.
    pub fn coerce_text(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => format_float(*f),
            Value::Bool(b) => b.to_string(),
            Value::Text(s) => s.clone(),
            Value::Bytes(b) => base64::engine::general_purpose::STANDARD.encode(b),
        }
    }

    /// Coerce to `f64` for arithmetic/aggregate purposes. Returns `None` for
    /// values that carry no numeric interpretation (null propagates as
    /// `None` so aggregates can skip it; text/bytes/bool are not numeric).
    pub fn as_numeric(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) => Some(*f as i64),
            _ => None,
        }
    }
}

fn format_float(f: f64) -> String {
    if f.fract() == 0.0 && f.is_finite() && f.abs() < 1e15 {
        format!("{:.1}", f)
    } else {
        format!("{}", f)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        scalar_cmp(self, other) == Some(Ordering::Equal)
    }
}

/// The scalar total order described in §4.4.7: numeric vs numeric compares
/// numerically (ints unified with floats), string vs string compares by
/// byte order, anything else falls back to a textual comparison. Nulls are
/// neither less nor greater than any value, including another null.
pub fn scalar_cmp(a: &Value, b: &Value) -> Option<Ordering> {
    if a.is_null() || b.is_null() {
        return None;
    }
    match (a, b) {
        (Value::Text(x), Value::Text(y)) => Some(x.as_bytes().cmp(y.as_bytes())),
        (Value::Bytes(x), Value::Bytes(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => match (a.as_numeric(), b.as_numeric()) {
            (Some(x), Some(y)) => x.partial_cmp(&y),
            _ => a.coerce_text().partial_cmp(&b.coerce_text()),
        },
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.coerce_text())
    }
}

use base64::Engine;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness_matches_spec() {
        assert!(Value::Bool(true).is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(Value::Int(1).is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(Value::Text("x".into()).is_truthy());
        assert!(!Value::Text("".into()).is_truthy());
        assert!(!Value::Null.is_truthy());
    }

    #[test]
    fn nulls_compare_as_incomparable() {
        assert_eq!(scalar_cmp(&Value::Null, &Value::Int(1)), None);
        assert_eq!(scalar_cmp(&Value::Null, &Value::Null), None);
    }

    #[test]
    fn numeric_unifies_int_and_float() {
        assert_eq!(scalar_cmp(&Value::Int(3), &Value::Float(3.0)), Some(Ordering::Equal));
        assert_eq!(scalar_cmp(&Value::Int(2), &Value::Float(3.0)), Some(Ordering::Less));
    }

    #[test]
    fn strings_compare_by_byte_order() {
        assert_eq!(
            scalar_cmp(&Value::Text("a".into()), &Value::Text("b".into())),
            Some(Ordering::Less)
        );
    }
}
