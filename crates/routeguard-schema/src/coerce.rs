//! # Type Coercion
//!
//! Query strings, path parameters and headers arrive as strings even when
//! the contract says `integer` or `boolean`. Coercion converts a primitive
//! to the declared type when the conversion is lossless in the usual
//! scripting-language sense:
//!
//! | target    | accepted sources                                   |
//! |-----------|----------------------------------------------------|
//! | `number`  | numeric strings, `true`/`false` (1/0), `null` (0)  |
//! | `integer` | as `number`, when the result is integral           |
//! | `string`  | numbers, booleans, `null` (`""`)                   |
//! | `boolean` | `"true"`/`"false"`, `1`/`0`, `null` (`false`)      |
//! | `null`    | `""`, `0`, `false`                                 |
//!
//! Arrays and objects are never coerced.

use serde_json::{Number, Value};

/// Primitive and structural JSON-Schema types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JsonType {
    Null,
    Boolean,
    Integer,
    Number,
    String,
    Array,
    Object,
}

impl JsonType {
    /// Parse a `type` keyword value.
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "null" => Self::Null,
            "boolean" => Self::Boolean,
            "integer" => Self::Integer,
            "number" => Self::Number,
            "string" => Self::String,
            "array" => Self::Array,
            "object" => Self::Object,
            _ => return None,
        })
    }

    /// Keyword spelling of the type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Boolean => "boolean",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::String => "string",
            Self::Array => "array",
            Self::Object => "object",
        }
    }

    /// Whether `value` already satisfies this type.
    pub fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (Self::Null, Value::Null) => true,
            (Self::Boolean, Value::Bool(_)) => true,
            (Self::Number, Value::Number(_)) => true,
            (Self::Integer, Value::Number(n)) => is_integral(n),
            (Self::String, Value::String(_)) => true,
            (Self::Array, Value::Array(_)) => true,
            (Self::Object, Value::Object(_)) => true,
            _ => false,
        }
    }
}

fn is_integral(n: &Number) -> bool {
    n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0)
}

/// Convert `value` to `target`, or `None` when no lossless conversion exists.
///
/// A value that already matches `target` is returned unchanged.
pub fn coerce(value: &Value, target: JsonType) -> Option<Value> {
    if target.matches(value) {
        return Some(value.clone());
    }
    match target {
        JsonType::Number => to_number(value, false),
        JsonType::Integer => to_number(value, true),
        JsonType::String => match value {
            Value::Number(n) => Some(Value::String(n.to_string())),
            Value::Bool(b) => Some(Value::String(b.to_string())),
            Value::Null => Some(Value::String(String::new())),
            _ => None,
        },
        JsonType::Boolean => match value {
            Value::String(s) if s == "true" => Some(Value::Bool(true)),
            Value::String(s) if s == "false" => Some(Value::Bool(false)),
            Value::Number(n) if n.as_f64() == Some(1.0) => Some(Value::Bool(true)),
            Value::Number(n) if n.as_f64() == Some(0.0) => Some(Value::Bool(false)),
            Value::Null => Some(Value::Bool(false)),
            _ => None,
        },
        JsonType::Null => match value {
            Value::String(s) if s.is_empty() => Some(Value::Null),
            Value::Number(n) if n.as_f64() == Some(0.0) => Some(Value::Null),
            Value::Bool(false) => Some(Value::Null),
            _ => None,
        },
        JsonType::Array | JsonType::Object => None,
    }
}

/// Try each declared type in order and return the first conversion.
pub fn coerce_any(value: &Value, targets: &[JsonType]) -> Option<Value> {
    if targets.iter().any(|t| t.matches(value)) {
        return Some(value.clone());
    }
    targets.iter().find_map(|t| coerce(value, *t))
}

fn to_number(value: &Value, integral: bool) -> Option<Value> {
    let number = match value {
        Value::String(s) => parse_number(s)?,
        Value::Bool(b) => Number::from(u8::from(*b)),
        Value::Null => Number::from(0u8),
        Value::Number(n) => n.clone(),
        _ => return None,
    };
    if !integral {
        return Some(Value::Number(number));
    }
    if number.is_i64() || number.is_u64() {
        return Some(Value::Number(number));
    }
    let f = number.as_f64()?;
    if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
        Some(Value::Number(Number::from(f as i64)))
    } else {
        None
    }
}

fn parse_number(s: &str) -> Option<Number> {
    if s.is_empty() {
        return None;
    }
    if let Ok(i) = s.parse::<i64>() {
        return Some(Number::from(i));
    }
    if let Ok(u) = s.parse::<u64>() {
        return Some(Number::from(u));
    }
    // Rust accepts "inf" and "NaN"; neither is a JSON number.
    s.parse::<f64>().ok().and_then(Number::from_f64)
}
