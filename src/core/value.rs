//! Condition values and their coercions
//!
//! [`Value`] is the closed set of literals a condition can carry. It is also
//! the shape every entity member is read into before comparison, so the
//! same equality and ordering rules apply to both sides.

use crate::core::descriptor::PropertyType;
use bigdecimal::{BigDecimal, ToPrimitive};
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Characters that must be escaped when a value is written back into a
/// condition string
const LITERAL_RESERVED: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'%')
    .add(b'&')
    .add(b'<')
    .add(b'>')
    .add(b'=')
    .add(b'!');

/// A typed condition value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Bool(bool),
    Number(BigDecimal),
    DateTime(DateTime<Utc>),
    String(String),
    Null,
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Bool(b) => b.hash(state),
            // 18 and 18.0 are equal, so they must hash alike
            Value::Number(n) => n.normalized().hash(state),
            Value::DateTime(d) => d.hash(state),
            Value::String(s) => s.hash(state),
            Value::Null => {}
        }
    }
}

impl Value {
    /// Parse a decoded literal.
    ///
    /// Precedence: double-quoted string, boolean, `null`, decimal number,
    /// ISO-8601 date-time, raw string.
    pub fn parse_literal(text: &str) -> Value {
        if let Some(inner) = unquote(text) {
            return Value::String(inner.to_string());
        }
        if text.eq_ignore_ascii_case("true") {
            return Value::Bool(true);
        }
        if text.eq_ignore_ascii_case("false") {
            return Value::Bool(false);
        }
        if text.eq_ignore_ascii_case("null") {
            return Value::Null;
        }
        if let Ok(number) = BigDecimal::from_str(text) {
            return Value::Number(number);
        }
        if let Some(datetime) = parse_datetime(text) {
            return Value::DateTime(datetime);
        }
        Value::String(text.to_string())
    }

    /// Parse a literal aimed at a declared property.
    ///
    /// This is the one exception to the precedence of
    /// [`Value::parse_literal`]: an unquoted literal aimed at a string
    /// property keeps its raw text, so `Name=18` compares against `"18"`
    /// rather than the number 18. Enum properties only accept one of their
    /// variant names.
    pub fn parse_for(text: &str, property_type: &PropertyType) -> Result<Value, String> {
        let value = Value::parse_literal(text);
        match (property_type, value) {
            (PropertyType::String, Value::Null) => Ok(Value::Null),
            (PropertyType::String, value) if unquote(text).is_none() => match value {
                Value::String(s) => Ok(Value::String(s)),
                _ => Ok(Value::String(text.to_string())),
            },
            (PropertyType::Enum(names), Value::String(s)) => names
                .iter()
                .find(|name| name.eq_ignore_ascii_case(&s))
                .map(|name| Value::String(name.clone()))
                .ok_or_else(|| {
                    format!(
                        "'{}' is not a valid value, expected one of: {}",
                        s,
                        names.join(", ")
                    )
                }),
            (_, value) => Ok(value),
        }
    }

    /// Read a stored JSON member as a value.
    ///
    /// Returns `None` for arrays and objects, which cannot take part in a
    /// comparison. Strings stored in a date-time property are parsed.
    pub fn from_json(json: &serde_json::Value, property_type: Option<&PropertyType>) -> Option<Value> {
        match json {
            serde_json::Value::Null => Some(Value::Null),
            serde_json::Value::Bool(b) => Some(Value::Bool(*b)),
            serde_json::Value::Number(n) => BigDecimal::from_str(&n.to_string())
                .ok()
                .map(Value::Number),
            serde_json::Value::String(s) => match property_type {
                Some(PropertyType::DateTime) => Some(
                    parse_datetime(s)
                        .map(Value::DateTime)
                        .unwrap_or_else(|| Value::String(s.clone())),
                ),
                _ => Some(Value::String(s.clone())),
            },
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => None,
        }
    }

    /// Write the value back in condition-string form.
    ///
    /// `Value::parse_literal` of the percent-decoded output yields `self`.
    pub fn to_literal(&self) -> String {
        match self {
            Value::String(s) => {
                let encoded = utf8_percent_encode(s, LITERAL_RESERVED).to_string();
                match Value::parse_literal(s) {
                    Value::String(raw) if raw == *s => encoded,
                    _ => format!("\"{}\"", encoded),
                }
            }
            other => other.to_text(),
        }
    }

    /// Plain text form, as bound to SQL parameters
    pub fn to_text(&self) -> String {
        match self {
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            Value::DateTime(d) => d.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            Value::String(s) => s.clone(),
            Value::Null => "null".to_string(),
        }
    }

    /// Name of the variant, for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::DateTime(_) => "date-time",
            Value::String(_) => "string",
            Value::Null => "null",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer part of a number, rounded towards negative infinity.
    ///
    /// `None` outside the `i64` range. The range check runs before any
    /// rescale, since `1e999999999` is a valid literal.
    pub fn as_floor_i64(&self) -> Option<i64> {
        match self {
            Value::Number(n) => {
                if *n < BigDecimal::from(i64::MIN) || *n > BigDecimal::from(i64::MAX) {
                    return None;
                }
                let zero = BigDecimal::from(0);
                if n.abs() < BigDecimal::from(1) {
                    return Some(if *n < zero { -1 } else { 0 });
                }
                let truncated = n.with_scale(0);
                let floor = if &truncated > n {
                    truncated - BigDecimal::from(1)
                } else {
                    truncated
                };
                floor.to_i64()
            }
            _ => None,
        }
    }

    /// Ordered comparison between two values of the same variant.
    ///
    /// Strings compare ordinally. Mixed variants have no order.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Number(a), Value::Number(b)) => Some(a.cmp(b)),
            (Value::DateTime(a), Value::DateTime(b)) => Some(a.cmp(b)),
            (Value::String(a), Value::String(b)) => Some(a.as_bytes().cmp(b.as_bytes())),
            (Value::Null, Value::Null) => Some(Ordering::Equal),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "\"{}\"", s),
            other => f.write_str(&other.to_text()),
        }
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

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Number(BigDecimal::from(i))
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(d: DateTime<Utc>) -> Self {
        Value::DateTime(d)
    }
}

fn unquote(text: &str) -> Option<&str> {
    if text.len() >= 2 && text.starts_with('"') && text.ends_with('"') {
        Some(&text[1..text.len() - 1])
    } else {
        None
    }
}

/// Parse an ISO-8601 date-time: RFC 3339, naive date-time (assumed UTC) or
/// a plain date at midnight UTC
pub fn parse_datetime(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
