//! Condition parsing: `key<operator>value` segments joined by `&`

use crate::core::descriptor::ResourceDescriptor;
use crate::core::error::{QueryError, QueryResult};
use crate::core::operator::Operator;
use crate::core::value::Value;
use crate::query::term::{ResolveMode, Term, TermCache};
use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};
use std::fmt;
use std::sync::Arc;

/// Characters beginning an operator token
const OPERATOR_CHARS: [char; 4] = ['<', '>', '=', '!'];

/// Characters escaped when a key is written back into a condition string
const KEY_RESERVED: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'%')
    .add(b'&')
    .add(b'<')
    .add(b'>')
    .add(b'=')
    .add(b'!');

/// A typed predicate bound to a resolved term
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    term: Arc<Term>,
    operator: Operator,
    value: Value,
}

impl Condition {
    /// Build a condition, checking the operator against the term's allowed
    /// operators
    pub fn new(term: Arc<Term>, operator: Operator, value: Value) -> QueryResult<Self> {
        if !term.allowed_operators().contains(operator) {
            return Err(QueryError::ForbiddenOperator {
                resource: term.resource().to_string(),
                property: term.key().to_string(),
                operator,
            });
        }
        Ok(Self {
            term,
            operator,
            value,
        })
    }

    pub fn term(&self) -> &Arc<Term> {
        &self.term
    }

    pub fn key(&self) -> &str {
        self.term.key()
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Re-bind this condition to another resource type, keeping operator
    /// and value
    pub fn redirect(&self, target: &ResourceDescriptor, cache: &TermCache) -> QueryResult<Condition> {
        let term = cache.resolve(target, self.term.key(), ResolveMode::Strict)?;
        Condition::new(term, self.operator, self.value.clone())
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            utf8_percent_encode(self.term.key(), KEY_RESERVED),
            self.operator,
            self.value.to_literal()
        )
    }
}

// ---------------------------------------------------------------------------
// Segment scanning
// ---------------------------------------------------------------------------

/// Split a segment around its operator token.
///
/// The token starts at the first operator character; two-character
/// operators take precedence, so `<=` is never read as `<` then `=`.
pub(crate) fn split_operator(segment: &str) -> QueryResult<(&str, Operator, &str)> {
    let start = segment.find(OPERATOR_CHARS).ok_or_else(|| {
        QueryError::syntax(format!("missing operator in segment '{}'", segment))
    })?;
    let rest = &segment[start..];
    let operator = rest
        .get(..2)
        .and_then(Operator::from_symbol)
        .or_else(|| rest.get(..1).and_then(Operator::from_symbol))
        .ok_or_else(|| {
            QueryError::syntax(format!("invalid operator in segment '{}'", segment))
        })?;
    let key = &segment[..start];
    let value = &rest[operator.symbol().len()..];
    if key.is_empty() {
        return Err(QueryError::syntax(format!(
            "missing key in segment '{}'",
            segment
        )));
    }
    Ok((key, operator, value))
}

/// Percent-decode a key or value
pub(crate) fn decode(text: &str) -> QueryResult<String> {
    percent_decode_str(text)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|_| QueryError::syntax(format!("'{}' is not valid UTF-8 once decoded", text)))
}

/// Split a `&`-joined list, rejecting empty segments
pub(crate) fn segments(text: &str) -> QueryResult<Vec<&str>> {
    if text.is_empty() {
        return Ok(Vec::new());
    }
    text.split('&')
        .map(|segment| {
            if segment.trim().is_empty() {
                Err(QueryError::syntax(format!("empty segment in '{}'", text)))
            } else {
                Ok(segment)
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse a single `key<operator>value` segment
pub fn parse_condition(
    segment: &str,
    descriptor: &ResourceDescriptor,
    cache: &TermCache,
) -> QueryResult<Condition> {
    let (raw_key, operator, raw_value) = split_operator(segment)?;
    if raw_value.contains(OPERATOR_CHARS) {
        return Err(QueryError::syntax(format!(
            "ambiguous operator in segment '{}'",
            segment
        )));
    }

    let key = decode(raw_key)?;
    let text = decode(raw_value)?;
    let term = cache.resolve(descriptor, &key, ResolveMode::Strict)?;

    let value = match term.property_type() {
        Some(property_type) => Value::parse_for(&text, property_type).map_err(|message| {
            QueryError::syntax(format!("invalid value for '{}': {}", term.key(), message))
        })?,
        None => Value::parse_literal(&text),
    };

    Condition::new(term, operator, value)
}

/// Parse an `&`-joined condition list.
///
/// Order is preserved and the same key may appear more than once; every
/// condition must hold.
pub fn parse_conditions(
    text: &str,
    descriptor: &ResourceDescriptor,
    cache: &TermCache,
) -> QueryResult<Vec<Condition>> {
    segments(text)?
        .into_iter()
        .map(|segment| parse_condition(segment, descriptor, cache))
        .collect()
}

/// Write conditions back in the form [`parse_conditions`] accepts
pub fn stringify(conditions: &[Condition]) -> String {
    conditions
        .iter()
        .map(Condition::to_string)
        .collect::<Vec<_>>()
        .join("&")
}
