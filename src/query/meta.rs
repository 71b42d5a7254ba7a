//! Meta-conditions: request directives that shape output rather than filter
//!
//! Directives are `name=value` segments joined by `&`. Every segment is
//! parsed and type-checked first; term-valued directives are resolved once
//! all segments are known, so `dynamic=true` applies wherever it appears.

use crate::core::descriptor::ResourceDescriptor;
use crate::core::error::{QueryError, QueryResult};
use crate::core::operator::Operator;
use crate::core::value::Value;
use crate::query::condition::{decode, segments, split_operator};
use crate::query::term::{ResolveMode, Term, TermCache};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Recognized directive names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetaName {
    Limit,
    Offset,
    OrderAsc,
    OrderDesc,
    Unsafe,
    Select,
    Add,
    Rename,
    Dynamic,
    Safepost,
    Distinct,
}

/// Value type a directive expects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaType {
    Integer,
    String,
    Boolean,
}

impl fmt::Display for MetaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MetaType::Integer => "integer",
            MetaType::String => "string",
            MetaType::Boolean => "boolean",
        };
        f.write_str(name)
    }
}

impl MetaName {
    pub const ALL: [MetaName; 11] = [
        MetaName::Limit,
        MetaName::Offset,
        MetaName::OrderAsc,
        MetaName::OrderDesc,
        MetaName::Unsafe,
        MetaName::Select,
        MetaName::Add,
        MetaName::Rename,
        MetaName::Dynamic,
        MetaName::Safepost,
        MetaName::Distinct,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MetaName::Limit => "limit",
            MetaName::Offset => "offset",
            MetaName::OrderAsc => "order_asc",
            MetaName::OrderDesc => "order_desc",
            MetaName::Unsafe => "unsafe",
            MetaName::Select => "select",
            MetaName::Add => "add",
            MetaName::Rename => "rename",
            MetaName::Dynamic => "dynamic",
            MetaName::Safepost => "safepost",
            MetaName::Distinct => "distinct",
        }
    }

    pub fn expected_type(self) -> MetaType {
        match self {
            MetaName::Limit | MetaName::Offset => MetaType::Integer,
            MetaName::Unsafe | MetaName::Dynamic | MetaName::Distinct => MetaType::Boolean,
            _ => MetaType::String,
        }
    }
}

impl FromStr for MetaName {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MetaName::ALL
            .into_iter()
            .find(|name| name.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| QueryError::syntax(format!("unknown meta-condition '{}'", s)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub term: Arc<Term>,
    pub direction: Direction,
}

/// Output shaping that must run after selection, one mode per combination
/// of `select`, `add` and `rename`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostOperation {
    NoOperation,
    Select,
    Rename,
    Add,
    SelectRename,
    SelectAdd,
    AddRename,
    SelectAddRename,
}

impl PostOperation {
    pub fn from_flags(select: bool, add: bool, rename: bool) -> Self {
        match (select, add, rename) {
            (false, false, false) => PostOperation::NoOperation,
            (true, false, false) => PostOperation::Select,
            (false, false, true) => PostOperation::Rename,
            (false, true, false) => PostOperation::Add,
            (true, false, true) => PostOperation::SelectRename,
            (true, true, false) => PostOperation::SelectAdd,
            (false, true, true) => PostOperation::AddRename,
            (true, true, true) => PostOperation::SelectAddRename,
        }
    }

    pub fn selects(self) -> bool {
        matches!(
            self,
            PostOperation::Select
                | PostOperation::SelectRename
                | PostOperation::SelectAdd
                | PostOperation::SelectAddRename
        )
    }

    pub fn adds(self) -> bool {
        matches!(
            self,
            PostOperation::Add
                | PostOperation::SelectAdd
                | PostOperation::AddRename
                | PostOperation::SelectAddRename
        )
    }

    pub fn renames(self) -> bool {
        matches!(
            self,
            PostOperation::Rename
                | PostOperation::SelectRename
                | PostOperation::AddRename
                | PostOperation::SelectAddRename
        )
    }
}

/// Parsed directives of one request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetaConditions {
    /// `None` means unlimited
    pub limit: Option<usize>,
    /// Whether the request carried a `limit` at all
    limit_set: bool,
    pub offset: usize,
    pub order_by: Option<OrderBy>,
    /// Allows single-target mutations to apply to every match
    pub unsafe_mode: bool,
    pub select: Vec<Arc<Term>>,
    pub add: Vec<Arc<Term>>,
    pub rename: Vec<(Arc<Term>, String)>,
    pub dynamic: bool,
    /// Terms identifying an existing entity for an insert-or-update POST
    pub safepost: Option<Vec<Arc<Term>>>,
    pub distinct: bool,
}

impl MetaConditions {
    pub fn post_operation(&self) -> PostOperation {
        PostOperation::from_flags(
            !self.select.is_empty(),
            !self.add.is_empty(),
            !self.rename.is_empty(),
        )
    }

    /// The request's limit, or `default` when it carried none
    pub fn limit_or(&self, default: Option<usize>) -> Option<usize> {
        if self.limit_set {
            self.limit
        } else {
            default
        }
    }

    /// Mode term-valued directives were resolved with
    pub fn resolve_mode(&self) -> ResolveMode {
        if self.dynamic {
            ResolveMode::Dynamic
        } else {
            ResolveMode::Strict
        }
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse an `&`-joined directive list.
///
/// A repeated directive overwrites the earlier occurrence.
pub fn parse_meta_conditions(
    text: &str,
    descriptor: &ResourceDescriptor,
    cache: &TermCache,
) -> QueryResult<MetaConditions> {
    let mut pairs = Vec::new();
    for segment in segments(text)? {
        pairs.push(parse_segment(segment)?);
    }

    let mut meta = MetaConditions::default();
    // `dynamic` decides how every term below is resolved
    for (name, value) in &pairs {
        if *name == MetaName::Dynamic {
            meta.dynamic = value.as_bool().unwrap_or(false);
        }
    }
    let mode = meta.resolve_mode();
    let resolve = |key: &str| cache.resolve(descriptor, key.trim(), mode);

    for (name, value) in pairs {
        match name {
            MetaName::Limit => {
                let limit = integer(name, &value)?;
                meta.limit = usize::try_from(limit).ok();
                meta.limit_set = true;
            }
            MetaName::Offset => {
                let offset = integer(name, &value)?;
                meta.offset = usize::try_from(offset).map_err(|_| {
                    QueryError::syntax(format!("offset must not be negative, got {}", offset))
                })?;
            }
            MetaName::OrderAsc | MetaName::OrderDesc => {
                let direction = if name == MetaName::OrderAsc {
                    Direction::Ascending
                } else {
                    Direction::Descending
                };
                meta.order_by = Some(OrderBy {
                    term: resolve(string(name, &value)?)?,
                    direction,
                });
            }
            MetaName::Unsafe => meta.unsafe_mode = boolean(name, &value)?,
            MetaName::Dynamic => meta.dynamic = boolean(name, &value)?,
            MetaName::Distinct => meta.distinct = boolean(name, &value)?,
            MetaName::Select => meta.select = term_list(name, &value, &resolve)?,
            MetaName::Add => meta.add = term_list(name, &value, &resolve)?,
            MetaName::Safepost => meta.safepost = Some(term_list(name, &value, &resolve)?),
            MetaName::Rename => {
                let mut rename: Vec<(Arc<Term>, String)> = Vec::new();
                for item in csv(name, string(name, &value)?)? {
                    let (key, new_name) = item.split_once("->").ok_or_else(|| {
                        QueryError::syntax(format!("rename item '{}' must be 'key->name'", item))
                    })?;
                    let new_name = new_name.trim();
                    if new_name.is_empty() || new_name.contains("->") {
                        return Err(QueryError::syntax(format!(
                            "rename item '{}' must be 'key->name'",
                            item
                        )));
                    }
                    let term = resolve(key)?;
                    rename.retain(|(existing, _)| existing.key() != term.key());
                    rename.push((term, new_name.to_string()));
                }
                meta.rename = rename;
            }
        }
    }

    Ok(meta)
}

fn parse_segment(segment: &str) -> QueryResult<(MetaName, Value)> {
    let (raw_name, operator, raw_value) = split_operator(segment)?;
    if operator != Operator::Equals {
        return Err(QueryError::syntax(format!(
            "meta-condition '{}' must use '=', found '{}'",
            raw_name, operator
        )));
    }
    if raw_value.contains('=') {
        return Err(QueryError::syntax(format!(
            "more than one '=' in meta-condition '{}'",
            segment
        )));
    }
    let name: MetaName = decode(raw_name)?.parse()?;
    let value = Value::parse_literal(&decode(raw_value)?);
    Ok((name, value))
}

fn mismatch(name: MetaName, value: &Value) -> QueryError {
    QueryError::syntax(format!(
        "meta-condition '{}' expects a value of type {}, got {}",
        name.as_str(),
        name.expected_type(),
        value.type_name()
    ))
}

/// Integer directive; decimals are floor-truncated
fn integer(name: MetaName, value: &Value) -> QueryResult<i64> {
    value.as_floor_i64().ok_or_else(|| mismatch(name, value))
}

fn boolean(name: MetaName, value: &Value) -> QueryResult<bool> {
    value.as_bool().ok_or_else(|| mismatch(name, value))
}

fn string(name: MetaName, value: &Value) -> QueryResult<&str> {
    value.as_str().ok_or_else(|| mismatch(name, value))
}

fn csv(name: MetaName, text: &str) -> QueryResult<Vec<&str>> {
    text.split(',')
        .map(|item| {
            let item = item.trim();
            if item.is_empty() {
                Err(QueryError::syntax(format!(
                    "empty item in meta-condition '{}'",
                    name.as_str()
                )))
            } else {
                Ok(item)
            }
        })
        .collect()
}

fn term_list(
    name: MetaName,
    value: &Value,
    resolve: &impl Fn(&str) -> QueryResult<Arc<Term>>,
) -> QueryResult<Vec<Arc<Term>>> {
    let mut terms: Vec<Arc<Term>> = Vec::new();
    for item in csv(name, string(name, value)?)? {
        let term = resolve(item)?;
        if !terms.iter().any(|existing| existing.key() == term.key()) {
            terms.push(term);
        }
    }
    Ok(terms)
}
