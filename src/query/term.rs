//! Term resolution: from a dotted key string to a property-access chain
//!
//! A [`Term`] is resolved once per `(resource, key, mode)` and memoized in a
//! [`TermCache`]. Resolution is case-insensitive: declared members are
//! matched first, and a dynamic (schema-less) accessor is synthesized only
//! when the resource allows dynamic conditions.

use crate::core::descriptor::{PropertyDescriptor, PropertyType, ResourceDescriptor};
use crate::core::error::{QueryError, QueryResult};
use crate::core::operator::OperatorSet;
use crate::core::value::Value;
use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

/// How undeclared members are treated during resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolveMode {
    /// Fall back to a dynamic member only if the descriptor allows dynamic
    /// conditions
    Strict,
    /// Always fall back to a dynamic member
    Dynamic,
}

/// One step of a property chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Accessor {
    Declared(PropertyDescriptor),
    Dynamic(String),
}

impl Accessor {
    pub fn name(&self) -> &str {
        match self {
            Accessor::Declared(property) => &property.name,
            Accessor::Dynamic(name) => name,
        }
    }

    fn get<'a>(&self, object: &'a serde_json::Map<String, serde_json::Value>) -> Option<&'a serde_json::Value> {
        match self {
            Accessor::Declared(property) => object.get(&property.name),
            Accessor::Dynamic(name) => object.get(name).or_else(|| {
                object
                    .iter()
                    .find(|(key, _)| key.eq_ignore_ascii_case(name))
                    .map(|(_, value)| value)
            }),
        }
    }
}

/// A resolved property chain on a resource type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Term {
    resource: String,
    key: String,
    chain: Vec<Accessor>,
}

impl Term {
    /// The canonical dotted key, using declared member casing
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn chain(&self) -> &[Accessor] {
        &self.chain
    }

    /// Whether the chain ends in a dynamic member
    pub fn is_dynamic(&self) -> bool {
        matches!(self.chain.last(), Some(Accessor::Dynamic(_)))
    }

    /// The terminal declared property, if the chain ends in one
    pub fn property(&self) -> Option<&PropertyDescriptor> {
        match self.chain.last() {
            Some(Accessor::Declared(property)) => Some(property),
            _ => None,
        }
    }

    pub fn property_type(&self) -> Option<&PropertyType> {
        self.property().map(|p| &p.property_type)
    }

    /// Operators conditions may use on this term; dynamic members accept
    /// every operator
    pub fn allowed_operators(&self) -> OperatorSet {
        self.property()
            .map(|p| p.allowed_operators)
            .unwrap_or(OperatorSet::ALL)
    }

    /// The single declared scalar property this term names, if it has no
    /// nesting. Only such terms can be answered from a hash index.
    pub fn top_level_scalar(&self) -> Option<&PropertyDescriptor> {
        match self.chain.as_slice() {
            [Accessor::Declared(property)] if property.property_type.is_scalar() => Some(property),
            _ => None,
        }
    }

    /// Member names along the chain
    pub fn path(&self) -> Vec<&str> {
        self.chain.iter().map(Accessor::name).collect()
    }

    /// Raw JSON member at the end of the chain, `None` when missing
    pub fn read<'a>(&self, document: &'a serde_json::Value) -> Option<&'a serde_json::Value> {
        let mut current = document;
        for accessor in &self.chain {
            current = accessor.get(current.as_object()?)?;
        }
        Some(current)
    }

    /// Value at the end of the chain.
    ///
    /// Missing members read as `Null`; arrays and objects read as `None`.
    pub fn evaluate(&self, document: &serde_json::Value) -> Option<Value> {
        match self.read(document) {
            Some(json) => Value::from_json(json, self.property_type()),
            None => Some(Value::Null),
        }
    }
}

/// Memoized term resolutions, shared by every request.
///
/// Created once by the registry builder and injected where terms are
/// resolved. Population is read-then-insert: two threads racing on the same
/// key compute equal terms, and whichever write lands last is kept.
///
/// Only terms over declared members are kept. A term with a dynamic
/// segment is resolved afresh each time, so client-chosen keys never
/// accumulate.
#[derive(Debug, Default)]
pub struct TermCache {
    terms: RwLock<HashMap<(String, String, ResolveMode), Arc<Term>>>,
}

impl TermCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `key` on `descriptor`, using the cache when possible
    pub fn resolve(
        &self,
        descriptor: &ResourceDescriptor,
        key: &str,
        mode: ResolveMode,
    ) -> QueryResult<Arc<Term>> {
        let cache_key = (
            descriptor.name.to_ascii_lowercase(),
            key.to_ascii_lowercase(),
            mode,
        );
        if let Some(term) = self
            .terms
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&cache_key)
        {
            return Ok(term.clone());
        }

        let term = Arc::new(resolve_term(descriptor, key, mode)?);
        tracing::trace!(resource = %descriptor.name, key = %key, term = %term.key(), "term resolved");
        if term.chain().iter().any(|a| matches!(a, Accessor::Dynamic(_))) {
            return Ok(term);
        }
        self.terms
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(cache_key, term.clone());
        Ok(term)
    }

    /// Drop every cached term of a resource, for resources that are
    /// removed or re-registered at runtime
    pub fn evict_resource(&self, resource: &str) {
        let resource = resource.to_ascii_lowercase();
        self.terms
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .retain(|(name, _, _), _| *name != resource);
    }

    pub fn len(&self) -> usize {
        self.terms
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn segment_regex() -> &'static Regex {
    static SEGMENT_REGEX: OnceLock<Regex> = OnceLock::new();
    SEGMENT_REGEX.get_or_init(|| {
        Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").expect("segment pattern is valid")
    })
}

/// Resolve without caching
pub fn resolve_term(
    descriptor: &ResourceDescriptor,
    key: &str,
    mode: ResolveMode,
) -> QueryResult<Term> {
    let unknown = || QueryError::UnknownColumn {
        resource: descriptor.name.clone(),
        key: key.to_string(),
    };

    let mut chain = Vec::new();
    // Members the next segment can match; `None` once we are schema-less
    let mut members: Option<&[PropertyDescriptor]> = Some(&descriptor.properties);
    let dynamic_allowed = mode == ResolveMode::Dynamic || descriptor.dynamic_conditions;

    for segment in key.split('.') {
        if !segment_regex().is_match(segment) {
            return Err(QueryError::syntax(format!(
                "invalid key '{}' for resource '{}'",
                key, descriptor.name
            )));
        }

        let Some(candidates) = members else {
            chain.push(Accessor::Dynamic(segment.to_string()));
            continue;
        };

        let matches: Vec<&PropertyDescriptor> = candidates
            .iter()
            .filter(|p| p.name.eq_ignore_ascii_case(segment))
            .collect();

        match matches.as_slice() {
            [property] => {
                members = match &property.property_type {
                    PropertyType::Object(nested) => Some(nested.as_slice()),
                    PropertyType::Any => None,
                    _ => Some(&[]),
                };
                chain.push(Accessor::Declared((*property).clone()));
            }
            [] => {
                // Scalars have no members, dynamic or not
                let below_scalar = !chain.is_empty() && candidates.is_empty();
                if !dynamic_allowed || below_scalar {
                    return Err(unknown());
                }
                members = None;
                chain.push(Accessor::Dynamic(segment.to_string()));
            }
            many => {
                return Err(QueryError::AmbiguousColumn {
                    resource: descriptor.name.clone(),
                    key: key.to_string(),
                    candidates: many.iter().map(|p| p.name.clone()).collect(),
                });
            }
        }
    }

    let key = chain
        .iter()
        .map(Accessor::name)
        .collect::<Vec<_>>()
        .join(".");
    Ok(Term {
        resource: descriptor.name.clone(),
        key,
        chain,
    })
}
