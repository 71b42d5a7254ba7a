//! Resource descriptors: registration-time metadata about resource types
//!
//! A [`ResourceDescriptor`] is built once when a resource is registered and
//! never changes afterwards. Everything the condition parser, the planner
//! and the dispatcher need to know about a resource lives here.

use crate::core::operator::{Operator, OperatorSet};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Declared type of a property
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyType {
    String,
    Integer,
    Decimal,
    Boolean,
    DateTime,
    /// An enumeration, listed by variant name
    Enum(Vec<String>),
    /// A nested object with its own declared members
    Object(Vec<PropertyDescriptor>),
    /// Any JSON value; comparisons use the stored shape
    Any,
}

impl PropertyType {
    /// Scalar types can be indexed and pushed down as a single value
    pub fn is_scalar(&self) -> bool {
        !matches!(self, PropertyType::Object(_) | PropertyType::Any)
    }

    /// Nested members, for object properties
    pub fn members(&self) -> Option<&[PropertyDescriptor]> {
        match self {
            PropertyType::Object(members) => Some(members),
            _ => None,
        }
    }
}

/// A declared member of a resource type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyDescriptor {
    /// Member name, equal to its serialized name
    pub name: String,
    pub property_type: PropertyType,
    pub allowed_operators: OperatorSet,
    pub read_only: bool,
}

impl PropertyDescriptor {
    /// A writable property accepting every operator
    pub fn new(name: impl Into<String>, property_type: PropertyType) -> Self {
        Self {
            name: name.into(),
            property_type,
            allowed_operators: OperatorSet::ALL,
            read_only: false,
        }
    }

    /// Restrict the operators conditions may use on this property
    pub fn operators(mut self, operators: &[Operator]) -> Self {
        self.allowed_operators = OperatorSet::of(operators);
        self
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }
}

/// HTTP-style verbs a resource can make available
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verb {
    Get,
    Post,
    Patch,
    Put,
    Delete,
}

impl Verb {
    pub const ALL: [Verb; 5] = [Verb::Get, Verb::Post, Verb::Patch, Verb::Put, Verb::Delete];

    /// Operations a resource must implement to serve this verb
    pub fn required_operations(self) -> &'static [Operation] {
        match self {
            Verb::Get => &[Operation::Select],
            Verb::Post => &[Operation::Insert],
            Verb::Patch => &[Operation::Select, Operation::Update],
            Verb::Put => &[Operation::Select, Operation::Insert, Operation::Update],
            Verb::Delete => &[Operation::Select, Operation::Delete],
        }
    }

    /// Whether the verb targets exactly one entity unless marked unsafe
    pub fn is_single_target(self) -> bool {
        matches!(self, Verb::Patch | Verb::Put | Verb::Delete)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Verb::Get => "GET",
            Verb::Post => "POST",
            Verb::Patch => "PATCH",
            Verb::Put => "PUT",
            Verb::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verb {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Verb::ALL
            .into_iter()
            .find(|verb| verb.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown verb '{}'", s))
    }
}

/// The four CRUD operations a resource handler can implement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Select,
    Insert,
    Update,
    Delete,
}

impl Operation {
    pub const ALL: [Operation; 4] = [
        Operation::Select,
        Operation::Insert,
        Operation::Update,
        Operation::Delete,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Select => "select",
            Operation::Insert => "insert",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of backing store, deciding what can be pushed down
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    /// Arbitrary predicates
    Sql,
    /// Exact-key lookups only
    HashKv,
    /// No store to push to
    InMemory,
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StoreKind::Sql => "sql",
            StoreKind::HashKv => "hash_kv",
            StoreKind::InMemory => "in_memory",
        };
        f.write_str(name)
    }
}

/// Registration-time description of a resource type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDescriptor {
    pub name: String,
    pub properties: Vec<PropertyDescriptor>,
    pub verbs: Vec<Verb>,
    pub dynamic_conditions: bool,
    pub singleton: bool,
    pub store_kind: StoreKind,
}

impl ResourceDescriptor {
    /// A descriptor with every verb available, no properties and an
    /// in-memory store
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: Vec::new(),
            verbs: Verb::ALL.to_vec(),
            dynamic_conditions: false,
            singleton: false,
            store_kind: StoreKind::InMemory,
        }
    }

    /// Declare a property
    pub fn property(mut self, property: PropertyDescriptor) -> Self {
        self.properties.push(property);
        self
    }

    /// Replace the available verbs
    pub fn verbs(mut self, verbs: &[Verb]) -> Self {
        self.verbs = verbs.to_vec();
        self
    }

    /// Allow conditions on undeclared members
    pub fn dynamic(mut self) -> Self {
        self.dynamic_conditions = true;
        self
    }

    pub fn singleton(mut self) -> Self {
        self.singleton = true;
        self
    }

    pub fn store_kind(mut self, kind: StoreKind) -> Self {
        self.store_kind = kind;
        self
    }

    pub fn allows(&self, verb: Verb) -> bool {
        self.verbs.contains(&verb)
    }

    /// Declared top-level properties whose name matches case-insensitively
    pub fn find_properties<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a PropertyDescriptor> {
        self.properties
            .iter()
            .filter(move |p| p.name.eq_ignore_ascii_case(name))
    }

    /// Mutable access to a declared top-level property by exact
    /// case-insensitive name, used by configuration overrides
    pub fn property_mut(&mut self, name: &str) -> Option<&mut PropertyDescriptor> {
        self.properties
            .iter_mut()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person() -> ResourceDescriptor {
        ResourceDescriptor::new("Person")
            .property(
                PropertyDescriptor::new("Name", PropertyType::String)
                    .operators(&[Operator::Equals, Operator::NotEquals]),
            )
            .property(PropertyDescriptor::new("Age", PropertyType::Integer).read_only())
    }

    #[test]
    fn test_builder_defaults() {
        let descriptor = person();
        assert_eq!(descriptor.name, "Person");
        assert_eq!(descriptor.properties.len(), 2);
        assert_eq!(descriptor.store_kind, StoreKind::InMemory);
        assert!(!descriptor.dynamic_conditions);
        assert!(Verb::ALL.iter().all(|v| descriptor.allows(*v)));
    }

    #[test]
    fn test_find_properties_is_case_insensitive() {
        let descriptor = person();
        let found: Vec<_> = descriptor.find_properties("NAME").collect();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Name");
        assert!(!found[0].allowed_operators.contains(Operator::LessThan));
        assert!(descriptor.find_properties("email").next().is_none());
    }

    #[test]
    fn test_verb_requirements() {
        assert_eq!(Verb::Get.required_operations(), &[Operation::Select]);
        assert!(Verb::Delete.is_single_target());
        assert!(!Verb::Post.is_single_target());
        assert_eq!("patch".parse::<Verb>(), Ok(Verb::Patch));
        assert!("TRACE".parse::<Verb>().is_err());
    }

    #[test]
    fn test_property_type_scalar() {
        assert!(PropertyType::Enum(vec![]).is_scalar());
        assert!(!PropertyType::Object(vec![]).is_scalar());
        assert!(!PropertyType::Any.is_scalar());
    }
}
