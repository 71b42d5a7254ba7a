//! In-memory evaluation of post-filter conditions

use crate::core::operator::Operator;
use crate::query::condition::Condition;
use std::cmp::Ordering;

/// Compiled conjunction of conditions, reusable across entities
#[derive(Debug, Clone, Default)]
pub struct Predicate {
    conditions: Vec<Condition>,
}

impl Predicate {
    pub fn new(conditions: Vec<Condition>) -> Self {
        Self { conditions }
    }

    /// A predicate that holds for every document
    pub fn always() -> Self {
        Self::default()
    }

    pub fn is_trivial(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Test a document against every condition
    pub fn matches(&self, document: &serde_json::Value) -> bool {
        self.conditions
            .iter()
            .all(|condition| evaluate(condition, document))
    }
}

/// Test one condition.
///
/// A member that cannot be compared (an array, an object or a value of
/// another type) fails `=` and every ordered operator, and passes `!=`.
pub fn evaluate(condition: &Condition, document: &serde_json::Value) -> bool {
    let actual = condition.term().evaluate(document);
    let expected = condition.value();

    match condition.operator() {
        Operator::Equals => actual.is_some_and(|v| v == *expected),
        Operator::NotEquals => actual.is_none_or(|v| v != *expected),
        ordering => actual
            .and_then(|v| v.compare(expected))
            .is_some_and(|ord| satisfies(ordering, ord)),
    }
}

fn satisfies(operator: Operator, ordering: Ordering) -> bool {
    match operator {
        Operator::LessThan => ordering == Ordering::Less,
        Operator::GreaterThan => ordering == Ordering::Greater,
        Operator::LessOrEqual => ordering != Ordering::Greater,
        Operator::GreaterOrEqual => ordering != Ordering::Less,
        Operator::Equals => ordering == Ordering::Equal,
        Operator::NotEquals => ordering != Ordering::Equal,
    }
}
