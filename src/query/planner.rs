//! Pushdown splitting: which conditions the store answers, which run in memory
//!
//! The split only depends on the descriptor's store kind, so it happens once
//! per request before any store access:
//!
//! - `Sql` pushes down everything it can express as a `WHERE` clause
//! - `HashKv` pushes down `=` on indexed members only
//! - `InMemory` has nothing to push to
//!
//! Whatever the split, running the pushdown set in the store and then the
//! post-filter set in memory selects exactly the entities that the whole
//! condition list selects.

use crate::core::descriptor::{PropertyType, StoreKind};
use crate::core::operator::Operator;
use crate::core::value::Value;
use crate::query::condition::Condition;
use crate::query::predicate::Predicate;

/// A condition list partitioned for one store kind
#[derive(Debug, Clone)]
pub struct QueryPlan {
    store_kind: StoreKind,
    pushdown: Vec<Condition>,
    post_filter: Predicate,
}

impl QueryPlan {
    /// Partition `conditions` for `store_kind`, keeping their relative order
    pub fn new(conditions: Vec<Condition>, store_kind: StoreKind) -> Self {
        let (pushdown, post_filter): (Vec<_>, Vec<_>) = conditions
            .into_iter()
            .partition(|condition| is_pushdown_eligible(condition, store_kind));

        tracing::debug!(
            store = %store_kind,
            pushdown = pushdown.len(),
            post_filter = post_filter.len(),
            "query planned"
        );

        Self {
            store_kind,
            pushdown,
            post_filter: Predicate::new(post_filter),
        }
    }

    pub fn store_kind(&self) -> StoreKind {
        self.store_kind
    }

    /// Conditions the store must apply
    pub fn pushdown(&self) -> &[Condition] {
        &self.pushdown
    }

    /// Conditions applied in memory after retrieval
    pub fn post_filter(&self) -> &Predicate {
        &self.post_filter
    }

    /// Whether the store must scan every entity
    pub fn is_full_scan(&self) -> bool {
        self.pushdown.is_empty()
    }

    /// Whether the store's results are final, so a result cap can be
    /// handed to the store
    pub fn is_exact(&self) -> bool {
        self.post_filter.is_trivial()
    }
}

/// Whether the store behind `store_kind` can answer `condition` itself
pub fn is_pushdown_eligible(condition: &Condition, store_kind: StoreKind) -> bool {
    match store_kind {
        StoreKind::Sql => sql_expressible(condition),
        StoreKind::HashKv => hash_lookup_eligible(condition),
        StoreKind::InMemory => false,
    }
}

/// `=` on a top-level declared scalar, the members a hash index covers.
///
/// `!=` is never answered from the index.
pub fn hash_lookup_eligible(condition: &Condition) -> bool {
    condition.operator() == Operator::Equals && condition.term().top_level_scalar().is_some()
}

/// Whether a JSON-document `WHERE` clause gives the same answer as the
/// in-memory evaluator.
///
/// Dynamic members have no declared type to guard on; ordered comparisons
/// against `null` and date-times compared outside a date-time member have
/// no faithful SQL rendering.
pub fn sql_expressible(condition: &Condition) -> bool {
    let term = condition.term();
    if term.is_dynamic() {
        return false;
    }
    let value = condition.value();
    let ordering = condition.operator().is_ordering();
    match (term.property_type(), value) {
        (_, Value::Null) => !ordering,
        (Some(PropertyType::DateTime), Value::DateTime(_)) => true,
        (Some(PropertyType::DateTime), _) => false,
        (_, Value::DateTime(_)) => false,
        _ => true,
    }
}
