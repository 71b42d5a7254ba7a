//! Output shaping driven by meta-conditions: ordering, windowing, `add`,
//! `select`, `rename`, `distinct`, and merge patches for request bodies

use crate::core::value::Value;
use crate::query::meta::{Direction, MetaConditions, OrderBy};
use crate::query::term::Term;
use serde_json::Map;
use std::cmp::Ordering;
use std::collections::HashSet;

// ---------------------------------------------------------------------------
// Ordering and windowing
// ---------------------------------------------------------------------------

/// Stable sort by the order term.
///
/// Ascending puts null, missing and unreadable members first; pairs without
/// an order between them keep their relative position.
pub fn sort_by_term<E>(items: &mut [E], order: &OrderBy, document: impl Fn(&E) -> &serde_json::Value) {
    items.sort_by(|a, b| {
        let ordering = compare_members(
            order.term.evaluate(document(a)),
            order.term.evaluate(document(b)),
        );
        match order.direction {
            Direction::Ascending => ordering,
            Direction::Descending => ordering.reverse(),
        }
    });
}

fn compare_members(a: Option<Value>, b: Option<Value>) -> Ordering {
    let rank = |v: &Option<Value>| match v {
        None | Some(Value::Null) => 0,
        Some(_) => 1,
    };
    match (rank(&a), rank(&b)) {
        (1, 1) => match (a, b) {
            (Some(a), Some(b)) => a.compare(&b).unwrap_or(Ordering::Equal),
            _ => Ordering::Equal,
        },
        (ra, rb) => ra.cmp(&rb),
    }
}

/// Skip `offset` items, then keep at most `limit`
pub fn window<E>(items: Vec<E>, offset: usize, limit: Option<usize>) -> Vec<E> {
    items
        .into_iter()
        .skip(offset)
        .take(limit.unwrap_or(usize::MAX))
        .collect()
}

// ---------------------------------------------------------------------------
// add / select / rename
// ---------------------------------------------------------------------------

fn member(term: &Term, document: &serde_json::Value) -> serde_json::Value {
    term.read(document)
        .cloned()
        .unwrap_or(serde_json::Value::Null)
}

/// Shape one document: `add`, then `select`, then `rename`
pub fn shape(document: &serde_json::Value, meta: &MetaConditions) -> serde_json::Value {
    let operation = meta.post_operation();
    let mut output = if operation.selects() {
        let mut selected = Map::new();
        for term in &meta.select {
            selected.insert(term.key().to_string(), member(term, document));
        }
        serde_json::Value::Object(selected)
    } else {
        document.clone()
    };

    if operation.adds() {
        if let serde_json::Value::Object(map) = &mut output {
            for term in &meta.add {
                map.insert(term.key().to_string(), member(term, document));
            }
        }
    }

    if operation.renames() {
        for (term, new_name) in &meta.rename {
            let value = take(&mut output, term);
            if let serde_json::Value::Object(map) = &mut output {
                map.insert(new_name.clone(), value);
            }
        }
    }

    output
}

/// Remove the member a term names, whether it sits under its flat dotted
/// key or along its path
fn take(output: &mut serde_json::Value, term: &Term) -> serde_json::Value {
    let Some(map) = output.as_object_mut() else {
        return serde_json::Value::Null;
    };
    if let Some(value) = map.remove(term.key()) {
        return value;
    }
    remove_path(output, &term.path()).unwrap_or(serde_json::Value::Null)
}

fn remove_path(document: &mut serde_json::Value, path: &[&str]) -> Option<serde_json::Value> {
    let (last, parents) = path.split_last()?;
    let mut current = document;
    for segment in parents {
        current = current.as_object_mut()?.get_mut(*segment)?;
    }
    current.as_object_mut()?.remove(*last)
}

/// Drop repeated documents, keeping the first occurrence
pub fn distinct(documents: Vec<serde_json::Value>) -> Vec<serde_json::Value> {
    let mut seen = HashSet::new();
    documents
        .into_iter()
        .filter(|document| seen.insert(document.to_string()))
        .collect()
}

// ---------------------------------------------------------------------------
// Merge patches
// ---------------------------------------------------------------------------

/// Apply a JSON merge patch: objects merge member-wise, `null` removes a
/// member, anything else replaces the target
pub fn merge_patch(target: &mut serde_json::Value, patch: &serde_json::Value) {
    let serde_json::Value::Object(members) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = serde_json::Value::Object(Map::new());
    }
    if let serde_json::Value::Object(map) = target {
        for (key, value) in members {
            if value.is_null() {
                map.remove(key);
            } else {
                merge_patch(map.entry(key.clone()).or_insert(serde_json::Value::Null), value);
            }
        }
    }
}
