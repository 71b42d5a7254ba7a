//! Hash-indexed key/value store driver
//!
//! Every declared top-level scalar property gets a `value -> ids` index,
//! maintained on insert, update and delete. Equality lookups on those
//! properties intersect index sets; anything else is tested per entity.

use crate::core::descriptor::PropertyDescriptor;
use crate::core::{Resource, Value};
use crate::query::condition::Condition;
use crate::query::planner::hash_lookup_eligible;
use crate::query::predicate::Predicate;
use anyhow::{Result, anyhow};
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use uuid::Uuid;

struct HashKvState<T> {
    rows: IndexMap<Uuid, T>,
    /// property name -> member value -> ids
    index: HashMap<String, HashMap<Value, HashSet<Uuid>>>,
}

impl<T: Resource> HashKvState<T> {
    fn index_values(
        indexed: &[PropertyDescriptor],
        entity: &T,
    ) -> Result<Vec<(String, Value)>> {
        let document = entity.to_document()?;
        Ok(indexed
            .iter()
            .filter_map(|property| {
                let value = match document.get(&property.name) {
                    Some(json) => Value::from_json(json, Some(&property.property_type))?,
                    None => Value::Null,
                };
                Some((property.name.clone(), value))
            })
            .collect())
    }

    fn add(&mut self, indexed: &[PropertyDescriptor], entity: T) -> Result<()> {
        let id = entity.id();
        for (name, value) in Self::index_values(indexed, &entity)? {
            self.index
                .entry(name)
                .or_default()
                .entry(value)
                .or_default()
                .insert(id);
        }
        self.rows.insert(id, entity);
        Ok(())
    }

    fn remove(&mut self, indexed: &[PropertyDescriptor], id: &Uuid) -> Result<Option<T>> {
        let Some(entity) = self.rows.shift_remove(id) else {
            return Ok(None);
        };
        for (name, value) in Self::index_values(indexed, &entity)? {
            if let Some(values) = self.index.get_mut(&name) {
                if let Some(ids) = values.get_mut(&value) {
                    ids.remove(id);
                    if ids.is_empty() {
                        values.remove(&value);
                    }
                }
            }
        }
        Ok(Some(entity))
    }
}

/// Key/value store answering `=` on indexed properties from its hash index
#[derive(Clone)]
pub struct HashKvStore<T> {
    indexed: Arc<Vec<PropertyDescriptor>>,
    state: Arc<RwLock<HashKvState<T>>>,
}

impl<T: Resource> HashKvStore<T> {
    pub fn new() -> Self {
        let indexed = T::descriptor()
            .properties
            .into_iter()
            .filter(|p| p.property_type.is_scalar())
            .collect();
        Self {
            indexed: Arc::new(indexed),
            state: Arc::new(RwLock::new(HashKvState {
                rows: IndexMap::new(),
                index: HashMap::new(),
            })),
        }
    }

    pub fn with_entities(entities: impl IntoIterator<Item = T>) -> Result<Self> {
        let store = Self::new();
        store.insert(entities.into_iter().collect())?;
        Ok(store)
    }

    pub fn len(&self) -> Result<usize> {
        let state = self
            .state
            .read()
            .map_err(|e| anyhow!("Failed to acquire read lock: {}", e))?;
        Ok(state.rows.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Number of distinct values indexed for a property
    pub fn index_cardinality(&self, property: &str) -> Result<usize> {
        let state = self
            .state
            .read()
            .map_err(|e| anyhow!("Failed to acquire read lock: {}", e))?;
        Ok(state.index.get(property).map_or(0, HashMap::len))
    }

    /// Select entities matching every condition.
    ///
    /// The first indexed `=` seeds the candidate set and each further one
    /// intersects it; with none, every entity is a candidate.
    pub fn select(&self, conditions: &[Condition], cap: Option<usize>) -> Result<Vec<T>> {
        let (lookups, rest): (Vec<&Condition>, Vec<&Condition>) =
            conditions.iter().partition(|c| hash_lookup_eligible(c));
        let predicate = Predicate::new(rest.into_iter().cloned().collect());

        let state = self
            .state
            .read()
            .map_err(|e| anyhow!("Failed to acquire read lock: {}", e))?;

        let mut candidates: Option<HashSet<Uuid>> = None;
        for condition in lookups {
            let name = condition.term().key();
            let ids = state
                .index
                .get(name)
                .and_then(|values| values.get(condition.value()));
            let ids = match ids {
                Some(ids) => ids,
                None => return Ok(Vec::new()),
            };
            candidates = Some(match candidates {
                None => ids.clone(),
                Some(current) => current.intersection(ids).copied().collect(),
            });
        }

        let ordered: Vec<&T> = match candidates {
            None => state.rows.values().collect(),
            Some(ids) => {
                let mut found: Vec<(usize, &T)> = ids
                    .iter()
                    .filter_map(|id| state.rows.get_full(id).map(|(i, _, e)| (i, e)))
                    .collect();
                found.sort_by_key(|(i, _)| *i);
                found.into_iter().map(|(_, e)| e).collect()
            }
        };

        tracing::trace!(candidates = ordered.len(), "hash-kv candidates");

        let mut matched = Vec::new();
        for entity in ordered {
            if cap.is_some_and(|cap| matched.len() >= cap) {
                break;
            }
            if predicate.is_trivial() || predicate.matches(&entity.to_document()?) {
                matched.push(entity.clone());
            }
        }
        Ok(matched)
    }

    pub fn insert(&self, entities: Vec<T>) -> Result<Vec<T>> {
        let mut state = self
            .state
            .write()
            .map_err(|e| anyhow!("Failed to acquire write lock: {}", e))?;

        if let Some(existing) = entities.iter().find(|e| state.rows.contains_key(&e.id())) {
            return Err(anyhow!("Entity {} already exists", existing.id()));
        }
        for entity in &entities {
            state.add(&self.indexed, entity.clone())?;
        }
        Ok(entities)
    }

    pub fn update(&self, entities: Vec<T>) -> Result<Vec<T>> {
        let mut state = self
            .state
            .write()
            .map_err(|e| anyhow!("Failed to acquire write lock: {}", e))?;

        if let Some(missing) = entities.iter().find(|e| !state.rows.contains_key(&e.id())) {
            return Err(anyhow!("Entity {} not found", missing.id()));
        }
        for entity in &entities {
            // Replace in place to keep the insertion position
            let id = entity.id();
            let position = state.rows.get_index_of(&id);
            state.remove(&self.indexed, &id)?;
            state.add(&self.indexed, entity.clone())?;
            if let Some(position) = position {
                let last = state.rows.len() - 1;
                state.rows.move_index(last, position);
            }
        }
        Ok(entities)
    }

    pub fn delete(&self, entities: &[T]) -> Result<usize> {
        let mut state = self
            .state
            .write()
            .map_err(|e| anyhow!("Failed to acquire write lock: {}", e))?;

        let mut removed = 0;
        for entity in entities {
            if state.remove(&self.indexed, &entity.id())?.is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

impl<T: Resource> Default for HashKvStore<T> {
    fn default() -> Self {
        Self::new()
    }
}
