//! In-memory store driver for testing and development

use crate::core::Resource;
use crate::query::condition::Condition;
use crate::query::predicate::Predicate;
use anyhow::{Result, anyhow};
use indexmap::IndexMap;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

/// Insertion-ordered entity collection.
///
/// Nothing is pushed down to it; every condition it receives is tested
/// against each entity's document. Uses RwLock for thread-safe access.
#[derive(Clone)]
pub struct InMemoryStore<T> {
    rows: Arc<RwLock<IndexMap<Uuid, T>>>,
}

impl<T: Resource> InMemoryStore<T> {
    pub fn new() -> Self {
        Self {
            rows: Arc::new(RwLock::new(IndexMap::new())),
        }
    }

    /// Create a store already holding `entities`
    pub fn with_entities(entities: impl IntoIterator<Item = T>) -> Self {
        let rows = entities.into_iter().map(|e| (e.id(), e)).collect();
        Self {
            rows: Arc::new(RwLock::new(rows)),
        }
    }

    pub fn len(&self) -> Result<usize> {
        let rows = self
            .rows
            .read()
            .map_err(|e| anyhow!("Failed to acquire read lock: {}", e))?;
        Ok(rows.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn select(&self, conditions: &[Condition], cap: Option<usize>) -> Result<Vec<T>> {
        let predicate = Predicate::new(conditions.to_vec());
        let rows = self
            .rows
            .read()
            .map_err(|e| anyhow!("Failed to acquire read lock: {}", e))?;

        let mut matched = Vec::new();
        for entity in rows.values() {
            if cap.is_some_and(|cap| matched.len() >= cap) {
                break;
            }
            if predicate.is_trivial() || predicate.matches(&entity.to_document()?) {
                matched.push(entity.clone());
            }
        }
        Ok(matched)
    }

    /// Insert every entity; fails without inserting any if one id exists
    pub fn insert(&self, entities: Vec<T>) -> Result<Vec<T>> {
        let mut rows = self
            .rows
            .write()
            .map_err(|e| anyhow!("Failed to acquire write lock: {}", e))?;

        if let Some(existing) = entities.iter().find(|e| rows.contains_key(&e.id())) {
            return Err(anyhow!("Entity {} already exists", existing.id()));
        }
        for entity in &entities {
            rows.insert(entity.id(), entity.clone());
        }
        Ok(entities)
    }

    /// Replace every entity; fails without updating any if one is missing
    pub fn update(&self, entities: Vec<T>) -> Result<Vec<T>> {
        let mut rows = self
            .rows
            .write()
            .map_err(|e| anyhow!("Failed to acquire write lock: {}", e))?;

        if let Some(missing) = entities.iter().find(|e| !rows.contains_key(&e.id())) {
            return Err(anyhow!("Entity {} not found", missing.id()));
        }
        for entity in &entities {
            rows.insert(entity.id(), entity.clone());
        }
        Ok(entities)
    }

    pub fn delete(&self, entities: &[T]) -> Result<usize> {
        let mut rows = self
            .rows
            .write()
            .map_err(|e| anyhow!("Failed to acquire write lock: {}", e))?;

        Ok(entities
            .iter()
            .filter(|e| rows.shift_remove(&e.id()).is_some())
            .count())
    }
}

impl<T: Resource> Default for InMemoryStore<T> {
    fn default() -> Self {
        Self::new()
    }
}
