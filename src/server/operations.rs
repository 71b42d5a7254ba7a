//! Capability traits for the four CRUD operations
//!
//! A resource type may implement any of these itself. Strongly typed
//! handlers take precedence over weakly typed (`Raw*`) ones, which take
//! precedence over the store driver's default implementation.
//!
//! Select handlers receive the pushdown conditions of the query plan and
//! must apply all of them; the post-filter conditions are applied after.

use crate::core::Resource;
use crate::query::condition::Condition;
use crate::storage::StoreDriver;
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::marker::PhantomData;
use std::sync::Arc;

#[async_trait]
pub trait Selector<T: Resource>: Send + Sync {
    /// Select entities matching every condition, stopping at `cap` if given
    async fn select(&self, conditions: &[Condition], cap: Option<usize>) -> Result<Vec<T>>;
}

#[async_trait]
pub trait Inserter<T: Resource>: Send + Sync {
    /// Insert a batch, returning the stored entities
    async fn insert(&self, entities: Vec<T>) -> Result<Vec<T>>;
}

#[async_trait]
pub trait Updater<T: Resource>: Send + Sync {
    /// Replace a batch of existing entities, returning the stored entities
    async fn update(&self, entities: Vec<T>) -> Result<Vec<T>>;
}

#[async_trait]
pub trait Deleter<T: Resource>: Send + Sync {
    /// Delete a batch, returning how many were removed
    async fn delete(&self, entities: Vec<T>) -> Result<usize>;
}

// ---------------------------------------------------------------------------
// Weakly typed capabilities
// ---------------------------------------------------------------------------

#[async_trait]
pub trait RawSelector: Send + Sync {
    async fn select(&self, conditions: &[Condition], cap: Option<usize>) -> Result<Vec<serde_json::Value>>;
}

#[async_trait]
pub trait RawInserter: Send + Sync {
    async fn insert(&self, documents: Vec<serde_json::Value>) -> Result<Vec<serde_json::Value>>;
}

#[async_trait]
pub trait RawUpdater: Send + Sync {
    async fn update(&self, documents: Vec<serde_json::Value>) -> Result<Vec<serde_json::Value>>;
}

#[async_trait]
pub trait RawDeleter: Send + Sync {
    async fn delete(&self, documents: Vec<serde_json::Value>) -> Result<usize>;
}

/// Lifts a weakly typed handler to a strongly typed capability by going
/// through entity documents
pub struct RawAdapter<R: ?Sized, T> {
    inner: Arc<R>,
    _marker: PhantomData<fn() -> T>,
}

impl<R: ?Sized, T> RawAdapter<R, T> {
    pub fn new(inner: Arc<R>) -> Self {
        Self {
            inner,
            _marker: PhantomData,
        }
    }
}

fn to_documents<T: Resource>(entities: &[T]) -> Result<Vec<serde_json::Value>> {
    entities
        .iter()
        .map(|e| {
            e.to_document()
                .map_err(|err| anyhow!("Failed to serialize entity: {}", err))
        })
        .collect()
}

fn from_documents<T: Resource>(documents: Vec<serde_json::Value>) -> Result<Vec<T>> {
    documents
        .into_iter()
        .map(|d| T::from_document(d).map_err(|err| anyhow!("Failed to deserialize entity: {}", err)))
        .collect()
}

#[async_trait]
impl<T: Resource> Selector<T> for RawAdapter<dyn RawSelector, T> {
    async fn select(&self, conditions: &[Condition], cap: Option<usize>) -> Result<Vec<T>> {
        from_documents(self.inner.select(conditions, cap).await?)
    }
}

#[async_trait]
impl<T: Resource> Inserter<T> for RawAdapter<dyn RawInserter, T> {
    async fn insert(&self, entities: Vec<T>) -> Result<Vec<T>> {
        from_documents(self.inner.insert(to_documents(&entities)?).await?)
    }
}

#[async_trait]
impl<T: Resource> Updater<T> for RawAdapter<dyn RawUpdater, T> {
    async fn update(&self, entities: Vec<T>) -> Result<Vec<T>> {
        from_documents(self.inner.update(to_documents(&entities)?).await?)
    }
}

#[async_trait]
impl<T: Resource> Deleter<T> for RawAdapter<dyn RawDeleter, T> {
    async fn delete(&self, entities: Vec<T>) -> Result<usize> {
        self.inner.delete(to_documents(&entities)?).await
    }
}

// ---------------------------------------------------------------------------
// Store defaults
// ---------------------------------------------------------------------------

#[async_trait]
impl<T: Resource> Selector<T> for StoreDriver<T> {
    async fn select(&self, conditions: &[Condition], cap: Option<usize>) -> Result<Vec<T>> {
        StoreDriver::select(self, conditions, cap).await
    }
}

#[async_trait]
impl<T: Resource> Inserter<T> for StoreDriver<T> {
    async fn insert(&self, entities: Vec<T>) -> Result<Vec<T>> {
        StoreDriver::insert(self, entities).await
    }
}

#[async_trait]
impl<T: Resource> Updater<T> for StoreDriver<T> {
    async fn update(&self, entities: Vec<T>) -> Result<Vec<T>> {
        StoreDriver::update(self, entities).await
    }
}

#[async_trait]
impl<T: Resource> Deleter<T> for StoreDriver<T> {
    async fn delete(&self, entities: Vec<T>) -> Result<usize> {
        StoreDriver::delete(self, &entities).await
    }
}
