//! Store drivers: the three kinds of backing store a resource can live in

pub mod hash_kv;
pub mod in_memory;
pub mod sql;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use hash_kv::HashKvStore;
pub use in_memory::InMemoryStore;
pub use sql::{SqlBackend, SqlParam, SqlStatement, SqlStore};

#[cfg(feature = "postgres")]
pub use postgres::PgBackend;

use crate::core::{Resource, StoreKind};
use crate::query::condition::Condition;
use anyhow::Result;

/// The backing store of one resource, chosen at registration.
///
/// Its [`StoreKind`] is copied onto the resource descriptor, which is what
/// the planner consults.
#[derive(Clone)]
pub enum StoreDriver<T> {
    InMemory(InMemoryStore<T>),
    HashKv(HashKvStore<T>),
    Sql(SqlStore<T>),
}

impl<T: Resource> StoreDriver<T> {
    pub fn kind(&self) -> StoreKind {
        match self {
            StoreDriver::InMemory(_) => StoreKind::InMemory,
            StoreDriver::HashKv(_) => StoreKind::HashKv,
            StoreDriver::Sql(_) => StoreKind::Sql,
        }
    }

    /// Select entities matching every condition, stopping at `cap`
    pub async fn select(&self, conditions: &[Condition], cap: Option<usize>) -> Result<Vec<T>> {
        match self {
            StoreDriver::InMemory(store) => store.select(conditions, cap),
            StoreDriver::HashKv(store) => store.select(conditions, cap),
            StoreDriver::Sql(store) => store.select(conditions, cap).await,
        }
    }

    pub async fn insert(&self, entities: Vec<T>) -> Result<Vec<T>> {
        match self {
            StoreDriver::InMemory(store) => store.insert(entities),
            StoreDriver::HashKv(store) => store.insert(entities),
            StoreDriver::Sql(store) => store.insert(entities).await,
        }
    }

    pub async fn update(&self, entities: Vec<T>) -> Result<Vec<T>> {
        match self {
            StoreDriver::InMemory(store) => store.update(entities),
            StoreDriver::HashKv(store) => store.update(entities),
            StoreDriver::Sql(store) => store.update(entities).await,
        }
    }

    pub async fn delete(&self, entities: &[T]) -> Result<usize> {
        match self {
            StoreDriver::InMemory(store) => store.delete(entities),
            StoreDriver::HashKv(store) => store.delete(entities),
            StoreDriver::Sql(store) => store.delete(entities).await,
        }
    }
}

impl<T> From<InMemoryStore<T>> for StoreDriver<T> {
    fn from(store: InMemoryStore<T>) -> Self {
        StoreDriver::InMemory(store)
    }
}

impl<T> From<HashKvStore<T>> for StoreDriver<T> {
    fn from(store: HashKvStore<T>) -> Self {
        StoreDriver::HashKv(store)
    }
}

impl<T> From<SqlStore<T>> for StoreDriver<T> {
    fn from(store: SqlStore<T>) -> Self {
        StoreDriver::Sql(store)
    }
}
