//! # This-Conditions
//!
//! Condition parsing, pushdown planning and CRUD dispatch for REST resources
//! living in heterogeneous stores.
//!
//! ## Features
//!
//! - **Condition Grammar**: `key op value` segments joined by `&`, typed
//!   against the resource's declared properties
//! - **Meta-Conditions**: `limit`, `offset`, ordering, `select`, `add`,
//!   `rename`, `distinct`, `safepost` and `unsafe`
//! - **Pushdown Planning**: SQL, hash-indexed and in-memory stores each answer
//!   what they can; the rest is filtered in memory
//! - **Binding Resolution**: explicit handlers, then raw handlers, then the
//!   store's defaults, resolved once at registration
//! - **Ambiguity Guard**: single-target mutations refuse several matches
//!   unless `unsafe=true`
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use this_conditions::prelude::*;
//!
//! #[derive(Clone, Serialize, Deserialize)]
//! struct Person {
//!     id: Uuid,
//!     name: String,
//!     age: i64,
//! }
//!
//! impl Resource for Person {
//!     fn descriptor() -> ResourceDescriptor {
//!         ResourceDescriptor::new("Person")
//!             .property(PropertyDescriptor::new("name", PropertyType::String))
//!             .property(PropertyDescriptor::new("age", PropertyType::Integer))
//!     }
//!
//!     fn id(&self) -> Uuid {
//!         self.id
//!     }
//! }
//!
//! let registry = ResourceRegistry::builder()
//!     .register(Registration::<Person>::new().with_store(InMemoryStore::new()))
//!     .build()?;
//!
//! let people = registry
//!     .executor::<Person>()
//!     .unwrap()
//!     .get("age>=18", "order_asc=name&limit=10")
//!     .await?;
//! ```

pub mod config;
pub mod core;
pub mod logging;
pub mod query;
pub mod server;
pub mod storage;

/// Re-exports of commonly used types and traits
pub mod prelude {
    // === Core ===
    pub use crate::core::{
        ConfigError, Operation, Operator, OperatorSet, PropertyDescriptor, PropertyType,
        QueryError, QueryResult, Resource, ResourceDescriptor, StoreKind, Value, Verb,
    };

    // === Query ===
    pub use crate::query::{
        Condition, MetaConditions, QueryPlan, ResolveMode, Term, TermCache, parse_conditions,
        parse_meta_conditions,
    };

    // === Server ===
    pub use crate::server::{
        Deleter, Executor, Inserter, Outcome, RawDeleter, RawInserter, RawSelector, RawUpdater,
        Registration, Request, ResourceRegistry, Selector, Updater, WriteResult,
    };

    // === Storage ===
    pub use crate::storage::{HashKvStore, InMemoryStore, SqlBackend, SqlStore, StoreDriver};
    #[cfg(feature = "postgres")]
    pub use crate::storage::PgBackend;

    // === Config ===
    pub use crate::config::{CoreConfig, PropertyConfig, ResourceConfig, Settings};

    // === External dependencies ===
    pub use anyhow::Result;
    pub use async_trait::async_trait;
    pub use chrono::{DateTime, Utc};
    pub use serde::{Deserialize, Serialize};
    pub use uuid::Uuid;
}
