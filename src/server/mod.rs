//! Request dispatch for registered resources
//!
//! This module provides:
//! - Capability traits for the CRUD operations and their raw variants
//! - A `ResourceRegistry` resolving each operation's handler once
//! - A per-resource `Executor` running parse, plan, select and mutate
//! - The ambiguity guard protecting single-target mutations

pub mod executor;
pub mod guard;
pub mod operations;
pub mod registry;

pub use executor::{Executor, WriteResult};
pub use guard::{AmbiguityGuard, Verdict};
pub use operations::{
    Deleter, Inserter, RawDeleter, RawInserter, RawSelector, RawUpdater, Selector, Updater,
};
pub use registry::{
    BindingSource, Bindings, Outcome, Registration, Request, ResourceRegistry,
    ResourceRegistryBuilder,
};
