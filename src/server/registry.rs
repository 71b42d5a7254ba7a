//! Resource registry: operation bindings resolved once at registration
//!
//! Each registered resource type gets one [`Executor`], built from its
//! [`Registration`]. For every CRUD operation the handler is chosen once, in
//! this order:
//!
//! 1. the type's own strongly typed handler ([`Selector`], ...)
//! 2. its weakly typed handler ([`RawSelector`], ...)
//! 3. the store driver's default implementation
//!
//! A verb listed in the descriptor whose operations have no handler fails
//! the build with [`ConfigError::MissingOperation`].

use crate::config::{CoreConfig, Settings};
use crate::core::error::{ConfigError, QueryError, QueryResult};
use crate::core::{Operation, Resource, ResourceDescriptor, Verb};
use crate::query::term::TermCache;
use crate::server::executor::Executor;
use crate::server::operations::{
    Deleter, Inserter, RawAdapter, RawDeleter, RawInserter, RawSelector, RawUpdater, Selector,
    Updater,
};
use crate::storage::StoreDriver;
use async_trait::async_trait;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Bindings
// ---------------------------------------------------------------------------

/// Where an operation binding came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingSource {
    Explicit,
    Raw,
    Store,
}

impl fmt::Display for BindingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BindingSource::Explicit => "explicit",
            BindingSource::Raw => "raw",
            BindingSource::Store => "store",
        };
        f.write_str(name)
    }
}

/// The resolved handler of every operation of one resource type
pub struct Bindings<T: Resource> {
    pub(crate) selector: Option<Arc<dyn Selector<T>>>,
    pub(crate) inserter: Option<Arc<dyn Inserter<T>>>,
    pub(crate) updater: Option<Arc<dyn Updater<T>>>,
    pub(crate) deleter: Option<Arc<dyn Deleter<T>>>,
    sources: HashMap<Operation, BindingSource>,
}

impl<T: Resource> Bindings<T> {
    pub fn source(&self, operation: Operation) -> Option<BindingSource> {
        self.sources.get(&operation).copied()
    }

    pub fn is_bound(&self, operation: Operation) -> bool {
        self.sources.contains_key(&operation)
    }
}

fn pick<C: ?Sized>(
    explicit: Option<Arc<C>>,
    raw: Option<Arc<C>>,
    store: Option<Arc<C>>,
) -> Option<(Arc<C>, BindingSource)> {
    explicit
        .map(|h| (h, BindingSource::Explicit))
        .or_else(|| raw.map(|h| (h, BindingSource::Raw)))
        .or_else(|| store.map(|h| (h, BindingSource::Store)))
}

// ---------------------------------------------------------------------------
// Registration
// ---------------------------------------------------------------------------

/// Everything known about a resource type before the registry is built
pub struct Registration<T: Resource> {
    descriptor: ResourceDescriptor,
    store: Option<Arc<StoreDriver<T>>>,
    selector: Option<Arc<dyn Selector<T>>>,
    inserter: Option<Arc<dyn Inserter<T>>>,
    updater: Option<Arc<dyn Updater<T>>>,
    deleter: Option<Arc<dyn Deleter<T>>>,
    raw_selector: Option<Arc<dyn RawSelector>>,
    raw_inserter: Option<Arc<dyn RawInserter>>,
    raw_updater: Option<Arc<dyn RawUpdater>>,
    raw_deleter: Option<Arc<dyn RawDeleter>>,
}

impl<T: Resource> Registration<T> {
    pub fn new() -> Self {
        Self {
            descriptor: T::descriptor(),
            store: None,
            selector: None,
            inserter: None,
            updater: None,
            deleter: None,
            raw_selector: None,
            raw_inserter: None,
            raw_updater: None,
            raw_deleter: None,
        }
    }

    /// Back the resource with a store driver; its kind is recorded on the
    /// descriptor
    pub fn with_store(mut self, store: impl Into<StoreDriver<T>>) -> Self {
        let store = store.into();
        self.descriptor.store_kind = store.kind();
        self.store = Some(Arc::new(store));
        self
    }

    /// Replace the verbs the resource makes available
    pub fn verbs(mut self, verbs: &[Verb]) -> Self {
        self.descriptor.verbs = verbs.to_vec();
        self
    }

    pub fn selector(mut self, handler: impl Selector<T> + 'static) -> Self {
        self.selector = Some(Arc::new(handler));
        self
    }

    pub fn inserter(mut self, handler: impl Inserter<T> + 'static) -> Self {
        self.inserter = Some(Arc::new(handler));
        self
    }

    pub fn updater(mut self, handler: impl Updater<T> + 'static) -> Self {
        self.updater = Some(Arc::new(handler));
        self
    }

    pub fn deleter(mut self, handler: impl Deleter<T> + 'static) -> Self {
        self.deleter = Some(Arc::new(handler));
        self
    }

    pub fn raw_selector(mut self, handler: impl RawSelector + 'static) -> Self {
        self.raw_selector = Some(Arc::new(handler));
        self
    }

    pub fn raw_inserter(mut self, handler: impl RawInserter + 'static) -> Self {
        self.raw_inserter = Some(Arc::new(handler));
        self
    }

    pub fn raw_updater(mut self, handler: impl RawUpdater + 'static) -> Self {
        self.raw_updater = Some(Arc::new(handler));
        self
    }

    pub fn raw_deleter(mut self, handler: impl RawDeleter + 'static) -> Self {
        self.raw_deleter = Some(Arc::new(handler));
        self
    }

    pub fn descriptor(&self) -> &ResourceDescriptor {
        &self.descriptor
    }

    fn bind(self) -> (ResourceDescriptor, Bindings<T>) {
        let store = self.store;
        let mut sources = HashMap::new();

        let selector = pick(
            self.selector,
            self.raw_selector
                .map(|raw| Arc::new(RawAdapter::<dyn RawSelector, T>::new(raw)) as Arc<dyn Selector<T>>),
            store.clone().map(|s| s as Arc<dyn Selector<T>>),
        );
        let inserter = pick(
            self.inserter,
            self.raw_inserter
                .map(|raw| Arc::new(RawAdapter::<dyn RawInserter, T>::new(raw)) as Arc<dyn Inserter<T>>),
            store.clone().map(|s| s as Arc<dyn Inserter<T>>),
        );
        let updater = pick(
            self.updater,
            self.raw_updater
                .map(|raw| Arc::new(RawAdapter::<dyn RawUpdater, T>::new(raw)) as Arc<dyn Updater<T>>),
            store.clone().map(|s| s as Arc<dyn Updater<T>>),
        );
        let deleter = pick(
            self.deleter,
            self.raw_deleter
                .map(|raw| Arc::new(RawAdapter::<dyn RawDeleter, T>::new(raw)) as Arc<dyn Deleter<T>>),
            store.map(|s| s as Arc<dyn Deleter<T>>),
        );

        let mut record = |operation: Operation, source: Option<BindingSource>| {
            if let Some(source) = source {
                sources.insert(operation, source);
            }
        };
        record(Operation::Select, selector.as_ref().map(|(_, s)| *s));
        record(Operation::Insert, inserter.as_ref().map(|(_, s)| *s));
        record(Operation::Update, updater.as_ref().map(|(_, s)| *s));
        record(Operation::Delete, deleter.as_ref().map(|(_, s)| *s));

        let bindings = Bindings {
            selector: selector.map(|(h, _)| h),
            inserter: inserter.map(|(h, _)| h),
            updater: updater.map(|(h, _)| h),
            deleter: deleter.map(|(h, _)| h),
            sources,
        };
        (self.descriptor, bindings)
    }
}

impl<T: Resource> Default for Registration<T> {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Erased dispatch
// ---------------------------------------------------------------------------

/// A request addressed to a resource by name, with JSON in and out
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub resource: String,
    pub verb: Verb,
    pub conditions: String,
    pub meta_conditions: String,
    pub body: Option<serde_json::Value>,
}

impl Request {
    pub fn new(verb: Verb, resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            verb,
            conditions: String::new(),
            meta_conditions: String::new(),
            body: None,
        }
    }

    pub fn conditions(mut self, conditions: impl Into<String>) -> Self {
        self.conditions = conditions.into();
        self
    }

    pub fn meta(mut self, meta_conditions: impl Into<String>) -> Self {
        self.meta_conditions = meta_conditions.into();
        self
    }

    pub fn body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Result of an erased request
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Shaped documents of a GET
    Selected(Vec<serde_json::Value>),
    /// Documents written by POST, PATCH or PUT
    Written {
        inserted: Vec<serde_json::Value>,
        updated: Vec<serde_json::Value>,
    },
    /// Number of entities a DELETE removed
    Deleted(usize),
}

#[async_trait]
pub(crate) trait ErasedExecutor: Send + Sync {
    fn descriptor(&self) -> &ResourceDescriptor;

    async fn handle(&self, request: &Request) -> QueryResult<Outcome>;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

type PendingBuild = Box<
    dyn FnOnce(&BuildContext) -> Result<(Arc<dyn Any + Send + Sync>, Arc<dyn ErasedExecutor>), ConfigError>,
>;

struct Pending {
    type_id: TypeId,
    name: String,
    build: PendingBuild,
}

struct BuildContext {
    config: CoreConfig,
    terms: Arc<TermCache>,
}

/// Builder collecting registrations and configuration
#[derive(Default)]
pub struct ResourceRegistryBuilder {
    pending: Vec<Pending>,
    config: CoreConfig,
}

impl ResourceRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use configuration overrides and settings
    pub fn with_config(mut self, config: CoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Register a resource type
    pub fn register<T: Resource>(mut self, registration: Registration<T>) -> Self {
        let name = registration.descriptor().name.clone();
        let build: PendingBuild = Box::new(move |ctx: &BuildContext| {
            let (mut descriptor, bindings) = registration.bind();
            if let Some(overrides) = ctx.config.resource(&descriptor.name) {
                overrides.apply(&mut descriptor)?;
            }

            for verb in &descriptor.verbs {
                for operation in verb.required_operations() {
                    if !bindings.is_bound(*operation) {
                        return Err(ConfigError::MissingOperation {
                            resource: descriptor.name.clone(),
                            verb: *verb,
                            operation: operation.as_str(),
                        });
                    }
                }
            }

            tracing::info!(
                resource = %descriptor.name,
                store = %descriptor.store_kind,
                select = ?bindings.source(Operation::Select),
                insert = ?bindings.source(Operation::Insert),
                update = ?bindings.source(Operation::Update),
                delete = ?bindings.source(Operation::Delete),
                "resource registered"
            );

            let executor = Arc::new(Executor::new(
                descriptor,
                bindings,
                ctx.terms.clone(),
                &ctx.config.settings,
            ));
            Ok((executor.clone() as Arc<dyn Any + Send + Sync>, executor as Arc<dyn ErasedExecutor>))
        });
        self.pending.push(Pending {
            type_id: TypeId::of::<T>(),
            name,
            build,
        });
        self
    }

    /// Resolve every binding and apply configuration overrides
    pub fn build(self) -> Result<ResourceRegistry, ConfigError> {
        self.config.validate()?;

        for overrides in &self.config.resources {
            if !self
                .pending
                .iter()
                .any(|p| p.name.eq_ignore_ascii_case(&overrides.name))
            {
                return Err(ConfigError::UnknownResource {
                    resource: overrides.name.clone(),
                });
            }
        }

        let ctx = BuildContext {
            config: self.config,
            terms: Arc::new(TermCache::new()),
        };
        let mut typed = HashMap::new();
        let mut names: HashMap<String, Arc<dyn ErasedExecutor>> = HashMap::new();
        for pending in self.pending {
            let key = pending.name.to_ascii_lowercase();
            if names.contains_key(&key) || typed.contains_key(&pending.type_id) {
                return Err(ConfigError::DuplicateResource {
                    resource: pending.name,
                });
            }
            let (any, erased) = (pending.build)(&ctx)?;
            typed.insert(pending.type_id, any);
            names.insert(key, erased);
        }

        Ok(ResourceRegistry {
            typed,
            names,
            terms: ctx.terms,
            settings: ctx.config.settings,
        })
    }
}

/// Every registered resource with its resolved bindings
pub struct ResourceRegistry {
    typed: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
    names: HashMap<String, Arc<dyn ErasedExecutor>>,
    terms: Arc<TermCache>,
    settings: Settings,
}

impl ResourceRegistry {
    pub fn builder() -> ResourceRegistryBuilder {
        ResourceRegistryBuilder::new()
    }

    /// The typed executor of a registered resource type
    pub fn executor<T: Resource>(&self) -> Option<Arc<Executor<T>>> {
        self.typed
            .get(&TypeId::of::<T>())
            .cloned()
            .and_then(|any| any.downcast::<Executor<T>>().ok())
    }

    /// Descriptor of a resource, by case-insensitive name
    pub fn descriptor(&self, name: &str) -> Option<&ResourceDescriptor> {
        self.names
            .get(&name.to_ascii_lowercase())
            .map(|executor| executor.descriptor())
    }

    /// Names of every registered resource
    pub fn resource_names(&self) -> Vec<&str> {
        self.names
            .values()
            .map(|executor| executor.descriptor().name.as_str())
            .collect()
    }

    pub fn term_cache(&self) -> &Arc<TermCache> {
        &self.terms
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Dispatch a request by resource name
    pub async fn handle(&self, request: &Request) -> QueryResult<Outcome> {
        let executor = self
            .names
            .get(&request.resource.to_ascii_lowercase())
            .ok_or_else(|| QueryError::UnknownResource {
                name: request.resource.clone(),
            })?;
        executor.handle(request).await
    }
}
