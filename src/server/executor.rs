//! Per-resource request pipeline
//!
//! parse conditions and meta-conditions -> plan -> select (pushdown) ->
//! post-filter -> order, offset, limit -> ambiguity guard -> dispatch ->
//! shape.
//!
//! Parsing, term resolution and body validation all happen before the first
//! store call, so malformed requests have no side effects.

use crate::config::Settings;
use crate::core::error::{ConfigError, QueryError, QueryResult};
use crate::core::{Operation, Operator, Resource, ResourceDescriptor, Value, Verb};
use crate::query::condition::{Condition, parse_conditions};
use crate::query::meta::{MetaConditions, parse_meta_conditions};
use crate::query::planner::QueryPlan;
use crate::query::shaping;
use crate::query::term::TermCache;
use crate::server::guard::{AmbiguityGuard, Verdict};
use crate::server::registry::{Bindings, ErasedExecutor, Outcome, Request};
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

/// Entities written by an insert-or-update request
#[derive(Debug, Clone, PartialEq)]
pub struct WriteResult<T> {
    pub inserted: Vec<T>,
    pub updated: Vec<T>,
}

impl<T> Default for WriteResult<T> {
    fn default() -> Self {
        Self {
            inserted: Vec::new(),
            updated: Vec::new(),
        }
    }
}

/// An entity read from the store together with its document
struct Selected<T> {
    entity: T,
    document: serde_json::Value,
}

/// Runs requests against one resource type
pub struct Executor<T: Resource> {
    descriptor: ResourceDescriptor,
    bindings: Bindings<T>,
    terms: Arc<TermCache>,
    guard: AmbiguityGuard,
    default_limit: Option<usize>,
}

impl<T: Resource> Executor<T> {
    pub(crate) fn new(
        descriptor: ResourceDescriptor,
        bindings: Bindings<T>,
        terms: Arc<TermCache>,
        settings: &Settings,
    ) -> Self {
        Self {
            descriptor,
            bindings,
            terms,
            guard: AmbiguityGuard::new(settings.ambiguity_probe),
            default_limit: settings.default_limit,
        }
    }

    pub fn descriptor(&self) -> &ResourceDescriptor {
        &self.descriptor
    }

    pub fn bindings(&self) -> &Bindings<T> {
        &self.bindings
    }

    pub fn guard(&self) -> &AmbiguityGuard {
        &self.guard
    }

    // -----------------------------------------------------------------------
    // Request setup
    // -----------------------------------------------------------------------

    fn ensure_allowed(&self, verb: Verb) -> QueryResult<()> {
        if self.descriptor.allows(verb) {
            Ok(())
        } else {
            Err(QueryError::MethodNotAllowed {
                resource: self.descriptor.name.clone(),
                verb,
            })
        }
    }

    fn missing(&self, verb: Verb, operation: Operation) -> QueryError {
        ConfigError::MissingOperation {
            resource: self.descriptor.name.clone(),
            verb,
            operation: operation.as_str(),
        }
        .into()
    }

    fn parse(&self, conditions: &str, meta: &str) -> QueryResult<(Vec<Condition>, MetaConditions)> {
        let conditions = parse_conditions(conditions, &self.descriptor, &self.terms)?;
        let meta = parse_meta_conditions(meta, &self.descriptor, &self.terms)?;
        Ok((conditions, meta))
    }

    fn invalid_body(&self, message: impl Into<String>) -> QueryError {
        QueryError::InvalidBody {
            resource: self.descriptor.name.clone(),
            message: message.into(),
        }
    }

    /// Reject bodies that are not objects or that write read-only members
    fn check_body(&self, body: &serde_json::Value) -> QueryResult<()> {
        let members = body
            .as_object()
            .ok_or_else(|| self.invalid_body("body must be a JSON object"))?;
        for key in members.keys() {
            if key == T::id_field() {
                continue;
            }
            if let Some(property) = self
                .descriptor
                .find_properties(key)
                .find(|p| p.read_only)
            {
                return Err(QueryError::ReadOnlyProperty {
                    resource: self.descriptor.name.clone(),
                    property: property.name.clone(),
                });
            }
        }
        Ok(())
    }

    fn document(&self, entity: &T) -> QueryResult<serde_json::Value> {
        entity
            .to_document()
            .map_err(|e| self.invalid_body(format!("failed to serialize entity: {}", e)))
    }

    fn entity(&self, document: serde_json::Value) -> QueryResult<T> {
        T::from_document(document).map_err(|e| self.invalid_body(e.to_string()))
    }

    // -----------------------------------------------------------------------
    // Selection
    // -----------------------------------------------------------------------

    /// Select through the bound selector and apply the post-filter.
    ///
    /// With `view`, ordering and the offset/limit window are applied;
    /// `cap` bounds the final count either way.
    async fn run_select(
        &self,
        verb: Verb,
        conditions: Vec<Condition>,
        view: Option<(&MetaConditions, Option<usize>)>,
        cap: Option<usize>,
    ) -> QueryResult<Vec<Selected<T>>> {
        let selector = self
            .bindings
            .selector
            .as_ref()
            .ok_or_else(|| self.missing(verb, Operation::Select))?;
        let plan = QueryPlan::new(conditions, self.descriptor.store_kind);

        // The store may stop early only when its answer is final and
        // unordered
        let ordered = view.is_some_and(|(meta, _)| meta.order_by.is_some());
        let window_end = view.and_then(|(meta, limit)| limit.map(|l| l.saturating_add(meta.offset)));
        let store_cap = if plan.is_exact() && !ordered {
            match (cap, window_end) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            }
        } else {
            None
        };

        let entities = selector
            .select(plan.pushdown(), store_cap)
            .await
            .map_err(|source| {
                tracing::warn!(resource = %self.descriptor.name, error = %source, "selector failed");
                QueryError::AbortedSelector {
                    resource: self.descriptor.name.clone(),
                    source,
                }
            })?;

        let mut selected = Vec::with_capacity(entities.len());
        for entity in entities {
            let document = entity.to_document().map_err(|e| QueryError::AbortedSelector {
                resource: self.descriptor.name.clone(),
                source: e.into(),
            })?;
            if plan.post_filter().matches(&document) {
                selected.push(Selected { entity, document });
            }
        }

        if let Some((meta, limit)) = view {
            if let Some(order) = &meta.order_by {
                shaping::sort_by_term(&mut selected, order, |s| &s.document);
            }
            selected = shaping::window(selected, meta.offset, limit);
        }
        if let Some(cap) = cap {
            selected.truncate(cap);
        }
        Ok(selected)
    }

    /// Select the targets of a single-target mutation through the guard
    async fn select_targets(
        &self,
        verb: Verb,
        conditions: Vec<Condition>,
        meta: &MetaConditions,
    ) -> QueryResult<Vec<Selected<T>>> {
        let probe = self
            .run_select(verb, conditions.clone(), None, Some(self.guard.probe()))
            .await?;
        match self
            .guard
            .judge(&self.descriptor.name, verb, probe.len(), meta.unsafe_mode)?
        {
            Verdict::NoMatch => Ok(Vec::new()),
            Verdict::Single => Ok(probe),
            Verdict::Multiple => {
                self.run_select(verb, conditions, Some((meta, meta.limit)), None)
                    .await
            }
        }
    }

    /// Entities matching the conditions, ordered and windowed
    pub async fn select(&self, conditions: &str, meta: &str) -> QueryResult<Vec<T>> {
        self.ensure_allowed(Verb::Get)?;
        let (conditions, meta) = self.parse(conditions, meta)?;
        let limit = meta.limit_or(self.default_limit);
        let selected = self
            .run_select(Verb::Get, conditions, Some((&meta, limit)), None)
            .await?;
        Ok(selected.into_iter().map(|s| s.entity).collect())
    }

    /// Shaped documents of the entities matching the conditions
    pub async fn get(&self, conditions: &str, meta: &str) -> QueryResult<Vec<serde_json::Value>> {
        self.ensure_allowed(Verb::Get)?;
        let (conditions, meta) = self.parse(conditions, meta)?;
        let limit = meta.limit_or(self.default_limit);
        let selected = self
            .run_select(Verb::Get, conditions, Some((&meta, limit)), None)
            .await?;
        let shaped: Vec<serde_json::Value> = selected
            .iter()
            .map(|s| shaping::shape(&s.document, &meta))
            .collect();
        Ok(if meta.distinct {
            shaping::distinct(shaped)
        } else {
            shaped
        })
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    async fn dispatch_insert(&self, verb: Verb, entities: Vec<T>) -> QueryResult<Vec<T>> {
        if entities.is_empty() {
            return Ok(entities);
        }
        let inserter = self
            .bindings
            .inserter
            .as_ref()
            .ok_or_else(|| self.missing(verb, Operation::Insert))?;
        inserter.insert(entities).await.map_err(|source| {
            tracing::warn!(resource = %self.descriptor.name, error = %source, "inserter failed");
            QueryError::AbortedInserter {
                resource: self.descriptor.name.clone(),
                source,
            }
        })
    }

    async fn dispatch_update(&self, verb: Verb, entities: Vec<T>) -> QueryResult<Vec<T>> {
        if entities.is_empty() {
            return Ok(entities);
        }
        let updater = self
            .bindings
            .updater
            .as_ref()
            .ok_or_else(|| self.missing(verb, Operation::Update))?;
        updater.update(entities).await.map_err(|source| {
            tracing::warn!(resource = %self.descriptor.name, error = %source, "updater failed");
            QueryError::AbortedUpdater {
                resource: self.descriptor.name.clone(),
                source,
            }
        })
    }

    /// Rebuild `target` with `document`'s members, keeping `target`'s
    /// identity
    fn with_identity_of(&self, mut document: serde_json::Value, target: &Selected<T>) -> QueryResult<T> {
        let id_field = T::id_field();
        let id = target
            .document
            .get(id_field)
            .cloned()
            .unwrap_or(serde_json::Value::Null);
        if let Some(members) = document.as_object_mut() {
            members.insert(id_field.to_string(), id);
        }
        self.entity(document)
    }

    fn patched(&self, targets: &[Selected<T>], body: &serde_json::Value) -> QueryResult<Vec<T>> {
        targets
            .iter()
            .map(|target| {
                let mut document = target.document.clone();
                shaping::merge_patch(&mut document, body);
                self.with_identity_of(document, target)
            })
            .collect()
    }

    /// Insert entities.
    ///
    /// With `safepost`, each entity is first looked up by equality on the
    /// listed terms: no match inserts it, one match updates that entity,
    /// several are ambiguous unless `unsafe=true`.
    pub async fn insert(&self, entities: Vec<T>, meta: &str) -> QueryResult<WriteResult<T>> {
        self.ensure_allowed(Verb::Post)?;
        let meta = parse_meta_conditions(meta, &self.descriptor, &self.terms)?;

        let Some(terms) = &meta.safepost else {
            self.check_singleton(entities.len()).await?;
            let inserted = self.dispatch_insert(Verb::Post, entities).await?;
            return Ok(WriteResult {
                inserted,
                ..Default::default()
            });
        };

        // Resolve every lookup before touching the store
        let mut lookups = Vec::with_capacity(entities.len());
        for entity in entities {
            let document = self.document(&entity)?;
            let mut conditions = Vec::with_capacity(terms.len());
            for term in terms {
                let value: Value = term.evaluate(&document).ok_or_else(|| {
                    self.invalid_body(format!("'{}' cannot identify an entity", term.key()))
                })?;
                conditions.push(Condition::new(term.clone(), Operator::Equals, value)?);
            }
            lookups.push((entity, document, conditions));
        }

        // Every verdict is in before the first write
        let mut updates = Vec::new();
        let mut to_insert = Vec::new();
        for (entity, document, conditions) in lookups {
            let targets = self.select_targets(Verb::Post, conditions, &meta).await?;
            if targets.is_empty() {
                to_insert.push(entity);
                continue;
            }
            for target in &targets {
                updates.push(self.with_identity_of(document.clone(), target)?);
            }
        }
        self.check_singleton(to_insert.len()).await?;

        let updated = self.dispatch_update(Verb::Post, updates).await?;
        let inserted = self.dispatch_insert(Verb::Post, to_insert).await?;
        Ok(WriteResult { inserted, updated })
    }

    /// Singleton resources hold at most one entity
    async fn check_singleton(&self, incoming: usize) -> QueryResult<()> {
        if !self.descriptor.singleton || incoming == 0 {
            return Ok(());
        }
        let existing = if self.bindings.selector.is_some() {
            self.run_select(Verb::Post, Vec::new(), None, Some(1))
                .await?
                .len()
        } else {
            0
        };
        if existing + incoming > 1 {
            return Err(self.invalid_body("singleton resource holds at most one entity"));
        }
        Ok(())
    }

    /// Merge-patch the single matching entity, or every match with
    /// `unsafe=true`
    pub async fn patch(&self, conditions: &str, meta: &str, body: &serde_json::Value) -> QueryResult<Vec<T>> {
        self.ensure_allowed(Verb::Patch)?;
        let (conditions, meta) = self.parse(conditions, meta)?;
        self.check_body(body)?;

        let targets = self.select_targets(Verb::Patch, conditions, &meta).await?;
        let updates = self.patched(&targets, body)?;
        self.dispatch_update(Verb::Patch, updates).await
    }

    /// Like [`Executor::patch`], but inserts the body when nothing matches
    pub async fn put(&self, conditions: &str, meta: &str, body: &serde_json::Value) -> QueryResult<WriteResult<T>> {
        self.ensure_allowed(Verb::Put)?;
        let (conditions, meta) = self.parse(conditions, meta)?;
        self.check_body(body)?;

        let targets = self.select_targets(Verb::Put, conditions, &meta).await?;
        if targets.is_empty() {
            let mut document = body.clone();
            if let Some(members) = document.as_object_mut() {
                members
                    .entry(T::id_field().to_string())
                    .or_insert_with(|| serde_json::Value::String(Uuid::new_v4().to_string()));
            }
            let entity = self.entity(document)?;
            self.check_singleton(1).await?;
            let inserted = self.dispatch_insert(Verb::Put, vec![entity]).await?;
            return Ok(WriteResult {
                inserted,
                ..Default::default()
            });
        }

        let updates = self.patched(&targets, body)?;
        let updated = self.dispatch_update(Verb::Put, updates).await?;
        Ok(WriteResult {
            updated,
            ..Default::default()
        })
    }

    /// Delete the single matching entity, or every match with `unsafe=true`
    pub async fn delete(&self, conditions: &str, meta: &str) -> QueryResult<usize> {
        self.ensure_allowed(Verb::Delete)?;
        let (conditions, meta) = self.parse(conditions, meta)?;

        let targets = self.select_targets(Verb::Delete, conditions, &meta).await?;
        if targets.is_empty() {
            return Ok(0);
        }
        let deleter = self
            .bindings
            .deleter
            .as_ref()
            .ok_or_else(|| self.missing(Verb::Delete, Operation::Delete))?;
        let entities = targets.into_iter().map(|s| s.entity).collect();
        deleter.delete(entities).await.map_err(|source| {
            tracing::warn!(resource = %self.descriptor.name, error = %source, "deleter failed");
            QueryError::AbortedDeleter {
                resource: self.descriptor.name.clone(),
                source,
            }
        })
    }

    fn documents(&self, entities: &[T]) -> QueryResult<Vec<serde_json::Value>> {
        entities.iter().map(|e| self.document(e)).collect()
    }

    fn written(&self, result: WriteResult<T>) -> QueryResult<Outcome> {
        Ok(Outcome::Written {
            inserted: self.documents(&result.inserted)?,
            updated: self.documents(&result.updated)?,
        })
    }
}

#[async_trait]
impl<T: Resource> ErasedExecutor for Executor<T> {
    fn descriptor(&self) -> &ResourceDescriptor {
        &self.descriptor
    }

    async fn handle(&self, request: &Request) -> QueryResult<Outcome> {
        let body = || {
            request
                .body
                .as_ref()
                .ok_or_else(|| self.invalid_body("a body is required"))
        };

        match request.verb {
            Verb::Get => Ok(Outcome::Selected(
                self.get(&request.conditions, &request.meta_conditions).await?,
            )),
            Verb::Post => {
                let documents = match body()? {
                    serde_json::Value::Array(items) => items.clone(),
                    other => vec![other.clone()],
                };
                let mut entities = Vec::with_capacity(documents.len());
                for mut document in documents {
                    if let Some(members) = document.as_object_mut() {
                        members
                            .entry(T::id_field().to_string())
                            .or_insert_with(|| serde_json::Value::String(Uuid::new_v4().to_string()));
                    }
                    entities.push(self.entity(document)?);
                }
                let result = self.insert(entities, &request.meta_conditions).await?;
                self.written(result)
            }
            Verb::Patch => {
                let updated = self
                    .patch(&request.conditions, &request.meta_conditions, body()?)
                    .await?;
                self.written(WriteResult {
                    updated,
                    ..Default::default()
                })
            }
            Verb::Put => {
                let result = self
                    .put(&request.conditions, &request.meta_conditions, body()?)
                    .await?;
                self.written(result)
            }
            Verb::Delete => Ok(Outcome::Deleted(
                self.delete(&request.conditions, &request.meta_conditions).await?,
            )),
        }
    }
}
