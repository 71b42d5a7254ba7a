//! Shared test harness for dispatch and planning tests
//!
//! Provides `Person` (declared scalars, a nested object and a read-only
//! timestamp), `Profile` (a singleton) and recording handlers used to tell
//! which binding served a request.
//!
//! # Usage
//!
//! From any integration test file in `tests/`:
//! ```rust,ignore
//! mod query_harness;
//! use query_harness::*;
//! ```

#![allow(dead_code)]

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use uuid::Uuid;

use this_conditions::prelude::*;

// ---------------------------------------------------------------------------
// Person
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub city: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub id: Uuid,
    pub name: String,
    pub age: i64,
    pub active: bool,
    pub address: Address,
    pub created: DateTime<Utc>,
}

impl Resource for Person {
    fn descriptor() -> ResourceDescriptor {
        ResourceDescriptor::new("Person")
            .property(PropertyDescriptor::new("name", PropertyType::String))
            .property(PropertyDescriptor::new("age", PropertyType::Integer))
            .property(PropertyDescriptor::new("active", PropertyType::Boolean))
            .property(PropertyDescriptor::new(
                "address",
                PropertyType::Object(vec![PropertyDescriptor::new("city", PropertyType::String)]),
            ))
            .property(PropertyDescriptor::new("created", PropertyType::DateTime).read_only())
    }

    fn id(&self) -> Uuid {
        self.id
    }
}

/// Build a person created on 2024-01-01
pub fn person(name: &str, age: i64, city: &str, active: bool) -> Person {
    Person {
        id: Uuid::new_v4(),
        name: name.to_string(),
        age,
        active,
        address: Address {
            city: city.to_string(),
        },
        created: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
    }
}

/// Ann (34, Lund), Bob (19, Oslo), Cid (19, Lund, inactive), Dee (52, Oslo)
pub fn people() -> Vec<Person> {
    vec![
        person("Ann", 34, "Lund", true),
        person("Bob", 19, "Oslo", true),
        person("Cid", 19, "Lund", false),
        person("Dee", 52, "Oslo", true),
    ]
}

/// Full JSON body of a new person
pub fn person_body(name: &str, age: i64) -> serde_json::Value {
    serde_json::json!({
        "name": name,
        "age": age,
        "active": true,
        "address": { "city": "Bergen" },
        "created": "2024-06-01T00:00:00Z",
    })
}

pub fn names(people: &[Person]) -> Vec<&str> {
    people.iter().map(|p| p.name.as_str()).collect()
}

/// Registry holding `Person` behind `store`
pub fn person_registry(store: impl Into<StoreDriver<Person>>) -> ResourceRegistry {
    ResourceRegistry::builder()
        .register(Registration::<Person>::new().with_store(store))
        .build()
        .unwrap()
}

pub fn executor(registry: &ResourceRegistry) -> Arc<Executor<Person>> {
    registry.executor::<Person>().unwrap()
}

// ---------------------------------------------------------------------------
// Profile (singleton)
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub theme: String,
}

impl Resource for Profile {
    fn descriptor() -> ResourceDescriptor {
        ResourceDescriptor::new("Profile")
            .property(PropertyDescriptor::new("theme", PropertyType::String))
            .singleton()
    }

    fn id(&self) -> Uuid {
        self.id
    }
}

// ---------------------------------------------------------------------------
// Recording handlers
// ---------------------------------------------------------------------------

/// Selector answering from a fixed list, counting its calls
#[derive(Clone, Default)]
pub struct RecordingSelector {
    pub entities: Vec<Person>,
    pub calls: Arc<AtomicUsize>,
}

impl RecordingSelector {
    pub fn new(entities: Vec<Person>) -> Self {
        Self {
            entities,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Selector<Person> for RecordingSelector {
    async fn select(&self, conditions: &[Condition], cap: Option<usize>) -> Result<Vec<Person>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let predicate = this_conditions::query::Predicate::new(conditions.to_vec());
        let mut found = Vec::new();
        for person in &self.entities {
            if predicate.matches(&person.to_document()?) {
                found.push(person.clone());
            }
        }
        found.truncate(cap.unwrap_or(usize::MAX));
        Ok(found)
    }
}

/// Raw selector returning every document it holds
pub struct RawListSelector {
    pub documents: Vec<serde_json::Value>,
}

#[async_trait]
impl RawSelector for RawListSelector {
    async fn select(&self, _conditions: &[Condition], _cap: Option<usize>) -> Result<Vec<serde_json::Value>> {
        Ok(self.documents.clone())
    }
}

/// Selector that always fails
pub struct FailingSelector;

#[async_trait]
impl Selector<Person> for FailingSelector {
    async fn select(&self, _conditions: &[Condition], _cap: Option<usize>) -> Result<Vec<Person>> {
        Err(anyhow!("connection reset"))
    }
}
