//! Integration tests for the PostgreSQL SQL backend.
//!
//! Checks that conditions pushed down as JSONB `WHERE` clauses select the
//! same entities as the in-memory evaluator, and that writes go through.
//!
//! # Requirements
//!
//! - Docker must be running (testcontainers launches a PostgreSQL container)
//! - Feature flag `postgres` must be enabled
//!
//! # Running
//!
//! ```sh
//! cargo test --features postgres --test postgres_tests -- --test-threads=1
//! ```
//!
//! # Test isolation
//!
//! All tests share a single PostgreSQL container (via `OnceLock`). Each test
//! creates a fresh `PgPool` and recreates the `Person` table.

#![cfg(feature = "postgres")]

mod query_harness;

use query_harness::*;
use serde_json::json;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::sync::{Arc, OnceLock};
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::postgres::Postgres;
use this_conditions::prelude::*;

// ---------------------------------------------------------------------------
// Shared test environment (single container, fresh pool per test)
// ---------------------------------------------------------------------------

/// Keeps the container alive for the whole test binary
struct PgTestEnv {
    _container: testcontainers::ContainerAsync<Postgres>,
    connection_url: String,
}

/// Stored in a std `OnceLock` so it outlives each `#[tokio::test]` runtime
static TEST_ENV: OnceLock<PgTestEnv> = OnceLock::new();

async fn init_pg_env() -> &'static PgTestEnv {
    if let Some(env) = TEST_ENV.get() {
        return env;
    }

    let container = Postgres::default()
        .start()
        .await
        .expect("Failed to start PostgreSQL container, is Docker running?");

    let host = container.get_host().await.unwrap();
    let port = container.get_host_port_ipv4(5432).await.unwrap();
    let url = format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

    let _ = TEST_ENV.set(PgTestEnv {
        _container: container,
        connection_url: url,
    });
    TEST_ENV.get().unwrap()
}

/// A new pool bound to the current tokio runtime
async fn pg_pool() -> PgPool {
    let env = init_pg_env().await;
    PgPoolOptions::new()
        .max_connections(2)
        .acquire_timeout(std::time::Duration::from_secs(30))
        .connect(&env.connection_url)
        .await
        .expect("Failed to connect to PostgreSQL")
}

/// A `Person` store over a freshly created table holding `people()`
async fn clean_person_store() -> SqlStore<Person> {
    let pool = pg_pool().await;
    sqlx::query("DROP TABLE IF EXISTS \"Person\"")
        .execute(&pool)
        .await
        .expect("Failed to drop Person table");

    let store: SqlStore<Person> = SqlStore::new(Arc::new(PgBackend::new(pool)));
    store.ensure_table().await.expect("Failed to create Person table");
    store.insert(people()).await.expect("Failed to seed Person table");
    store
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_pushdown_matches_in_memory() {
    let sql = person_registry(clean_person_store().await);
    let in_memory = person_registry(InMemoryStore::with_entities(people()));

    for conditions in [
        "",
        "age=19",
        "age!=19",
        "name=Ann&age>30",
        "active=false",
        "address.city=Lund&age<=34",
        "created<2025-01-01",
        "created>2025-01-01",
        "name=null",
        "name!=null",
        "age<null",
    ] {
        let a = executor(&sql).select(conditions, "order_asc=name").await.unwrap();
        let b = executor(&in_memory).select(conditions, "order_asc=name").await.unwrap();
        assert_eq!(names(&a), names(&b), "conditions {:?}", conditions);
    }
}

#[tokio::test]
async fn test_capped_select_stops_early() {
    let store = clean_person_store().await;
    let conditions = parse_conditions("age>=19", &Person::descriptor(), &TermCache::new()).unwrap();
    assert_eq!(store.select(&conditions, Some(2)).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_writes_round_trip() {
    let store = clean_person_store().await;
    let registry = person_registry(store.clone());
    let executor = executor(&registry);

    let patched = executor
        .patch("name=Ann", "", &json!({"age": 35}))
        .await
        .unwrap();
    assert_eq!(patched[0].age, 35);
    assert_eq!(names(&executor.select("age=35", "").await.unwrap()), vec!["Ann"]);

    let err = executor.delete("age=19", "").await.unwrap_err();
    assert!(matches!(err, QueryError::AmbiguousMatch { .. }));
    assert_eq!(executor.delete("age=19", "unsafe=true").await.unwrap(), 2);
    assert_eq!(executor.select("", "").await.unwrap().len(), 2);
}
