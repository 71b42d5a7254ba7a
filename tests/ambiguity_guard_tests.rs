//! Integration tests for single-target mutations and the `unsafe` override.

mod query_harness;

use query_harness::*;
use serde_json::json;
use this_conditions::prelude::*;

#[tokio::test]
async fn test_delete_two_matches_is_ambiguous() {
    let store = InMemoryStore::with_entities(people());
    let registry = person_registry(store.clone());

    let err = executor(&registry).delete("age=19", "").await.unwrap_err();
    match err {
        QueryError::AmbiguousMatch { resource, verb } => {
            assert_eq!(resource, "Person");
            assert_eq!(verb, Verb::Delete);
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(store.len().unwrap(), 4);
}

#[tokio::test]
async fn test_unsafe_delete_removes_every_match() {
    let store = InMemoryStore::with_entities(people());
    let registry = person_registry(store.clone());

    let deleted = executor(&registry).delete("age=19", "unsafe=true").await.unwrap();
    assert_eq!(deleted, 2);
    let left = executor(&registry).select("", "order_asc=name").await.unwrap();
    assert_eq!(names(&left), vec!["Ann", "Dee"]);
}

#[tokio::test]
async fn test_unsafe_reselect_honours_window() {
    let store = InMemoryStore::with_entities(people());
    let registry = person_registry(store.clone());

    let deleted = executor(&registry)
        .delete("active=true", "unsafe=true&order_desc=age&limit=2")
        .await
        .unwrap();
    assert_eq!(deleted, 2);
    let left = executor(&registry).select("", "order_asc=name").await.unwrap();
    assert_eq!(names(&left), vec!["Bob", "Cid"]);
}

#[tokio::test]
async fn test_single_and_zero_matches() {
    let store = InMemoryStore::with_entities(people());
    let registry = person_registry(store.clone());
    let executor = executor(&registry);

    assert_eq!(executor.delete("name=Zed", "").await.unwrap(), 0);
    assert_eq!(executor.delete("name=Dee", "").await.unwrap(), 1);
    assert_eq!(store.len().unwrap(), 3);
}

#[tokio::test]
async fn test_patch_and_put_are_guarded() {
    let store = InMemoryStore::with_entities(people());
    let registry = person_registry(store.clone());
    let executor = executor(&registry);

    let err = executor
        .patch("address.city=Oslo", "", &json!({"active": false}))
        .await
        .unwrap_err();
    assert!(matches!(err, QueryError::AmbiguousMatch { verb: Verb::Patch, .. }));

    let err = executor
        .put("address.city=Oslo", "", &json!({"active": false}))
        .await
        .unwrap_err();
    assert!(matches!(err, QueryError::AmbiguousMatch { verb: Verb::Put, .. }));

    let patched = executor
        .patch("address.city=Oslo", "unsafe=true", &json!({"active": false}))
        .await
        .unwrap();
    assert_eq!(patched.len(), 2);
    assert_eq!(executor.select("active=true", "").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_safepost_several_matches() {
    let store = InMemoryStore::with_entities(people());
    let registry = person_registry(store.clone());
    let executor = executor(&registry);

    let incoming = person("Newcomer", 19, "Oslo", true);
    let err = executor
        .insert(vec![incoming.clone()], "safepost=age")
        .await
        .unwrap_err();
    assert!(matches!(err, QueryError::AmbiguousMatch { verb: Verb::Post, .. }));
    assert_eq!(store.len().unwrap(), 4);

    let result = executor
        .insert(vec![incoming], "safepost=age&unsafe=true")
        .await
        .unwrap();
    assert_eq!(result.updated.len(), 2);
    assert!(result.inserted.is_empty());
    assert_eq!(executor.select("name=Newcomer", "").await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_safepost_batch_fails_without_partial_writes() {
    let store = InMemoryStore::with_entities(people());
    let registry = person_registry(store.clone());
    let executor = executor(&registry);

    // age=34 matches Ann alone, age=19 matches Bob and Cid
    let batch = vec![
        person("Changed", 34, "Lund", true),
        person("Other", 19, "Oslo", true),
    ];
    let err = executor.insert(batch, "safepost=age").await.unwrap_err();
    assert!(matches!(err, QueryError::AmbiguousMatch { verb: Verb::Post, .. }));

    assert!(executor.select("name=Changed", "").await.unwrap().is_empty());
    assert!(executor.select("name=Other", "").await.unwrap().is_empty());
    let all = executor.select("", "order_asc=name").await.unwrap();
    assert_eq!(names(&all), vec!["Ann", "Bob", "Cid", "Dee"]);
}

#[tokio::test]
async fn test_safepost_batch_updates_and_inserts() {
    let store = InMemoryStore::with_entities(people());
    let registry = person_registry(store.clone());
    let executor = executor(&registry);

    let batch = vec![
        person("Changed", 34, "Lund", true),
        person("Newcomer", 70, "Bergen", true),
    ];
    let result = executor.insert(batch, "safepost=age").await.unwrap();
    assert_eq!(names(&result.updated), vec!["Changed"]);
    assert_eq!(names(&result.inserted), vec!["Newcomer"]);
    assert_eq!(store.len().unwrap(), 5);
}

#[tokio::test]
async fn test_probe_size_from_settings() {
    let config = CoreConfig::from_yaml_str("settings:\n  ambiguity_probe: 5\n").unwrap();
    let registry = ResourceRegistry::builder()
        .with_config(config)
        .register(Registration::<Person>::new().with_store(InMemoryStore::with_entities(people())))
        .build()
        .unwrap();
    assert_eq!(executor(&registry).guard().probe(), 5);

    let err = executor(&registry).delete("age>0", "").await.unwrap_err();
    assert!(matches!(err, QueryError::AmbiguousMatch { .. }));
}
