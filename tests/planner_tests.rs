//! Integration tests for condition parsing and pushdown planning.
//!
//! The central property: for every store kind, running the pushdown set in
//! the store and the post-filter in memory selects exactly what the whole
//! condition list selects in memory.

mod query_harness;

use query_harness::*;
use this_conditions::prelude::*;
use this_conditions::query::Predicate;

fn parse(text: &str) -> QueryResult<Vec<Condition>> {
    parse_conditions(text, &Person::descriptor(), &TermCache::new())
}

const QUERIES: [&str; 9] = [
    "",
    "age=19",
    "age!=19",
    "age=19&active=true",
    "name=Ann&age>30",
    "address.city=Lund&active=false",
    "age>=19&age<=34",
    "name!=Bob&name!=Cid",
    "created<2025-01-01&age=52",
];

fn expected(conditions: &[Condition]) -> Vec<String> {
    let predicate = Predicate::new(conditions.to_vec());
    people()
        .into_iter()
        .filter(|p| predicate.matches(&p.to_document().unwrap()))
        .map(|p| p.name)
        .collect()
}

#[test]
fn test_hash_kv_pushdown_is_exact() {
    let seed = people();
    let store = HashKvStore::with_entities(seed).unwrap();

    for text in QUERIES {
        let conditions = parse(text).unwrap();
        let want = expected(&conditions);
        let plan = QueryPlan::new(conditions, StoreKind::HashKv);

        let mut got: Vec<String> = store
            .select(plan.pushdown(), None)
            .unwrap()
            .into_iter()
            .filter(|p| plan.post_filter().matches(&p.to_document().unwrap()))
            .map(|p| p.name)
            .collect();
        let mut want = want;
        got.sort();
        want.sort();
        assert_eq!(got, want, "conditions {:?}", text);
    }
}

#[test]
fn test_in_memory_pushdown_is_exact() {
    let store = InMemoryStore::with_entities(people());
    for text in QUERIES {
        let conditions = parse(text).unwrap();
        let want = expected(&conditions);
        let plan = QueryPlan::new(conditions, StoreKind::InMemory);
        assert!(plan.is_full_scan());

        let got: Vec<String> = store
            .select(plan.pushdown(), None)
            .unwrap()
            .into_iter()
            .filter(|p| plan.post_filter().matches(&p.to_document().unwrap()))
            .map(|p| p.name)
            .collect();
        assert_eq!(got, want, "conditions {:?}", text);
    }
}

#[test]
fn test_sql_split_keeps_every_condition() {
    for text in QUERIES {
        let conditions = parse(text).unwrap();
        let plan = QueryPlan::new(conditions.clone(), StoreKind::Sql);
        assert_eq!(
            plan.pushdown().len() + plan.post_filter().conditions().len(),
            conditions.len()
        );
        assert!(plan.is_exact(), "conditions {:?}", text);
    }

    let plan = QueryPlan::new(parse("age<null&created=2024-01-01").unwrap(), StoreKind::Sql);
    assert_eq!(plan.pushdown().len(), 1);
    assert_eq!(plan.post_filter().conditions()[0].key(), "age");
}

#[test]
fn test_hash_index_tracks_writes() {
    let store = HashKvStore::with_entities(people()).unwrap();
    let lookup = parse("age=19").unwrap();
    assert_eq!(store.select(&lookup, None).unwrap().len(), 2);

    let mut bob = store.select(&parse("name=Bob").unwrap(), None).unwrap().remove(0);
    bob.age = 20;
    store.update(vec![bob.clone()]).unwrap();
    assert_eq!(store.select(&lookup, None).unwrap().len(), 1);
    assert_eq!(store.select(&parse("age=20").unwrap(), None).unwrap().len(), 1);

    store.delete(&[bob]).unwrap();
    assert!(store.select(&parse("age=20").unwrap(), None).unwrap().is_empty());
    assert_eq!(store.len().unwrap(), 3);
}

// ---------------------------------------------------------------------------
// Parsing at the request boundary
// ---------------------------------------------------------------------------

#[test]
fn test_syntax_errors() {
    for text in ["age", "=3", "age=>3", "age==3", "age=3&&name=Ann", "age<3<4"] {
        assert!(
            matches!(parse(text), Err(QueryError::Syntax { .. })),
            "{:?} should be rejected",
            text
        );
    }
}

#[test]
fn test_unknown_and_ambiguous_columns() {
    assert!(matches!(parse("height=3"), Err(QueryError::UnknownColumn { .. })));
    assert!(matches!(parse("age.years=3"), Err(QueryError::UnknownColumn { .. })));

    let descriptor = ResourceDescriptor::new("Tag")
        .property(PropertyDescriptor::new("Label", PropertyType::String))
        .property(PropertyDescriptor::new("label", PropertyType::String));
    let err = parse_conditions("LABEL=x", &descriptor, &TermCache::new()).unwrap_err();
    match err {
        QueryError::AmbiguousColumn { candidates, .. } => {
            assert_eq!(candidates, vec!["Label".to_string(), "label".to_string()])
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn test_percent_encoded_values() {
    let conditions = parse("name=Ann%20Marie&address.city=K%C3%B8ge").unwrap();
    assert_eq!(conditions[0].value(), &Value::from("Ann Marie"));
    assert_eq!(conditions[1].value(), &Value::from("Køge"));
    assert_eq!(conditions[1].key(), "address.city");

    let conditions = parse("name=a%3Db").unwrap();
    assert_eq!(conditions[0].value(), &Value::from("a=b"));
}

#[test]
fn test_terms_are_cached_case_insensitively() {
    let cache = TermCache::new();
    let descriptor = Person::descriptor();
    parse_conditions("AGE=3&age=4&Age>1", &descriptor, &cache).unwrap();
    assert_eq!(cache.len(), 1);
}
