//! Integration tests for YAML configuration applied at registry build time.

mod query_harness;

use query_harness::*;
use serde_json::json;
use std::io::Write;
use tempfile::NamedTempFile;
use this_conditions::prelude::*;

const CONFIG: &str = r#"
settings:
  log_filter: "this_conditions=debug"
  default_limit: 3
resources:
  - name: person
    verbs: [GET, PATCH]
    properties:
      - name: AGE
        read_only: true
      - name: name
        allowed_operators: [EQUALS]
"#;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

fn configured_registry() -> ResourceRegistry {
    let file = write_config(CONFIG);
    let config = CoreConfig::from_yaml_file(file.path()).unwrap();
    ResourceRegistry::builder()
        .with_config(config)
        .register(Registration::<Person>::new().with_store(InMemoryStore::with_entities(people())))
        .build()
        .unwrap()
}

#[test]
fn test_load_from_file() {
    let file = write_config(CONFIG);
    let config = CoreConfig::from_yaml_file(file.path()).unwrap();
    assert_eq!(config.settings.log_filter, "this_conditions=debug");
    assert_eq!(config.settings.default_limit, Some(3));
    assert_eq!(config.resources.len(), 1);
}

#[test]
fn test_parse_error_names_the_file() {
    let file = write_config("settings: [not, a, map]\n");
    match CoreConfig::from_yaml_file(file.path()).unwrap_err() {
        ConfigError::ParseError { file: Some(path), .. } => {
            assert_eq!(path, file.path().display().to_string())
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_overrides_reach_the_executor() {
    let registry = configured_registry();
    let descriptor = registry.descriptor("Person").unwrap();
    assert_eq!(descriptor.verbs, vec![Verb::Get, Verb::Patch]);
    assert_eq!(registry.settings().default_limit, Some(3));

    let executor = executor(&registry);
    assert_eq!(executor.select("", "").await.unwrap().len(), 3);

    let err = executor.select("name!=Ann", "").await.unwrap_err();
    assert!(matches!(err, QueryError::ForbiddenOperator { operator: Operator::NotEquals, .. }));

    let err = executor.patch("name=Ann", "", &json!({"age": 1})).await.unwrap_err();
    assert!(matches!(err, QueryError::ReadOnlyProperty { .. }));

    let err = executor.delete("name=Ann", "").await.unwrap_err();
    assert!(matches!(err, QueryError::MethodNotAllowed { verb: Verb::Delete, .. }));
}

#[test]
fn test_override_for_unregistered_resource() {
    let config = CoreConfig::from_yaml_str("resources:\n  - name: Planet\n").unwrap();
    let result = ResourceRegistry::builder()
        .with_config(config)
        .register(Registration::<Person>::new().with_store(InMemoryStore::new()))
        .build();
    assert!(matches!(result, Err(ConfigError::UnknownResource { .. })));
}

#[test]
fn test_override_cannot_enable_unbound_verbs() {
    let config =
        CoreConfig::from_yaml_str("resources:\n  - name: Person\n    verbs: [GET, DELETE]\n")
            .unwrap();
    let result = ResourceRegistry::builder()
        .with_config(config)
        .register(
            Registration::<Person>::new()
                .selector(RecordingSelector::new(people()))
                .verbs(&[Verb::Get]),
        )
        .build();
    assert!(matches!(
        result,
        Err(ConfigError::MissingOperation { verb: Verb::Delete, .. })
    ));
}
