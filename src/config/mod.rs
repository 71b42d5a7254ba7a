//! Configuration loading and management
//!
//! A YAML document with global `settings` and per-resource `resources`
//! overrides applied to descriptors when the registry is built:
//!
//! ```yaml
//! settings:
//!   log_filter: debug
//!   default_limit: 100
//!   ambiguity_probe: 2
//! resources:
//!   - name: Person
//!     verbs: [GET, PATCH]
//!     dynamic_conditions: true
//!     properties:
//!       - name: Age
//!         allowed_operators: [EQUALS]
//!         read_only: true
//! ```

use crate::core::error::ConfigError;
use crate::core::{Operator, OperatorSet, ResourceDescriptor, Verb};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Smallest cap the ambiguity guard can probe with and still tell one match
/// from many
pub const MIN_AMBIGUITY_PROBE: usize = 2;

/// Global settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// `tracing-subscriber` filter directive, used when `RUST_LOG` is unset
    pub log_filter: String,

    /// Limit applied to selections whose request sets none
    pub default_limit: Option<usize>,

    /// Result cap of the ambiguity guard's probe select
    pub ambiguity_probe: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_filter: "info".to_string(),
            default_limit: None,
            ambiguity_probe: MIN_AMBIGUITY_PROBE,
        }
    }
}

/// Override for a declared property
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyConfig {
    pub name: String,

    #[serde(default)]
    pub allowed_operators: Option<Vec<Operator>>,

    #[serde(default)]
    pub read_only: Option<bool>,
}

/// Override for a registered resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceConfig {
    pub name: String,

    #[serde(default)]
    pub verbs: Option<Vec<Verb>>,

    #[serde(default)]
    pub dynamic_conditions: Option<bool>,

    #[serde(default)]
    pub singleton: Option<bool>,

    #[serde(default)]
    pub properties: Vec<PropertyConfig>,
}

impl ResourceConfig {
    /// Apply this override to a descriptor
    pub fn apply(&self, descriptor: &mut ResourceDescriptor) -> Result<(), ConfigError> {
        if let Some(verbs) = &self.verbs {
            descriptor.verbs = verbs.clone();
        }
        if let Some(dynamic) = self.dynamic_conditions {
            descriptor.dynamic_conditions = dynamic;
        }
        if let Some(singleton) = self.singleton {
            descriptor.singleton = singleton;
        }

        let resource = descriptor.name.clone();
        for property_config in &self.properties {
            let property = descriptor
                .property_mut(&property_config.name)
                .ok_or_else(|| ConfigError::UnknownProperty {
                    resource: resource.clone(),
                    property: property_config.name.clone(),
                })?;
            if let Some(operators) = &property_config.allowed_operators {
                property.allowed_operators = operators.iter().copied().collect::<OperatorSet>();
            }
            if let Some(read_only) = property_config.read_only {
                property.read_only = read_only;
            }
        }
        Ok(())
    }
}

/// Complete configuration of the query core
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreConfig {
    #[serde(default)]
    pub settings: Settings,

    #[serde(default)]
    pub resources: Vec<ResourceConfig>,
}

impl CoreConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
            path: path.display().to_string(),
        })?;
        let config: Self =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
                file: Some(path.display().to_string()),
                message: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError {
            file: None,
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.settings.ambiguity_probe < MIN_AMBIGUITY_PROBE {
            return Err(ConfigError::InvalidValue {
                field: "settings.ambiguity_probe".to_string(),
                value: self.settings.ambiguity_probe.to_string(),
                message: format!("must be at least {}", MIN_AMBIGUITY_PROBE),
            });
        }

        let mut seen = HashSet::new();
        for resource in &self.resources {
            if !seen.insert(resource.name.to_ascii_lowercase()) {
                return Err(ConfigError::DuplicateResource {
                    resource: resource.name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Find the override for a resource, by case-insensitive name
    pub fn resource(&self, name: &str) -> Option<&ResourceConfig> {
        self.resources
            .iter()
            .find(|r| r.name.eq_ignore_ascii_case(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{PropertyDescriptor, PropertyType};

    const YAML: &str = r#"
settings:
  default_limit: 50
resources:
  - name: person
    verbs: [GET, DELETE]
    dynamic_conditions: true
    properties:
      - name: age
        allowed_operators: [EQUALS, "!="]
        read_only: true
"#;

    fn person() -> ResourceDescriptor {
        ResourceDescriptor::new("Person")
            .property(PropertyDescriptor::new("Age", PropertyType::Integer))
    }

    #[test]
    fn test_parse_and_defaults() {
        let config = CoreConfig::from_yaml_str(YAML).unwrap();
        assert_eq!(config.settings.default_limit, Some(50));
        assert_eq!(config.settings.ambiguity_probe, 2);
        assert_eq!(config.settings.log_filter, "info");
        assert!(config.resource("PERSON").is_some());
    }

    #[test]
    fn test_apply_overrides() {
        let config = CoreConfig::from_yaml_str(YAML).unwrap();
        let mut descriptor = person();
        config.resource("Person").unwrap().apply(&mut descriptor).unwrap();
        assert_eq!(descriptor.verbs, vec![Verb::Get, Verb::Delete]);
        assert!(descriptor.dynamic_conditions);
        let age = &descriptor.properties[0];
        assert!(age.read_only);
        assert!(age.allowed_operators.contains(Operator::NotEquals));
        assert!(!age.allowed_operators.contains(Operator::LessThan));
    }

    #[test]
    fn test_unknown_property_fails() {
        let config = CoreConfig::from_yaml_str(
            "resources:\n  - name: Person\n    properties:\n      - name: Height\n",
        )
        .unwrap();
        let err = config.resources[0].apply(&mut person()).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownProperty { .. }));
    }

    #[test]
    fn test_invalid_documents() {
        let err = CoreConfig::from_yaml_str("settings:\n  ambiguity_probe: 1\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));

        let err =
            CoreConfig::from_yaml_str("resources:\n  - name: A\n  - name: a\n").unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateResource { .. }));

        let err = CoreConfig::from_yaml_str("resources:\n  - name: A\n    verbs: [TRACE]\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { file: None, .. }));
    }

    #[test]
    fn test_missing_file() {
        let err = CoreConfig::from_yaml_file("/nonexistent/conditions.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
    }
}
