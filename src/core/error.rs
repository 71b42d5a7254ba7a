//! Typed error handling for condition resolution and operation dispatch
//!
//! Every failure raised while parsing a request, resolving terms or
//! dispatching to a resource handler is a [`QueryError`]. Parsing and term
//! resolution errors are produced before any store access, so a malformed
//! request never causes partial side effects.
//!
//! # Error Categories
//!
//! - Grammar: [`QueryError::Syntax`], [`QueryError::ForbiddenOperator`]
//! - Term resolution: [`QueryError::UnknownColumn`], [`QueryError::AmbiguousColumn`]
//! - Cardinality: [`QueryError::AmbiguousMatch`]
//! - Dispatch: [`QueryError::AbortedSelector`] and its siblings, which wrap
//!   the error thrown by the resolved handler
//! - Registration: [`ConfigError`]
//!
//! # Example
//!
//! ```rust,ignore
//! match executor.delete("Name=Foo", "").await {
//!     Ok(count) => println!("deleted {}", count),
//!     Err(QueryError::AmbiguousMatch { resource, .. }) => {
//!         println!("more than one {} matched, add unsafe=true", resource);
//!     }
//!     Err(e) => eprintln!("{} ({})", e, e.error_code()),
//! }
//! ```

use crate::core::descriptor::Verb;
use crate::core::operator::Operator;
use thiserror::Error;

/// The main error type for condition parsing and dispatch
#[derive(Debug, Error)]
pub enum QueryError {
    /// Malformed segment, unknown meta-condition, wrong value type or
    /// missing operator
    #[error("Syntax error: {message}")]
    Syntax { message: String },

    /// The operator is not permitted on the targeted property
    #[error("Operator '{operator}' is not allowed on '{resource}.{property}'")]
    ForbiddenOperator {
        resource: String,
        property: String,
        operator: Operator,
    },

    /// No member of the resource matches the key
    #[error("Unknown column '{key}' in resource '{resource}'")]
    UnknownColumn { resource: String, key: String },

    /// More than one member matches the key case-insensitively
    #[error("Ambiguous column '{key}' in resource '{resource}', candidates: {}", .candidates.join(", "))]
    AmbiguousColumn {
        resource: String,
        key: String,
        candidates: Vec<String>,
    },

    /// A single-target mutation matched more than one entity
    #[error(
        "{verb} on '{resource}' matched more than one entity; add unsafe=true to apply it to all of them"
    )]
    AmbiguousMatch { resource: String, verb: Verb },

    /// The resolved selector failed
    #[error("Aborted selector for '{resource}': {source}")]
    AbortedSelector {
        resource: String,
        #[source]
        source: anyhow::Error,
    },

    /// The resolved inserter failed
    #[error("Aborted inserter for '{resource}': {source}")]
    AbortedInserter {
        resource: String,
        #[source]
        source: anyhow::Error,
    },

    /// The resolved updater failed
    #[error("Aborted updater for '{resource}': {source}")]
    AbortedUpdater {
        resource: String,
        #[source]
        source: anyhow::Error,
    },

    /// The resolved deleter failed
    #[error("Aborted deleter for '{resource}': {source}")]
    AbortedDeleter {
        resource: String,
        #[source]
        source: anyhow::Error,
    },

    /// A request body tried to write a read-only property
    #[error("Property '{resource}.{property}' is read-only")]
    ReadOnlyProperty { resource: String, property: String },

    /// A request body could not be converted to the resource type
    #[error("Invalid body for '{resource}': {message}")]
    InvalidBody { resource: String, message: String },

    /// The verb is not listed among the resource's available verbs
    #[error("{verb} is not allowed on '{resource}'")]
    MethodNotAllowed { resource: String, verb: Verb },

    /// No resource is registered under this name
    #[error("Unknown resource: {name}")]
    UnknownResource { name: String },

    /// Registration or configuration failure
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl QueryError {
    /// Shorthand for a [`QueryError::Syntax`] error
    pub fn syntax(message: impl Into<String>) -> Self {
        QueryError::Syntax {
            message: message.into(),
        }
    }

    /// Get the error code for programmatic handling
    pub fn error_code(&self) -> &'static str {
        match self {
            QueryError::Syntax { .. } => "SYNTAX_ERROR",
            QueryError::ForbiddenOperator { .. } => "FORBIDDEN_OPERATOR",
            QueryError::UnknownColumn { .. } => "UNKNOWN_COLUMN",
            QueryError::AmbiguousColumn { .. } => "AMBIGUOUS_COLUMN",
            QueryError::AmbiguousMatch { .. } => "AMBIGUOUS_MATCH",
            QueryError::AbortedSelector { .. } => "ABORTED_SELECTOR",
            QueryError::AbortedInserter { .. } => "ABORTED_INSERTER",
            QueryError::AbortedUpdater { .. } => "ABORTED_UPDATER",
            QueryError::AbortedDeleter { .. } => "ABORTED_DELETER",
            QueryError::ReadOnlyProperty { .. } => "READ_ONLY_PROPERTY",
            QueryError::InvalidBody { .. } => "INVALID_BODY",
            QueryError::MethodNotAllowed { .. } => "METHOD_NOT_ALLOWED",
            QueryError::UnknownResource { .. } => "UNKNOWN_RESOURCE",
            QueryError::Config(_) => "CONFIG_ERROR",
        }
    }

    /// Whether the error was raised by request setup (parsing or term
    /// resolution) rather than by a store or handler
    pub fn is_request_error(&self) -> bool {
        matches!(
            self,
            QueryError::Syntax { .. }
                | QueryError::ForbiddenOperator { .. }
                | QueryError::UnknownColumn { .. }
                | QueryError::AmbiguousColumn { .. }
                | QueryError::ReadOnlyProperty { .. }
                | QueryError::InvalidBody { .. }
        )
    }
}

// =============================================================================
// Configuration Errors
// =============================================================================

/// Errors raised while loading configuration or registering resources
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to parse the configuration document
    #[error("Failed to parse config{}: {message}", .file.as_ref().map(|f| format!(" file '{}'", f)).unwrap_or_default())]
    ParseError {
        file: Option<String>,
        message: String,
    },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    /// An override names a resource that was never registered
    #[error("Configuration refers to unknown resource '{resource}'")]
    UnknownResource { resource: String },

    /// An override names a property the resource does not declare
    #[error("Configuration refers to unknown property '{resource}.{property}'")]
    UnknownProperty { resource: String, property: String },

    /// Invalid value in configuration
    #[error("Invalid value '{value}' for '{field}': {message}")]
    InvalidValue {
        field: String,
        value: String,
        message: String,
    },

    /// The same resource name was registered twice
    #[error("Resource '{resource}' is already registered")]
    DuplicateResource { resource: String },

    /// A declared verb has no handler for one of its operations
    #[error("Resource '{resource}' declares {verb} but has no {operation} implementation")]
    MissingOperation {
        resource: String,
        verb: Verb,
        operation: &'static str,
    },
}

// =============================================================================
// Result type alias
// =============================================================================

/// A specialized Result type for query operations
pub type QueryResult<T, E = QueryError> = Result<T, E>;

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_syntax_error_display() {
        let err = QueryError::syntax("empty segment");
        assert_eq!(err.to_string(), "Syntax error: empty segment");
        assert_eq!(err.error_code(), "SYNTAX_ERROR");
        assert!(err.is_request_error());
    }

    #[test]
    fn test_forbidden_operator_display() {
        let err = QueryError::ForbiddenOperator {
            resource: "Person".to_string(),
            property: "Age".to_string(),
            operator: Operator::GreaterThan,
        };
        assert!(err.to_string().contains("'>'"));
        assert!(err.to_string().contains("Person.Age"));
    }

    #[test]
    fn test_ambiguous_column_lists_candidates() {
        let err = QueryError::AmbiguousColumn {
            resource: "Person".to_string(),
            key: "name".to_string(),
            candidates: vec!["Name".to_string(), "NAME".to_string()],
        };
        assert!(err.to_string().contains("Name, NAME"));
    }

    #[test]
    fn test_aborted_keeps_source() {
        let err = QueryError::AbortedDeleter {
            resource: "Person".to_string(),
            source: anyhow::anyhow!("disk full"),
        };
        assert!(err.to_string().contains("disk full"));
        let source = std::error::Error::source(&err).expect("source should be kept");
        assert_eq!(source.to_string(), "disk full");
        assert!(!err.is_request_error());
    }

    #[test]
    fn test_config_error_conversion() {
        let err: QueryError = ConfigError::FileNotFound {
            path: "/etc/conditions.yaml".to_string(),
        }
        .into();
        assert_eq!(err.error_code(), "CONFIG_ERROR");
        assert!(err.to_string().contains("/etc/conditions.yaml"));
    }

    #[test]
    fn test_parse_error_with_and_without_file() {
        let with_file = ConfigError::ParseError {
            file: Some("a.yaml".to_string()),
            message: "bad indent".to_string(),
        };
        assert_eq!(
            with_file.to_string(),
            "Failed to parse config file 'a.yaml': bad indent"
        );
        let without = ConfigError::ParseError {
            file: None,
            message: "bad indent".to_string(),
        };
        assert_eq!(without.to_string(), "Failed to parse config: bad indent");
    }
}
