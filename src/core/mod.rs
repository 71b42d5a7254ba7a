//! Core module containing fundamental types for conditions and resources

pub mod descriptor;
pub mod error;
pub mod operator;
pub mod resource;
pub mod value;

pub use descriptor::{
    Operation, PropertyDescriptor, PropertyType, ResourceDescriptor, StoreKind, Verb,
};
pub use error::{ConfigError, QueryError, QueryResult};
pub use operator::{Operator, OperatorSet};
pub use resource::Resource;
pub use value::Value;
