//! Resource trait defining the entity types conditions are evaluated against

use crate::core::descriptor::ResourceDescriptor;
use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

/// Base trait for every registered resource type.
///
/// Entities are read through their serialized JSON document, so the names
/// declared in [`Resource::descriptor`] must match the serialized member
/// names. Nested objects are declared with `PropertyType::Object`.
///
/// # Example
///
/// ```rust,ignore
/// #[derive(Clone, Serialize, Deserialize)]
/// pub struct Person {
///     #[serde(rename = "Id")]
///     id: Uuid,
///     #[serde(rename = "Name")]
///     name: String,
/// }
///
/// impl Resource for Person {
///     fn descriptor() -> ResourceDescriptor {
///         ResourceDescriptor::new("Person")
///             .property(PropertyDescriptor::new("Name", PropertyType::String))
///     }
///
///     fn id(&self) -> Uuid {
///         self.id
///     }
///
///     fn id_field() -> &'static str {
///         "Id"
///     }
/// }
/// ```
pub trait Resource: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Registration metadata for this type
    fn descriptor() -> ResourceDescriptor;

    /// Identity of this entity within its store
    fn id(&self) -> Uuid;

    /// Serialized name of the identity member
    fn id_field() -> &'static str {
        "id"
    }

    /// Serialize the entity into the document shape terms are read from
    fn to_document(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }

    /// Rebuild an entity from a document
    fn from_document(document: serde_json::Value) -> serde_json::Result<Self> {
        serde_json::from_value(document)
    }
}
