//! Service catalogue access.
//!
//! The pipeline talks to the catalogue through the [`CatalogueClient`] trait:
//! list a collection, look a record up by field, create, update, and delete.
//! [`HttpCatalogue`] is the production transport; [`InMemoryCatalogue`] keeps
//! everything in process for tests and dry runs.
//!
//! # Example
//!
//! ```rust,no_run
//! use nsdiscovery::catalogue::{CatalogueClient, Collection, InMemoryCatalogue};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let catalogue = InMemoryCatalogue::new();
//!     let id = catalogue.create(Collection::Namespaces, &json!({"name": "visits-dev"})).await?;
//!     assert_eq!(catalogue.get_id(Collection::Namespaces, "name", "visits-dev").await?, Some(id));
//!     Ok(())
//! }
//! ```

mod http;
mod memory;

pub use http::{HttpCatalogue, RetryPolicy};
pub use memory::{CatalogueCall, InMemoryCatalogue};

use crate::error::Result;
use crate::types::{Component, RecordId};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::fmt::Display;

/// Catalogue collections the pipeline reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    /// Tracked components with their environments
    Components,
    /// Per-namespace resource aggregates
    Namespaces,
    /// Scheduled job status records
    ScheduledJobs,
}

impl Collection {
    /// URL path segment of the collection.
    #[must_use]
    pub const fn path(self) -> &'static str {
        match self {
            Self::Components => "components",
            Self::Namespaces => "namespaces",
            Self::ScheduledJobs => "scheduled-jobs",
        }
    }

    /// Relations to populate when reading the collection.
    #[must_use]
    pub const fn populate(self) -> Option<&'static str> {
        match self {
            Self::Components => Some("environments"),
            Self::Namespaces => Some("*"),
            Self::ScheduledJobs => None,
        }
    }
}

impl Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.path())
    }
}

/// One record as returned by the catalogue.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogueEntry {
    /// Catalogue identifier
    pub id: RecordId,
    /// Record attributes
    pub attributes: Map<String, Value>,
}

impl CatalogueEntry {
    /// Attribute value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// The `name` attribute, if it is a string.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.get("name").and_then(Value::as_str)
    }

    /// Decode an entry from its wire shape.
    ///
    /// Accepts both `{"id": 1, "attributes": {...}}` and the flattened
    /// `{"id": 1, "name": ...}` form. Returns `None` when there is no usable id.
    #[must_use]
    pub fn from_value(value: Value) -> Option<Self> {
        let Value::Object(mut object) = value else {
            return None;
        };
        let id = serde_json::from_value(object.remove("id")?).ok()?;
        let attributes = match object.remove("attributes") {
            Some(Value::Object(attributes)) => attributes,
            _ => object,
        };
        Some(Self { id, attributes })
    }
}

/// Typed access to the service catalogue.
///
/// Implementations are shared by every worker and must be safe for
/// concurrent use.
#[async_trait]
pub trait CatalogueClient: Send + Sync {
    /// Check that the catalogue is reachable.
    async fn ping(&self) -> Result<()>;

    /// Every record of a collection, across all pages.
    async fn get_all(&self, collection: Collection) -> Result<Vec<CatalogueEntry>>;

    /// First record whose `field` equals `value`.
    async fn find_one(&self, collection: Collection, field: &str, value: &str) -> Result<Option<CatalogueEntry>>;

    /// Identifier of the first record whose `field` equals `value`.
    async fn get_id(&self, collection: Collection, field: &str, value: &str) -> Result<Option<RecordId>> {
        Ok(self.find_one(collection, field, value).await?.map(|entry| entry.id))
    }

    /// Create a record and return its identifier.
    async fn create(&self, collection: Collection, data: &Value) -> Result<RecordId>;

    /// Replace the attributes of an existing record.
    async fn update(&self, collection: Collection, id: &RecordId, data: &Value) -> Result<()>;

    /// Delete a record.
    async fn delete(&self, collection: Collection, id: &RecordId) -> Result<()>;
}

/// Fetch every component with its environments.
///
/// Entries that do not decode as a component are logged and skipped.
pub async fn get_components(client: &dyn CatalogueClient) -> Result<Vec<Component>> {
    let entries = client.get_all(Collection::Components).await?;
    let total = entries.len();

    let components: Vec<Component> = entries
        .into_iter()
        .filter_map(|entry| {
            match serde_json::from_value::<Component>(Value::Object(entry.attributes)) {
                Ok(component) => Some(component),
                Err(e) => {
                    tracing::warn!(id = %entry.id, error = %e, "Skipping malformed component");
                    None
                }
            }
        })
        .collect();

    tracing::info!(count = components.len(), skipped = total - components.len(), "Fetched components");
    Ok(components)
}
