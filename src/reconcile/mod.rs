//! Concurrent discovery and reconciliation.
//!
//! - [`NamespaceClaims`]: run-scoped dedup of namespaces across components
//! - [`NamespaceProcessor`]: discover one namespace and upsert its record
//! - [`WorkerPool`]: bounded fan-out of components
//! - [`prune`]: delete catalogue namespaces with no directory in the checkout

mod claims;
mod namespace;
mod pool;
mod sweep;

pub use claims::NamespaceClaims;
pub use namespace::{build_record, NamespaceProcessor};
pub use pool::{ComponentRunner, NamespaceResults, WorkerPool};
pub use sweep::{live_namespaces, prune};
