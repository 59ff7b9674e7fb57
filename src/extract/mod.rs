//! Field extraction into canonical resource records.
//!
//! Every discovered Terraform block is normalized against the schema of its
//! [`ResourceKind`]: fields outside the allow-list are dropped and allow-listed
//! fields missing from the block are carried as `null`. Extraction never
//! fails; absence is always represented as `null`.
//!
//! # Example
//!
//! ```rust
//! use nsdiscovery::extract::{extract, module_version};
//! use nsdiscovery::types::{ParsedBlock, ResourceKind};
//! use serde_json::json;
//!
//! let block: ParsedBlock = serde_json::from_value(json!({
//!     "source": "github.com/ministryofjustice/cloud-platform-terraform-rds-instance?ref=5.2.1",
//!     "db_max_allocated_storage": 100
//! })).unwrap();
//!
//! let version = module_version(block.source());
//! let record = extract(ResourceKind::RdsInstance, &block, version.as_deref());
//! assert_eq!(record.get("db_max_allocated_storage"), Some(&json!("100")));
//! assert_eq!(record.get("tf_mod_version"), Some(&json!("5.2.1")));
//! ```

mod schema;
mod version;

pub use schema::{schema, FieldRule, Rule};
pub use version::module_version;

use crate::types::{CanonicalRecord, ParsedBlock, ResourceKind};
use serde_json::Value;

/// Key a reference object uses for the referenced block's name.
pub const REFERENCE_NAME_KEY: &str = "__name__";

/// Module source markers, one per module-backed resource kind.
pub const MODULE_MARKERS: [(&str, ResourceKind); 3] = [
    ("hmpps-template", ResourceKind::HmppsTemplate),
    ("cloud-platform-terraform-rds-instance", ResourceKind::RdsInstance),
    ("cloud-platform-terraform-elasticache-cluster", ResourceKind::ElasticacheCluster),
];

/// Resource collection holding uptime checks.
pub const PINGDOM_COLLECTION: &str = "pingdom_check";

/// Classify a module by its `source` string.
#[must_use]
pub fn classify_module(source: &str) -> Option<ResourceKind> {
    MODULE_MARKERS
        .iter()
        .find(|(marker, _)| source.contains(marker))
        .map(|(_, kind)| *kind)
}

/// Whether a resource from the uptime-check collection should be catalogued.
#[must_use]
pub fn is_http_check(block: &ParsedBlock) -> bool {
    block.meta.is_some() && block.kind().contains("http")
}

/// Build the canonical record of `kind` for one block.
///
/// `version` is the pre-computed module version; it is used for the
/// version field regardless of the block's own keys.
#[must_use]
pub fn extract(kind: ResourceKind, block: &ParsedBlock, version: Option<&str>) -> CanonicalRecord {
    let fields = schema(kind)
        .iter()
        .map(|(field, rule)| ((*field).to_string(), apply_rule(*rule, field, block, version)))
        .collect();

    CanonicalRecord { id: None, fields }
}

fn apply_rule(rule: Rule, field: &str, block: &ParsedBlock, version: Option<&str>) -> Value {
    let raw = || block.get(field).cloned().unwrap_or(Value::Null);

    match rule {
        Rule::Meta(key) => block
            .meta
            .as_ref()
            .and_then(|meta| meta.get(key))
            .unwrap_or_else(raw),
        Rule::Version => version.map_or(Value::Null, Value::from),
        Rule::ReferenceName => match block.get(field) {
            Some(Value::Object(reference)) => reference
                .get(REFERENCE_NAME_KEY)
                .or_else(|| reference.get("name"))
                .cloned()
                .unwrap_or(Value::Null),
            _ => raw(),
        },
        Rule::StringifyInt => match block.get(field) {
            Some(Value::Number(n)) if n.is_i64() || n.is_u64() => Value::from(n.to_string()),
            _ => raw(),
        },
        Rule::Raw => raw(),
    }
}
