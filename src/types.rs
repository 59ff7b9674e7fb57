//! Core data types used throughout NsDiscovery.
//!
//! This module defines the fundamental data structures for representing:
//! - Catalogue components and their environments
//! - Terraform blocks as produced by the module parser
//! - Canonical resource records and the per-namespace aggregate
//! - Outcomes of namespace, batch, and sweep processing

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt::Display;

/// Identifier of a record in the catalogue.
///
/// The catalogue may hand out numeric or string identifiers; the pipeline
/// never interprets them beyond passing them back.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    /// Numeric identifier
    Number(u64),
    /// Opaque string identifier
    Text(String),
}

impl Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<u64> for RecordId {
    fn from(value: u64) -> Self {
        Self::Number(value)
    }
}

/// An environment of a component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    /// Display name (e.g. "dev", "prod")
    #[serde(default)]
    pub name: String,

    /// Namespace the environment deploys into; the join key with the catalogue
    #[serde(default)]
    pub namespace: Option<String>,
}

/// A catalogue-tracked component and the environments it deploys to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    /// Component name, used for logging
    pub name: String,

    /// Environments in catalogue order
    #[serde(default, rename = "environments")]
    pub envs: Vec<Environment>,
}

impl Component {
    /// Namespaces referenced by this component, in environment order.
    ///
    /// Environments without a namespace are skipped.
    pub fn namespaces(&self) -> impl Iterator<Item = &str> {
        self.envs
            .iter()
            .filter_map(|env| env.namespace.as_deref())
            .filter(|ns| !ns.is_empty())
    }
}

/// Parser metadata attached to each block (`__tfmeta` in parser output).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TfMeta {
    /// Block label (e.g. `rds` for `module "rds"`)
    pub label: String,
    /// File name relative to the parsed directory
    pub filename: String,
    /// Terraform address (e.g. `module.rds`)
    pub path: String,
    /// First line of the block (1-based)
    pub line_start: usize,
    /// Last line of the block (1-based)
    pub line_end: usize,
}

impl TfMeta {
    /// Look up a metadata key by name.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        match key {
            "label" => Some(Value::from(self.label.clone())),
            "filename" => Some(Value::from(self.filename.clone())),
            "path" => Some(Value::from(self.path.clone())),
            "line_start" => Some(Value::from(self.line_start)),
            "line_end" => Some(Value::from(self.line_end)),
            _ => None,
        }
    }
}

/// A module instantiation or resource block produced by the parser.
///
/// Attributes are kept as a dynamically typed bag: scalars, nested
/// mappings, lists, and reference objects (mappings carrying `__name__`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedBlock {
    /// Parser metadata, absent for synthesized blocks
    #[serde(rename = "__tfmeta", default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<TfMeta>,

    /// Attribute bag
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl ParsedBlock {
    /// Raw attribute value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// The `source` string of a module block, empty when absent.
    #[must_use]
    pub fn source(&self) -> &str {
        self.attributes
            .get("source")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    /// The `type` string of a resource block, empty when absent.
    #[must_use]
    pub fn kind(&self) -> &str {
        self.attributes
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }
}

/// Result of parsing one resource directory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParseResult {
    /// Module instantiations in file then declaration order
    #[serde(default)]
    pub modules: Vec<ParsedBlock>,

    /// Resource blocks keyed by resource type (e.g. `pingdom_check`)
    #[serde(default)]
    pub resources: BTreeMap<String, Vec<ParsedBlock>>,
}

impl ParseResult {
    /// Merge another result into this one.
    pub fn merge(&mut self, other: Self) {
        self.modules.extend(other.modules);
        for (kind, blocks) in other.resources {
            self.resources.entry(kind).or_default().extend(blocks);
        }
    }

    /// Resource collection for a resource type, if the parse exposed one.
    #[must_use]
    pub fn collection(&self, kind: &str) -> Option<&[ParsedBlock]> {
        self.resources.get(kind).map(Vec::as_slice)
    }
}

/// The canonical resource variants stored per namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// Repository/team template binding module
    HmppsTemplate,
    /// Relational database instance module
    RdsInstance,
    /// Cache cluster module
    ElasticacheCluster,
    /// Uptime check resource
    PingdomCheck,
}

impl ResourceKind {
    /// Every kind, in catalogue field order.
    pub const ALL: [Self; 4] = [
        Self::RdsInstance,
        Self::ElasticacheCluster,
        Self::HmppsTemplate,
        Self::PingdomCheck,
    ];

    /// Catalogue field name holding records of this kind.
    #[must_use]
    pub const fn field(self) -> &'static str {
        match self {
            Self::HmppsTemplate => "hmpps_template",
            Self::RdsInstance => "rds_instance",
            Self::ElasticacheCluster => "elasticache_cluster",
            Self::PingdomCheck => "pingdom_check",
        }
    }
}

impl Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.field())
    }
}

/// One normalized resource ready for catalogue storage.
///
/// Fields are restricted to the allow-list of the record's kind and kept in
/// a `BTreeMap` so serialization is byte-stable across runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    /// Catalogue id of the sub-record being updated in place, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,

    /// Allow-listed fields
    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,
}

impl CanonicalRecord {
    /// Field value, `None` when the field is not on the record.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// The record's `tf_path`, used to match existing catalogue sub-records.
    #[must_use]
    pub fn tf_path(&self) -> Option<&str> {
        self.fields.get("tf_path").and_then(Value::as_str)
    }
}

/// The aggregate persisted for one namespace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NamespaceRecord {
    /// Namespace name
    pub name: String,
    /// Relational database instances
    #[serde(default)]
    pub rds_instance: Vec<CanonicalRecord>,
    /// Cache clusters
    #[serde(default)]
    pub elasticache_cluster: Vec<CanonicalRecord>,
    /// Template bindings
    #[serde(default)]
    pub hmpps_template: Vec<CanonicalRecord>,
    /// Uptime checks
    #[serde(default)]
    pub pingdom_check: Vec<CanonicalRecord>,
}

impl NamespaceRecord {
    /// An empty record for a namespace.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// The sequence holding records of a kind.
    #[must_use]
    pub fn records(&self, kind: ResourceKind) -> &[CanonicalRecord] {
        match kind {
            ResourceKind::HmppsTemplate => &self.hmpps_template,
            ResourceKind::RdsInstance => &self.rds_instance,
            ResourceKind::ElasticacheCluster => &self.elasticache_cluster,
            ResourceKind::PingdomCheck => &self.pingdom_check,
        }
    }

    /// Mutable access to the sequence holding records of a kind.
    pub fn records_mut(&mut self, kind: ResourceKind) -> &mut Vec<CanonicalRecord> {
        match kind {
            ResourceKind::HmppsTemplate => &mut self.hmpps_template,
            ResourceKind::RdsInstance => &mut self.rds_instance,
            ResourceKind::ElasticacheCluster => &mut self.elasticache_cluster,
            ResourceKind::PingdomCheck => &mut self.pingdom_check,
        }
    }

    /// Total number of discovered resources.
    #[must_use]
    pub fn resource_count(&self) -> usize {
        ResourceKind::ALL.iter().map(|k| self.records(*k).len()).sum()
    }

    /// Serialize for the catalogue.
    ///
    /// # Errors
    ///
    /// Returns an error if a field cannot be represented as JSON.
    pub fn to_value(&self) -> crate::Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// What happened to one namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NamespaceOutcome {
    /// Another worker had already claimed the namespace this run
    Skipped,
    /// A new catalogue record was created
    Created,
    /// The existing catalogue record was updated
    Updated,
}

/// Outcome of one component task in a batch.
#[derive(Debug)]
pub struct ComponentReport {
    /// Component name
    pub component: String,
    /// Per-namespace results in environment order
    pub namespaces: Vec<(String, crate::Result<NamespaceOutcome>)>,
    /// Task-level failure (panic or timeout) that cut the component short
    pub failure: Option<crate::DiscoveryError>,
}

impl ComponentReport {
    /// Whether every namespace of the component was processed.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.failure.is_none() && self.namespaces.iter().all(|(_, r)| r.is_ok())
    }
}

/// Aggregated result of a worker pool batch.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Component reports in completion order
    pub components: Vec<ComponentReport>,
}

impl BatchReport {
    /// Number of components that completed cleanly.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.components.iter().filter(|c| c.succeeded()).count()
    }

    /// Number of components with at least one failure.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.components.len() - self.succeeded()
    }

    /// Count namespaces with a given outcome.
    #[must_use]
    pub fn count(&self, outcome: NamespaceOutcome) -> usize {
        self.components
            .iter()
            .flat_map(|c| c.namespaces.iter())
            .filter(|(_, r)| matches!(r, Ok(o) if *o == outcome))
            .count()
    }

    /// Render every failure as `component/namespace: error`.
    #[must_use]
    pub fn error_messages(&self) -> Vec<String> {
        let mut messages = Vec::new();
        for report in &self.components {
            for (namespace, result) in &report.namespaces {
                if let Err(e) = result {
                    messages.push(format!("{}/{namespace}: {e}", report.component));
                }
            }
            if let Some(e) = &report.failure {
                messages.push(format!("{}: {e}", report.component));
            }
        }
        messages
    }
}

/// Result of the reconciliation sweep.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Namespaces deleted from the catalogue
    pub deleted: Vec<String>,
    /// Namespaces whose delete call failed, with the error text
    pub failed: Vec<(String, String)>,
    /// Set when the catalogue listing failed and nothing was attempted
    pub skipped: bool,
}

/// Final classification of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    /// Everything processed without errors
    Succeeded,
    /// The run finished but some units failed
    CompletedWithErrors,
    /// The run was aborted
    Failed,
}

impl JobStatus {
    /// Status string stored on the scheduled job record.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Succeeded => "Succeeded",
            Self::CompletedWithErrors => "Completed with errors",
            Self::Failed => "Failed",
        }
    }
}

impl Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summary of a full discovery run.
#[derive(Debug)]
pub struct RunSummary {
    /// Final status
    pub status: JobStatus,
    /// Worker pool results
    pub batch: BatchReport,
    /// Sweep results, `None` when the sweep was disabled
    pub sweep: Option<SweepReport>,
    /// Every error message accumulated during the run
    pub errors: Vec<String>,
}
