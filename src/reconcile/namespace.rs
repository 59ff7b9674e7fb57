//! Discovery and upsert of a single namespace.

use super::claims::NamespaceClaims;
use crate::catalogue::{CatalogueClient, CatalogueEntry, Collection};
use crate::error::{DiscoveryError, Result};
use crate::extract::{self, classify_module, is_http_check, module_version, PINGDOM_COLLECTION};
use crate::git::CheckoutLayout;
use crate::parser::SharedParser;
use crate::types::{NamespaceOutcome, NamespaceRecord, ParseResult, RecordId, ResourceKind};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Kinds whose catalogue sub-records keep their id across runs.
const CARRY_OVER_KINDS: [ResourceKind; 3] = [
    ResourceKind::RdsInstance,
    ResourceKind::ElasticacheCluster,
    ResourceKind::PingdomCheck,
];

/// Turns one namespace directory into a catalogue record.
#[derive(Clone)]
pub struct NamespaceProcessor {
    catalogue: Arc<dyn CatalogueClient>,
    parser: SharedParser,
    layout: CheckoutLayout,
}

impl NamespaceProcessor {
    pub fn new(catalogue: Arc<dyn CatalogueClient>, parser: SharedParser, layout: CheckoutLayout) -> Self {
        Self {
            catalogue,
            parser,
            layout,
        }
    }

    /// Claim, discover, and upsert one namespace.
    ///
    /// # Errors
    ///
    /// Returns the first filesystem, parser, or catalogue error hit while
    /// processing the namespace. A namespace already claimed is not an error.
    pub async fn process(&self, namespace: &str, claims: &NamespaceClaims) -> Result<NamespaceOutcome> {
        if !claims.claim(namespace) {
            tracing::debug!(namespace = %namespace, "Skipping namespace, already processed");
            return Ok(NamespaceOutcome::Skipped);
        }

        let result = self.upsert(namespace).await;
        if let Err(e) = &result {
            tracing::error!(namespace = %namespace, error = %e, "Failed to process namespace");
        }
        result
    }

    async fn upsert(&self, namespace: &str) -> Result<NamespaceOutcome> {
        let existing = self
            .catalogue
            .find_one(Collection::Namespaces, "name", namespace)
            .await?;

        let mut record = self.discover(namespace).await?;
        if let Some(entry) = &existing {
            carry_over_ids(&mut record, entry);
        }

        let data = record.to_value()?;
        tracing::debug!(namespace = %namespace, resources = record.resource_count(), "Namespace data built");

        match existing {
            None => {
                tracing::info!(namespace = %namespace, "Adding new namespace to catalogue");
                self.catalogue.create(Collection::Namespaces, &data).await?;
                Ok(NamespaceOutcome::Created)
            }
            Some(entry) => {
                tracing::info!(namespace = %namespace, id = %entry.id, "Updating namespace in catalogue");
                self.catalogue.update(Collection::Namespaces, &entry.id, &data).await?;
                Ok(NamespaceOutcome::Updated)
            }
        }
    }

    /// Build the record for a namespace from its resource directory.
    ///
    /// A missing directory yields an empty record.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be inspected or parsed.
    pub async fn discover(&self, namespace: &str) -> Result<NamespaceRecord> {
        let dir = self.layout.resources_dir(namespace);

        match tokio::fs::metadata(&dir).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                tracing::debug!(namespace = %namespace, path = %dir.display(), "Resources path is not a directory");
                return Ok(NamespaceRecord::new(namespace));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(namespace = %namespace, path = %dir.display(), "No resources directory");
                return Ok(NamespaceRecord::new(namespace));
            }
            Err(e) => return Err(DiscoveryError::io(&dir, e, file!(), line!())),
        }

        let parsed = self.parser.parse(dir).await?;
        Ok(build_record(namespace, &parsed))
    }
}

impl std::fmt::Debug for NamespaceProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamespaceProcessor")
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}

/// Extract every recognized resource of a parse into a namespace record.
#[must_use]
pub fn build_record(namespace: &str, parsed: &ParseResult) -> NamespaceRecord {
    let mut record = NamespaceRecord::new(namespace);

    for module in &parsed.modules {
        let version = module_version(module.source());
        let Some(kind) = classify_module(module.source()) else {
            continue;
        };

        let mut block = module.clone();
        block
            .attributes
            .insert("namespace".to_string(), Value::from(namespace));
        record
            .records_mut(kind)
            .push(extract::extract(kind, &block, version.as_deref()));
    }

    if let Some(checks) = parsed.collection(PINGDOM_COLLECTION) {
        record.pingdom_check = checks
            .iter()
            .filter(|check| is_http_check(check))
            .map(|check| extract::extract(ResourceKind::PingdomCheck, check, None))
            .collect();
    }

    record
}

/// Reuse the ids of existing catalogue sub-records with the same `tf_path`.
fn carry_over_ids(record: &mut NamespaceRecord, existing: &CatalogueEntry) {
    for kind in CARRY_OVER_KINDS {
        let known: HashMap<&str, RecordId> = existing
            .get(kind.field())
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|item| {
                let path = item.get("tf_path")?.as_str()?;
                let id = serde_json::from_value(item.get("id")?.clone()).ok()?;
                Some((path, id))
            })
            .collect();

        for discovered in record.records_mut(kind) {
            if let Some(id) = discovered.tf_path().and_then(|path| known.get(path)) {
                discovered.id = Some(id.clone());
            }
        }
    }
}
