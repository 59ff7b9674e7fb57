//! Removal of catalogue namespaces that no longer exist in the checkout.

use crate::catalogue::{CatalogueClient, Collection};
use crate::error::{DiscoveryError, Result};
use crate::git::CheckoutLayout;
use crate::types::SweepReport;
use std::collections::BTreeSet;
use std::io::ErrorKind;

/// Names of the namespace directories present in the working copy.
///
/// A missing namespaces root yields an empty set.
///
/// # Errors
///
/// Returns an error if the root exists but cannot be listed completely, so
/// callers never prune against a partial set.
pub async fn live_namespaces(layout: &CheckoutLayout) -> Result<BTreeSet<String>> {
    let root = layout.namespaces_root();
    let mut live = BTreeSet::new();

    let mut entries = match tokio::fs::read_dir(&root).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::warn!(path = %root.display(), "Namespaces root not found, no live namespaces");
            return Ok(live);
        }
        Err(e) => return Err(DiscoveryError::io(&root, e, file!(), line!())),
    };

    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| DiscoveryError::io(&root, e, file!(), line!()))?
    {
        let file_type = entry
            .file_type()
            .await
            .map_err(|e| DiscoveryError::io(entry.path(), e, file!(), line!()))?;
        if file_type.is_dir() {
            live.insert(entry.file_name().to_string_lossy().into_owned());
        }
    }

    tracing::debug!(count = live.len(), "Live namespaces found");
    Ok(live)
}

/// Delete every catalogue namespace whose name is not in `live`.
///
/// Only deletes. If the catalogue listing fails nothing is attempted; a
/// failed delete is recorded and the remaining orphans are still tried.
pub async fn prune(catalogue: &dyn CatalogueClient, live: &BTreeSet<String>) -> SweepReport {
    let mut report = SweepReport::default();

    let entries = match catalogue.get_all(Collection::Namespaces).await {
        Ok(entries) => entries,
        Err(e) => {
            tracing::error!(error = %e, "Unable to list catalogue namespaces, skipping sweep");
            report.skipped = true;
            return report;
        }
    };

    for entry in entries {
        let Some(name) = entry.name().map(str::to_string) else {
            tracing::warn!(id = %entry.id, "Catalogue namespace without a name, leaving it alone");
            continue;
        };
        if live.contains(&name) {
            continue;
        }

        tracing::info!(namespace = %name, id = %entry.id, "Deleting namespace with no directory in the checkout");
        match catalogue.delete(Collection::Namespaces, &entry.id).await {
            Ok(()) => report.deleted.push(name),
            Err(e) => {
                tracing::error!(namespace = %name, error = %e, "Failed to delete namespace");
                report.failed.push((name, e.to_string()));
            }
        }
    }

    tracing::info!(deleted = report.deleted.len(), failed = report.failed.len(), "Sweep complete");
    report
}
