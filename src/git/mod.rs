//! Source checkout management.
//!
//! The pipeline reads Terraform from a local working copy of the environments
//! repository. This module makes sure that working copy exists and is current
//! before any namespace is processed.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                   SourceCheckout (trait)                        │
//! │  - ensure() -> root of a usable working copy                    │
//! └─────────────────────────────────────────────────────────────────┘
//!                  │                               │
//!                  ▼                               ▼
//!          ┌──────────────┐                ┌──────────────┐
//!          │ GitCheckout  │                │LocalCheckout │
//!          │ clone / pull │                │ existing tree│
//!          └──────────────┘                └──────────────┘
//! ```
//!
//! Inside the working copy, [`CheckoutLayout`] knows where namespace
//! directories live: `<root>/namespaces/<domain>/<namespace>/resources`.
//!
//! # Example
//!
//! ```rust,no_run
//! use nsdiscovery::git::{GitCheckout, SourceCheckout};
//! use nsdiscovery::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     let checkout = GitCheckout::new(&config);
//!     let root = checkout.ensure().await?;
//!     println!("Working copy at {}", root.display());
//!     Ok(())
//! }
//! ```

mod client;
mod sync;

pub use client::{authenticated_url, GitCheckout};
pub use sync::{fetch_and_reset, head_sha};

use crate::config::Config;
use crate::error::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Provides the root of an up-to-date working copy.
#[async_trait]
pub trait SourceCheckout: Send + Sync {
    /// Make the working copy available and return its root.
    ///
    /// # Errors
    ///
    /// Any error is fatal for the run.
    async fn ensure(&self) -> Result<PathBuf>;
}

/// A working copy that is already on disk and managed by someone else.
#[derive(Debug, Clone)]
pub struct LocalCheckout {
    root: PathBuf,
}

impl LocalCheckout {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl SourceCheckout for LocalCheckout {
    async fn ensure(&self) -> Result<PathBuf> {
        match tokio::fs::metadata(&self.root).await {
            Ok(meta) if meta.is_dir() => {
                tracing::info!(path = %self.root.display(), "Using existing working copy");
                Ok(self.root.clone())
            }
            Ok(_) => Err(crate::err!(Checkout {
                path: self.root.clone(),
                message: "not a directory".to_string(),
            })),
            Err(e) => Err(crate::err!(Checkout {
                path: self.root.clone(),
                message: e.to_string(),
            })),
        }
    }
}

/// Where namespace directories live inside a working copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutLayout {
    root: PathBuf,
    domain: String,
}

impl CheckoutLayout {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, domain: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            domain: domain.into(),
        }
    }

    /// Layout for the configured checkout directory and domain.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.discovery.checkout_dir, &config.discovery.namespace_domain)
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/namespaces/<domain>`
    #[must_use]
    pub fn namespaces_root(&self) -> PathBuf {
        self.root.join("namespaces").join(&self.domain)
    }

    /// `<root>/namespaces/<domain>/<namespace>/resources`
    #[must_use]
    pub fn resources_dir(&self, namespace: &str) -> PathBuf {
        self.namespaces_root().join(namespace).join("resources")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_paths() {
        let layout = CheckoutLayout::new("/tmp/cp_envs", "live.cloud-platform.service.justice.gov.uk");
        assert_eq!(
            layout.resources_dir("visits-dev"),
            PathBuf::from("/tmp/cp_envs/namespaces/live.cloud-platform.service.justice.gov.uk/visits-dev/resources")
        );
        assert_eq!(
            layout.namespaces_root(),
            PathBuf::from("/tmp/cp_envs/namespaces/live.cloud-platform.service.justice.gov.uk")
        );
    }

    #[tokio::test]
    async fn test_local_checkout() {
        let dir = tempfile::tempdir().unwrap();
        let checkout = LocalCheckout::new(dir.path());
        assert_eq!(checkout.ensure().await.unwrap(), dir.path());

        let missing = LocalCheckout::new(dir.path().join("missing"));
        let err = missing.ensure().await.unwrap_err();
        assert!(matches!(err, crate::DiscoveryError::Checkout { .. }));
        assert_eq!(err.exit_code(), 17);
    }
}
