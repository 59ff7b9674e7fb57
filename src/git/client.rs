//! Git-backed working copy.
//!
//! Clones the environments repository with git2 when no working copy exists
//! and refreshes it with `git fetch` + `git reset --hard` otherwise.

use super::{sync, SourceCheckout};
use crate::config::Config;
use crate::error::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use url::Url;

/// Working copy kept in sync with a remote repository.
#[derive(Clone)]
pub struct GitCheckout {
    repository: String,
    branch: Option<String>,
    token: Option<String>,
    path: PathBuf,
    pull: bool,
}

impl std::fmt::Debug for GitCheckout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitCheckout")
            .field("repository", &self.repository)
            .field("branch", &self.branch)
            .field("has_token", &self.token.is_some())
            .field("path", &self.path)
            .field("pull", &self.pull)
            .finish()
    }
}

impl GitCheckout {
    /// Create a checkout manager from configuration.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            repository: config.git.repository.clone(),
            branch: config.git.branch.clone(),
            token: config.git.github_token.clone().filter(|t| !t.is_empty()),
            path: config.discovery.checkout_dir.clone(),
            pull: config.git.pull,
        }
    }

    async fn clone_fresh(&self) -> Result<()> {
        let clone_url = match &self.token {
            Some(token) => {
                tracing::debug!("Added authentication token to URL (token masked)");
                authenticated_url(&self.repository, token)
            }
            None => self.repository.clone(),
        };

        tracing::info!(
            url = %self.repository,
            path = %self.path.display(),
            branch = ?self.branch,
            "Cloning repository"
        );
        clone_repository(clone_url, self.path.clone(), self.branch.clone())
            .await
            .map_err(|e| match e {
                // Never surface the tokenized URL
                crate::DiscoveryError::GitClone { message, .. } => crate::err!(GitClone {
                    url: self.repository.clone(),
                    message,
                }),
                other => other,
            })
    }

    async fn refresh(&self) -> Result<()> {
        if !self.pull {
            tracing::info!(path = %self.path.display(), "Pull disabled, using working copy as is");
            return Ok(());
        }

        let sha = sync::fetch_and_reset(&self.path, self.branch.as_deref()).await?;
        tracing::info!(path = %self.path.display(), sha = %sha, "Working copy updated");
        Ok(())
    }
}

#[async_trait]
impl SourceCheckout for GitCheckout {
    async fn ensure(&self) -> Result<PathBuf> {
        let result = if self.path.join(".git").exists() {
            self.refresh().await
        } else if is_empty_or_missing(&self.path).await {
            self.clone_fresh().await
        } else {
            Err(crate::err!(Git {
                message: "directory exists but is not a git working copy".to_string(),
            }))
        };

        result.map_err(|e| {
            crate::err!(Checkout {
                path: self.path.clone(),
                message: e.to_string(),
            })
        })?;
        Ok(self.path.clone())
    }
}

async fn is_empty_or_missing(path: &Path) -> bool {
    match tokio::fs::read_dir(path).await {
        Ok(mut entries) => matches!(entries.next_entry().await, Ok(None)),
        Err(e) => e.kind() == std::io::ErrorKind::NotFound,
    }
}

/// Insert a token into an HTTPS GitHub URL.
///
/// Non-HTTPS URLs and URLs that already carry credentials are returned
/// unchanged.
#[must_use]
pub fn authenticated_url(url: &str, token: &str) -> String {
    let Ok(mut parsed) = Url::parse(url) else {
        return url.to_string();
    };
    if parsed.scheme() != "https" || !parsed.username().is_empty() {
        return url.to_string();
    }
    if parsed.set_username("x-access-token").is_err() || parsed.set_password(Some(token)).is_err() {
        return url.to_string();
    }
    parsed.into()
}

fn is_local(url: &str) -> bool {
    url.starts_with("file://") || !url.contains("://")
}

async fn clone_repository(url: String, target_path: PathBuf, branch: Option<String>) -> Result<()> {
    tokio::task::spawn_blocking(move || {
        let mut builder = git2::build::RepoBuilder::new();
        let mut fetch_options = git2::FetchOptions::new();

        // The local transport cannot do shallow fetches
        if !is_local(&url) {
            fetch_options.depth(1);
        }
        builder.fetch_options(fetch_options);

        if let Some(ref branch) = branch {
            builder.branch(branch);
        }

        builder.clone(&url, &target_path).map_err(|e| {
            crate::err!(GitClone {
                url: url.clone(),
                message: e.message().to_string(),
            })
        })?;

        Ok(())
    })
    .await
    .map_err(|e| crate::DiscoveryError::internal(format!("Clone task failed: {e}"), file!(), line!()))?
}
