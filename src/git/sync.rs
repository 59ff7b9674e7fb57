//! Refreshing an existing working copy with the git CLI.

use crate::error::Result;
use std::path::Path;
use tokio::process::Command;

async fn git(repo_path: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(repo_path)
        .output()
        .await
        .map_err(|e| crate::err!(Git {
            message: format!("Failed to run git {}: {e}", args.join(" ")),
        }))?;

    if !output.status.success() {
        return Err(crate::err!(Git {
            message: format!(
                "git {} failed: {}",
                args.first().copied().unwrap_or_default(),
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        }));
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Current HEAD commit of a working copy.
///
/// # Errors
///
/// Returns an error if git cannot be run or the directory is not a repository.
pub async fn head_sha(repo_path: &Path) -> Result<String> {
    git(repo_path, &["rev-parse", "HEAD"]).await
}

/// Fetch the remote head and hard-reset the working copy onto it.
///
/// Returns the new HEAD commit.
///
/// # Errors
///
/// Returns an error if the fetch fails or no reset target works.
pub async fn fetch_and_reset(repo_path: &Path, branch: Option<&str>) -> Result<String> {
    tracing::debug!(path = %repo_path.display(), branch = ?branch, "Fetching updates from remote");

    let mut args = vec!["fetch", "origin", "--depth=1"];
    if let Some(b) = branch {
        args.push(b);
    }
    git(repo_path, &args).await?;

    let remote_ref = branch.map_or_else(|| "origin/HEAD".to_string(), |b| format!("origin/{b}"));
    if let Err(e) = git(repo_path, &["reset", "--hard", &remote_ref]).await {
        tracing::debug!(remote_ref = %remote_ref, error = %e, "Reset to remote ref failed, using FETCH_HEAD");
        git(repo_path, &["reset", "--hard", "FETCH_HEAD"]).await?;
    }

    head_sha(repo_path).await
}
