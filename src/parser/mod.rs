//! Terraform module parsing.
//!
//! The pipeline treats the parser as a black box: given a resource
//! directory it returns the module instantiations and resource blocks found
//! there, each tagged with `__tfmeta` location metadata.
//!
//! Parser implementations are not required to be safe for concurrent use.
//! [`SharedParser`] wraps one in a single mutex so every worker goes through
//! the same exclusive slot, and runs the call on a blocking thread.
//!
//! # Example
//!
//! ```rust,no_run
//! use nsdiscovery::parser::{HclModuleParser, SharedParser};
//! use nsdiscovery::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     let parser = SharedParser::new(HclModuleParser::new(&config));
//!
//!     let parsed = parser.parse("./namespaces/live/visits-dev/resources").await?;
//!     println!("Found {} modules", parsed.modules.len());
//!     Ok(())
//! }
//! ```

mod hcl;

pub use hcl::HclModuleParser;

use crate::error::Result;
use crate::types::ParseResult;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

/// File extensions to scan for Terraform/OpenTofu files.
pub const TERRAFORM_EXTENSIONS: &[&str] = &[".tf"];

/// Files to skip during scanning.
pub const SKIP_FILES: &[&str] = &[".terraform", ".terragrunt-cache", "terraform.tfstate"];

/// Trait for parsing a Terraform directory.
///
/// Implementations may keep internal state and need not be reentrant; callers
/// share them through [`SharedParser`].
#[cfg_attr(test, mockall::automock)]
pub trait ModuleParser: Send {
    /// Parse every Terraform file directly inside `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read or a file is not
    /// valid HCL.
    fn parse_dir(&mut self, dir: &Path) -> Result<ParseResult>;
}

/// A parser behind a single run-wide mutex.
///
/// Cloning shares the same parser and the same lock.
#[derive(Clone)]
pub struct SharedParser {
    inner: Arc<Mutex<Box<dyn ModuleParser>>>,
}

impl SharedParser {
    /// Wrap a parser for shared, serialized use.
    pub fn new(parser: impl ModuleParser + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(parser))),
        }
    }

    /// Parse a directory while holding the parse lock.
    ///
    /// The lock is held for the parser call only and released before the
    /// result is returned.
    ///
    /// # Errors
    ///
    /// Returns the parser's error, or an internal error if the blocking task
    /// failed. A panic inside the parser fails only that call; the lock is
    /// recovered for the next caller.
    pub async fn parse(&self, dir: impl Into<PathBuf>) -> Result<ParseResult> {
        let dir = dir.into();
        let inner = Arc::clone(&self.inner);

        tokio::task::spawn_blocking(move || {
            let mut parser = inner.lock().unwrap_or_else(|poisoned| {
                tracing::warn!(dir = %dir.display(), "Parse lock poisoned by an earlier panic, recovering");
                PoisonError::into_inner(poisoned)
            });
            tracing::debug!(dir = %dir.display(), "Parse lock acquired");
            parser.parse_dir(&dir)
        })
        .await
        .map_err(|e| crate::error::DiscoveryError::internal(format!("Parse task failed: {e}"), file!(), line!()))?
    }
}

impl std::fmt::Debug for SharedParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedParser").finish_non_exhaustive()
    }
}
