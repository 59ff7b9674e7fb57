//! # NsDiscovery
//!
//! Terraform namespace discovery and service catalogue reconciliation.
//!
//! NsDiscovery walks the namespace directories of an environments repository,
//! parses each namespace's Terraform, extracts the resources the catalogue
//! tracks, and keeps exactly one catalogue record per namespace in sync.
//!
//! ## Features
//!
//! - **Field extraction**: relational databases, cache clusters, template
//!   bindings and uptime checks, with module versions taken from the source
//!   reference
//! - **Bounded concurrency**: one task per component, a configurable number
//!   at once, with failures isolated to the unit that raised them
//! - **Deduplication**: a namespace shared by several components is
//!   processed once per run
//! - **Reconciliation sweep**: catalogue namespaces with no directory in the
//!   checkout are removed
//! - **Operator plumbing**: Slack alerts on fatal failures and a job status
//!   record after every run
//!
//! ## Example
//!
//! ```rust,no_run
//! use nsdiscovery::{Config, Discovery};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load(None)?;
//!     let discovery = Discovery::from_config(config, false)?;
//!
//!     let summary = discovery.run().await?;
//!     println!("{}: {} components", summary.status, summary.batch.components.len());
//!
//!     Ok(())
//! }
//! ```

#![warn(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

pub mod catalogue;
pub mod cli;
pub mod config;
pub mod error;
pub mod extract;
pub mod git;
pub mod notify;
pub mod parser;
pub mod reconcile;
pub mod status;
pub mod types;

// Re-export commonly used types at crate root
pub use config::Config;
pub use error::{DiscoveryError, Result};
pub use types::{BatchReport, Component, JobStatus, NamespaceOutcome, NamespaceRecord, RunSummary, SweepReport};

use catalogue::{CatalogueClient, HttpCatalogue};
use git::{CheckoutLayout, GitCheckout, LocalCheckout, SourceCheckout};
use notify::AlertSink;
use parser::{HclModuleParser, SharedParser};
use reconcile::{NamespaceProcessor, WorkerPool};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Prefix of every alert raised for a failed run.
pub const FAILURE_ALERT_PREFIX: &str = "*Terraform Discovery failed*";

/// Main orchestrator for one discovery run.
///
/// The run goes through these steps, in order:
/// - make the working copy available
/// - check the catalogue is reachable
/// - fetch the components and fan them out over the worker pool
/// - sweep catalogue namespaces that no longer exist in the checkout
/// - record the run status on the scheduled job record
///
/// Failures in the first three steps abort the run, raise an alert and
/// mark the job as failed. Anything later is collected into the summary.
///
/// # Example
///
/// ```rust,no_run
/// use nsdiscovery::catalogue::InMemoryCatalogue;
/// use nsdiscovery::git::LocalCheckout;
/// use nsdiscovery::notify::LogAlertSink;
/// use nsdiscovery::parser::{HclModuleParser, SharedParser};
/// use nsdiscovery::{Config, Discovery};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let config = Config::default();
///     let parser = SharedParser::new(HclModuleParser::new(&config));
///     let discovery = Discovery::new(
///         config,
///         Arc::new(InMemoryCatalogue::new()),
///         Box::new(LocalCheckout::new("./cloud-platform-environments")),
///         Box::new(LogAlertSink),
///         parser,
///     );
///     let summary = discovery.run().await?;
///     println!("{}", summary.status);
///     Ok(())
/// }
/// ```
pub struct Discovery {
    config: Config,
    catalogue: Arc<dyn CatalogueClient>,
    checkout: Box<dyn SourceCheckout>,
    alerts: Box<dyn AlertSink>,
    parser: SharedParser,
}

impl std::fmt::Debug for Discovery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Discovery")
            .field("checkout_dir", &self.config.discovery.checkout_dir)
            .field("max_workers", &self.config.discovery.max_workers)
            .finish_non_exhaustive()
    }
}

impl Discovery {
    /// Create an orchestrator from its collaborators.
    #[must_use]
    pub fn new(
        config: Config,
        catalogue: Arc<dyn CatalogueClient>,
        checkout: Box<dyn SourceCheckout>,
        alerts: Box<dyn AlertSink>,
        parser: SharedParser,
    ) -> Self {
        Self {
            config,
            catalogue,
            checkout,
            alerts,
            parser,
        }
    }

    /// Build the production wiring: HTTP catalogue, Slack alerts (when a
    /// token is configured) and the HCL parser.
    ///
    /// With `local` set, the checkout directory is used as it is and no git
    /// operation happens.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the catalogue URL
    /// is missing or an HTTP client cannot be built.
    pub fn from_config(config: Config, local: bool) -> Result<Self> {
        config.validate()?;

        let catalogue: Arc<dyn CatalogueClient> = Arc::new(HttpCatalogue::new(&config.catalogue)?);
        let checkout: Box<dyn SourceCheckout> = if local {
            Box::new(LocalCheckout::new(&config.discovery.checkout_dir))
        } else {
            Box::new(GitCheckout::new(&config))
        };
        let alerts = notify::from_options(&config.alerts)?;
        let parser = SharedParser::new(HclModuleParser::new(&config));

        Ok(Self::new(config, catalogue, checkout, alerts, parser))
    }

    /// Execute one full run.
    ///
    /// # Errors
    ///
    /// Returns the fatal error when the checkout cannot be obtained, the
    /// catalogue is unreachable or the components cannot be listed. Per-unit
    /// and sweep failures do not error; they are reported in the summary.
    pub async fn run(&self) -> Result<RunSummary> {
        let started = Instant::now();
        tracing::info!(job = %self.config.job.name, "Starting discovery run");

        let (root, components) = match self.prepare().await {
            Ok(prepared) => prepared,
            Err(e) => {
                self.abort(&e).await;
                return Err(e);
            }
        };
        let layout = CheckoutLayout::new(root, &self.config.discovery.namespace_domain);

        let processor = NamespaceProcessor::new(Arc::clone(&self.catalogue), self.parser.clone(), layout.clone());
        let pool = WorkerPool::new(Arc::new(processor), self.config.discovery.max_workers)
            .with_unit_timeout(self.config.discovery.unit_timeout_secs.map(Duration::from_secs));
        let batch = pool.run_batch(components).await;

        let sweep = if self.config.discovery.sweep {
            Some(self.sweep(&layout).await)
        } else {
            tracing::info!("Sweep disabled");
            None
        };

        let mut errors = batch.error_messages();
        if let Some(sweep) = &sweep {
            errors.extend(
                sweep
                    .failed
                    .iter()
                    .map(|(namespace, message)| format!("sweep {namespace}: {message}")),
            );
            if sweep.skipped {
                errors.push("sweep skipped".to_string());
            }
        }

        let status = if errors.is_empty() {
            JobStatus::Succeeded
        } else {
            JobStatus::CompletedWithErrors
        };

        tracing::info!(
            status = %status,
            components = batch.components.len(),
            created = batch.count(NamespaceOutcome::Created),
            updated = batch.count(NamespaceOutcome::Updated),
            errors = errors.len(),
            elapsed_ms = started.elapsed().as_millis(),
            "Discovery run finished"
        );

        for error in &errors {
            tracing::warn!(error = %error, "Run completed with error");
        }
        self.record_status(status, &errors).await;

        Ok(RunSummary {
            status,
            batch,
            sweep,
            errors,
        })
    }

    async fn prepare(&self) -> Result<(PathBuf, Vec<Component>)> {
        let root = self.checkout.ensure().await?;
        self.catalogue.ping().await?;
        let components = catalogue::get_components(self.catalogue.as_ref()).await?;
        Ok((root, components))
    }

    async fn sweep(&self, layout: &CheckoutLayout) -> SweepReport {
        match reconcile::live_namespaces(layout).await {
            Ok(live) => reconcile::prune(self.catalogue.as_ref(), &live).await,
            Err(e) => {
                tracing::error!(error = %e, "Unable to list live namespaces, skipping sweep");
                SweepReport {
                    skipped: true,
                    ..SweepReport::default()
                }
            }
        }
    }

    async fn abort(&self, error: &DiscoveryError) {
        tracing::error!(error = %error, "Discovery run aborted");
        let message = format!("{FAILURE_ALERT_PREFIX}: {error}");
        if let Err(e) = self.alerts.alert(&message).await {
            tracing::warn!(error = %e, "Failed to send failure alert");
        }
        self.record_status(JobStatus::Failed, &[error.to_string()]).await;
    }

    async fn record_status(&self, status: JobStatus, errors: &[String]) {
        if let Err(e) = crate::status::record_job_status(self.catalogue.as_ref(), &self.config.job.name, status, errors).await {
            tracing::warn!(job = %self.config.job.name, error = %e, "Unable to record job status");
        }
    }
}
