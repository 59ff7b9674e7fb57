//! Configuration module for NsDiscovery.
//!
//! This module handles loading and validating configuration from:
//! - YAML configuration files (`nsdiscovery.yaml`)
//! - Environment variables (the names used by the deployed job)
//! - CLI arguments
//!
//! # Configuration File Format
//!
//! ```yaml
//! # nsdiscovery.yaml
//!
//! discovery:
//!   checkout_dir: /tmp/cp_envs
//!   namespace_domain: live.cloud-platform.service.justice.gov.uk
//!   max_workers: 10
//!   sweep: true
//!
//! catalogue:
//!   url: ${SERVICE_CATALOGUE_API_ENDPOINT}  # Environment variable expansion
//!   api_key: ${SERVICE_CATALOGUE_API_KEY}
//!
//! git:
//!   repository: https://github.com/ministryofjustice/cloud-platform-environments.git
//!   pull: true
//!
//! alerts:
//!   alert_channel: "#discovery-alerts"
//!
//! job:
//!   name: hmpps-terraform-discovery
//! ```

use crate::error::{DiscoveryError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Default configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "nsdiscovery.yaml";

static ENV_VAR_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("Invalid regex"));

/// Discovery options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryOptions {
    /// Local working copy of the environments repository.
    pub checkout_dir: PathBuf,

    /// Cluster domain directory under `namespaces/`.
    pub namespace_domain: String,

    /// Maximum number of components processed at once.
    pub max_workers: usize,

    /// Fail a component that runs longer than this many seconds.
    pub unit_timeout_secs: Option<u64>,

    /// Delete catalogue namespaces with no directory in the checkout.
    pub sweep: bool,

    /// File name patterns the parser ignores (glob patterns).
    pub exclude_patterns: Vec<String>,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            checkout_dir: PathBuf::from("/tmp/cp_envs"),
            namespace_domain: "live.cloud-platform.service.justice.gov.uk".to_string(),
            max_workers: 10,
            unit_timeout_secs: None,
            sweep: true,
            exclude_patterns: Vec::new(),
        }
    }
}

/// Catalogue connection options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogueOptions {
    /// Base URL of the catalogue API.
    pub url: Option<String>,

    /// Bearer token.
    pub api_key: Option<String>,

    /// Extra query appended when listing components (e.g. `&filters[name][$contains]=visits`).
    pub filter: Option<String>,

    /// Records requested per page.
    pub page_size: u32,

    /// Per-request timeout in seconds.
    pub timeout_secs: u64,

    /// Retries for 5xx and 429 responses.
    pub max_retries: usize,
}

impl Default for CatalogueOptions {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            filter: None,
            page_size: 100,
            timeout_secs: 30,
            max_retries: 3,
        }
    }
}

/// Git options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitOptions {
    /// Repository holding the namespace environments.
    pub repository: String,

    /// Git branch to checkout.
    pub branch: Option<String>,

    /// GitHub token for private HTTPS clones.
    pub github_token: Option<String>,

    /// Refresh an existing working copy before the run.
    pub pull: bool,
}

impl Default for GitOptions {
    fn default() -> Self {
        Self {
            repository: "https://github.com/ministryofjustice/cloud-platform-environments.git".to_string(),
            branch: None,
            github_token: None,
            pull: true,
        }
    }
}

/// Alert options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertOptions {
    /// Slack bot token; alerts are only logged without one.
    pub slack_token: Option<String>,

    /// Channel for informational messages.
    pub notify_channel: String,

    /// Channel for failure alerts.
    pub alert_channel: String,
}

/// Scheduled job options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobOptions {
    /// Name of the `scheduled-jobs` record updated after each run.
    pub name: String,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            name: "hmpps-terraform-discovery".to_string(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub discovery: DiscoveryOptions,
    pub catalogue: CatalogueOptions,
    pub git: GitOptions,
    pub alerts: AlertOptions,
    pub job: JobOptions,

    /// Log filter used when neither `RUST_LOG` nor `-v` is given.
    pub log_level: Option<String>,
}

impl Config {
    /// Load configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn from_yaml(content: &str) -> Result<Self> {
        tracing::debug!("Parsing configuration from YAML");
        let expanded = expand_env_vars(content);

        let config: Self = serde_yaml::from_str(&expanded)
            .map_err(|e| DiscoveryError::config_parse(e.to_string(), Some(Box::new(e)), file!(), line!()))?;

        tracing::debug!(
            checkout_dir = %config.discovery.checkout_dir.display(),
            max_workers = config.discovery.max_workers,
            "Configuration loaded successfully"
        );
        Ok(config)
    }

    /// Load configuration from a file, or from `nsdiscovery.yaml` in the
    /// working directory when present, then apply environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicitly named file cannot be read, or any
    /// file found is invalid.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|e| DiscoveryError::io(path, e, file!(), line!()))?;
                Self::from_yaml(&content)?
            }
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                let content = std::fs::read_to_string(DEFAULT_CONFIG_FILE)
                    .map_err(|e| DiscoveryError::io(DEFAULT_CONFIG_FILE, e, file!(), line!()))?;
                Self::from_yaml(&content)?
            }
            None => Self::default(),
        };

        config.load_from_env();
        Ok(config)
    }

    /// Apply overrides from the process environment.
    pub fn load_from_env(&mut self) {
        self.apply_env(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an environment lookup.
    ///
    /// Empty values are ignored. Unparseable numbers are logged and ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(url) = get("SERVICE_CATALOGUE_API_ENDPOINT") {
            self.catalogue.url = Some(url);
        }
        if let Some(key) = get("SERVICE_CATALOGUE_API_KEY") {
            self.catalogue.api_key = Some(key);
        }
        if let Some(filter) = get("SC_FILTER") {
            self.catalogue.filter = Some(filter);
        }
        if let Some(token) = get("SLACK_BOT_TOKEN") {
            self.alerts.slack_token = Some(token);
        }
        if let Some(channel) = get("SLACK_NOTIFY_CHANNEL") {
            self.alerts.notify_channel = channel;
        }
        if let Some(channel) = get("SLACK_ALERT_CHANNEL") {
            self.alerts.alert_channel = channel;
        }
        if let Some(dir) = get("TEMP_DIR") {
            self.discovery.checkout_dir = PathBuf::from(dir);
        }
        if let Some(level) = get("LOG_LEVEL") {
            self.log_level = Some(level.to_lowercase());
        }
        if self.git.github_token.is_none() {
            if let Some(token) = get("GITHUB_TOKEN") {
                tracing::debug!("Loaded GitHub token from GITHUB_TOKEN environment variable");
                self.git.github_token = Some(token);
            }
        }
        if let Some(raw) = get("MAX_THREADS") {
            match raw.trim().parse::<usize>() {
                Ok(n) => self.discovery.max_workers = n,
                Err(e) => tracing::warn!(value = %raw, error = %e, "Ignoring invalid MAX_THREADS"),
            }
        }
    }

    /// Check the configuration for values the run cannot work with.
    ///
    /// # Errors
    ///
    /// Returns the first invalid value found.
    pub fn validate(&self) -> Result<()> {
        if self.discovery.max_workers == 0 {
            return Err(crate::err!(ConfigValue {
                key: "discovery.max_workers".to_string(),
                message: "must be at least 1".to_string(),
            }));
        }
        if self.discovery.namespace_domain.trim().is_empty() {
            return Err(crate::err!(ConfigValue {
                key: "discovery.namespace_domain".to_string(),
                message: "must not be empty".to_string(),
            }));
        }
        if self.catalogue.page_size == 0 {
            return Err(crate::err!(ConfigValue {
                key: "catalogue.page_size".to_string(),
                message: "must be at least 1".to_string(),
            }));
        }
        if let Some(url) = &self.catalogue.url {
            if ENV_VAR_PATTERN.is_match(url) {
                return Err(crate::err!(ConfigValue {
                    key: "catalogue.url".to_string(),
                    message: format!("unresolved environment variable in '{url}'"),
                }));
            }
            url::Url::parse(url).map_err(|e| {
                crate::err!(ConfigValue {
                    key: "catalogue.url".to_string(),
                    message: e.to_string(),
                })
            })?;
        }
        for pattern in &self.discovery.exclude_patterns {
            glob::Pattern::new(pattern).map_err(|e| {
                crate::err!(ConfigValue {
                    key: "discovery.exclude_patterns".to_string(),
                    message: format!("'{pattern}': {e}"),
                })
            })?;
        }
        Ok(())
    }

    /// Generate an example YAML configuration.
    #[must_use]
    pub fn example_yaml() -> String {
        r#"# NsDiscovery Configuration File

# Namespace discovery
discovery:
  # Working copy of the environments repository (TEMP_DIR)
  checkout_dir: /tmp/cp_envs
  # Directory under namespaces/ holding one directory per namespace
  namespace_domain: live.cloud-platform.service.justice.gov.uk
  # Components processed at once (MAX_THREADS)
  max_workers: 10
  # Fail a component after this many seconds (omit for no limit)
  # unit_timeout_secs: 300
  # Delete catalogue namespaces that no longer exist in the checkout
  sweep: true
  # File name patterns to ignore when parsing
  exclude_patterns: []

# Service catalogue
catalogue:
  url: ${SERVICE_CATALOGUE_API_ENDPOINT}
  api_key: ${SERVICE_CATALOGUE_API_KEY}
  # Extra query when listing components (SC_FILTER)
  # filter: "&filters[name][$contains]=visits"
  page_size: 100
  timeout_secs: 30
  max_retries: 3

# Source checkout
git:
  repository: https://github.com/ministryofjustice/cloud-platform-environments.git
  # branch: main
  # github_token: ${GITHUB_TOKEN}
  pull: true

# Operator alerts (SLACK_BOT_TOKEN, SLACK_ALERT_CHANNEL, SLACK_NOTIFY_CHANNEL)
alerts:
  notify_channel: ""
  alert_channel: ""

# Scheduled job record updated after each run
job:
  name: hmpps-terraform-discovery
"#
        .to_string()
    }
}

/// Expand `${VAR}` references; unknown variables are left as written.
fn expand_env_vars(content: &str) -> String {
    ENV_VAR_PATTERN
        .replace_all(content, |caps: &regex::Captures<'_>| {
            std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
        })
        .into_owned()
}
