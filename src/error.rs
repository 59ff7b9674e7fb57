//! Error types for NsDiscovery.
//!
//! This module defines the error hierarchy using `thiserror`. Every variant
//! records the source location it was raised from so that log lines emitted
//! by the worker pool point straight at the failing call.
//!
//! # Error Categories
//!
//! - **Fatal**: the source checkout cannot be obtained, or the catalogue is
//!   unreachable. These abort the run before any namespace is processed.
//! - **Per-unit**: parse failures and single catalogue calls. These are
//!   recorded against one namespace and the batch carries on.
//! - **Config errors**: invalid configuration files or values
//!
//! # Example
//!
//! ```rust
//! use nsdiscovery::error::{DiscoveryError, Result};
//!
//! fn read_config(path: &str) -> Result<String> {
//!     std::fs::read_to_string(path)
//!         .map_err(|e| DiscoveryError::io(path, e, file!(), line!()))
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// Macro to create errors with automatic source location tracking.
///
/// Fields may use the struct shorthand when a local of the same name exists.
///
/// Usage:
/// ```ignore
/// return Err(err!(ConfigMissing { key: "catalogue.url".to_string() }));
/// return Err(err!(Alert { message }));
/// ```
#[macro_export]
macro_rules! err {
    ($variant:ident { $($field:ident $(: $value:expr)?),* $(,)? }) => {
        $crate::error::DiscoveryError::$variant {
            $($field $(: $value)?,)*
            src_path: file!(),
            src_line: line!(),
        }
    };
}

/// A specialized Result type for NsDiscovery operations.
pub type Result<T> = std::result::Result<T, DiscoveryError>;

/// The main error type for NsDiscovery.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    // =========================================================================
    // I/O and File System Errors
    // =========================================================================
    /// I/O error with path context.
    #[error("I/O error at '{path}' ({src_path}:{src_line}): {source}")]
    Io {
        /// The path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    /// Directory not found.
    #[error("Directory not found: {path} ({src_path}:{src_line})")]
    DirectoryNotFound {
        /// The missing directory path
        path: PathBuf,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    // =========================================================================
    // Terraform Parsing Errors
    // =========================================================================
    /// HCL parsing error.
    #[error("Failed to parse HCL in '{file}' \n\t({src_path}:{src_line}): {message}")]
    HclParse {
        /// The file being parsed
        file: PathBuf,
        /// Error message
        message: String,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    /// The module parser failed for a whole resource directory.
    #[error("Parser failed for '{dir}' ({src_path}:{src_line}): {message}")]
    Parser {
        /// Directory handed to the parser
        dir: PathBuf,
        /// Error message
        message: String,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    // =========================================================================
    // Source Checkout Errors
    // =========================================================================
    /// Git operation error.
    #[error("Git error ({src_path}:{src_line}): {message}")]
    Git {
        /// Error message
        message: String,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    /// Git clone error.
    #[error("Failed to clone repository '{url}' ({src_path}:{src_line}): {message}")]
    GitClone {
        /// The repository URL
        url: String,
        /// Error message
        message: String,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    /// The source checkout could not be obtained or refreshed.
    #[error("Source checkout unavailable at '{path}' ({src_path}:{src_line}): {message}")]
    Checkout {
        /// Working copy location
        path: PathBuf,
        /// Error message
        message: String,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Configuration parsing error.
    #[error("Failed to parse configuration ({src_path}:{src_line}): {message}")]
    ConfigParse {
        /// Error message
        message: String,
        /// The underlying error (if any)
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    /// Invalid configuration value.
    #[error("Invalid configuration value for '{key}' ({src_path}:{src_line}): {message}")]
    ConfigValue {
        /// The configuration key
        key: String,
        /// Error message
        message: String,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    /// Missing required configuration.
    #[error("Missing required configuration: {key} ({src_path}:{src_line})")]
    ConfigMissing {
        /// The missing configuration key
        key: String,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    // =========================================================================
    // Catalogue Errors
    // =========================================================================
    /// A single catalogue call failed.
    #[error("Catalogue {operation} on '{collection}' failed ({src_path}:{src_line}): {message}")]
    Catalogue {
        /// The operation that failed (get, create, update, delete)
        operation: &'static str,
        /// The collection addressed
        collection: String,
        /// Error message
        message: String,
        /// HTTP status code (if available)
        status_code: Option<u16>,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    /// The catalogue cannot be reached at all.
    #[error("Catalogue unavailable at '{url}' ({src_path}:{src_line}): {message}")]
    CatalogueUnavailable {
        /// Catalogue base URL
        url: String,
        /// Error message
        message: String,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    // =========================================================================
    // Notification Errors
    // =========================================================================
    /// Operator alert could not be delivered.
    #[error("Failed to send alert ({src_path}:{src_line}): {message}")]
    Alert {
        /// Error message
        message: String,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    // =========================================================================
    // Generic Errors
    // =========================================================================
    /// A unit of work exceeded its time budget.
    #[error("Timed out after {seconds}s ({src_path}:{src_line}): {message}")]
    Timeout {
        /// Error message
        message: String,
        /// Budget that was exceeded
        seconds: u64,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    /// Internal error (should not happen in normal operation).
    #[error("Internal error ({src_path}:{src_line}): {message}")]
    Internal {
        /// Error message
        message: String,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    /// Multiple errors occurred.
    #[error("Multiple errors occurred ({count} total)")]
    Multiple {
        /// Number of errors
        count: usize,
        /// The individual errors
        errors: Vec<DiscoveryError>,
    },
}

impl DiscoveryError {
    /// Creates an `Io` error.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error, src_path: &'static str, src_line: u32) -> Self {
        Self::Io { path: path.into(), source, src_path, src_line }
    }

    /// Creates a `Git` error.
    #[must_use]
    pub fn git(message: String, src_path: &'static str, src_line: u32) -> Self {
        Self::Git { message, src_path, src_line }
    }

    /// Creates a `ConfigParse` error.
    #[must_use]
    pub fn config_parse(message: String, source: Option<Box<dyn std::error::Error + Send + Sync>>, src_path: &'static str, src_line: u32) -> Self {
        Self::ConfigParse { message, source, src_path, src_line }
    }

    /// Creates an `Internal` error.
    #[must_use]
    pub fn internal(message: String, src_path: &'static str, src_line: u32) -> Self {
        Self::Internal { message, src_path, src_line }
    }

    /// Determines if the error only affects one unit of work, so the batch
    /// should carry on with the remaining namespaces.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Io { .. }
            | Self::HclParse { .. }
            | Self::Parser { .. }
            | Self::Catalogue { .. }
            | Self::Alert { .. }
            | Self::Timeout { .. } => true,
            Self::Multiple { errors, .. } => errors.iter().all(Self::is_recoverable),
            _ => false,
        }
    }

    /// Returns the appropriate exit code for the error.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Io { source, .. } if source.kind() == std::io::ErrorKind::PermissionDenied => 13,
            Self::DirectoryNotFound { .. } => 15,
            Self::GitClone { .. } | Self::Git { .. } | Self::Checkout { .. } => 17,
            Self::ConfigParse { .. } => 18,
            Self::ConfigValue { .. } => 19,
            Self::ConfigMissing { .. } => 20,
            Self::Multiple { .. } => 21,
            Self::CatalogueUnavailable { .. } | Self::Catalogue { .. } => 22,
            _ => 1,
        }
    }

    /// Consolidates multiple errors into a single `DiscoveryError::Multiple` if there's more than one.
    /// Otherwise, returns the single error or `Ok(())` if no errors.
    pub fn collect(mut errors: Vec<Self>) -> Result<()> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            count => Err(Self::Multiple { count, errors }),
        }
    }
}

/// Extension trait for `Result` to add context to errors.
pub trait ResultExt<T, E> {
    /// Adds a file path context to an I/O error.
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;

    /// Converts a general error into a `Git` error with context.
    fn to_git_error(self, message: String) -> Result<T>;

    /// Converts a general error into a `ConfigParse` error with context.
    fn to_config_parse_error(self, message: String) -> Result<T>;
}

impl<T, E> ResultExt<T, E> for std::result::Result<T, E>
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| DiscoveryError::Io {
            path: path.into(),
            source: *e
                .into()
                .downcast::<std::io::Error>()
                .unwrap_or_else(|e| Box::new(std::io::Error::other(e))),
            src_path: file!(),
            src_line: line!(),
        })
    }

    fn to_git_error(self, message: String) -> Result<T> {
        self.map_err(|e| DiscoveryError::git(format!("{message}: {}", e.into()), file!(), line!()))
    }

    fn to_config_parse_error(self, message: String) -> Result<T> {
        self.map_err(|e| DiscoveryError::config_parse(message, Some(e.into()), file!(), line!()))
    }
}

impl From<std::io::Error> for DiscoveryError {
    fn from(source: std::io::Error) -> Self {
        // Prefer DiscoveryError::io(path, ..) where the path is known
        Self::Io {
            path: PathBuf::new(),
            source,
            src_path: file!(),
            src_line: line!(),
        }
    }
}

impl From<serde_json::Error> for DiscoveryError {
    fn from(source: serde_json::Error) -> Self {
        Self::Internal {
            message: format!("JSON serialization/deserialization error: {source}"),
            src_path: file!(),
            src_line: line!(),
        }
    }
}

/// A utility for collecting errors across a run.
///
/// The rendered messages feed the `error_details` of the job status record.
#[derive(Debug, Default)]
pub struct ErrorCollector {
    errors: Vec<DiscoveryError>,
}

impl ErrorCollector {
    /// Create a new error collector.
    #[must_use]
    pub fn new() -> Self {
        Self { errors: Vec::new() }
    }

    /// Add an error to the collection.
    pub fn add(&mut self, error: DiscoveryError) {
        self.errors.push(error);
    }

    /// Get the number of collected errors.
    #[must_use]
    pub fn count(&self) -> usize {
        self.errors.len()
    }

    /// Check if there are any errors.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Render every collected error as a display string.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.errors.iter().map(ToString::to_string).collect()
    }

    /// Convert to a Result, returning Multiple error if there are any errors.
    pub fn into_result(self) -> Result<()> {
        DiscoveryError::collect(self.errors)
    }
}
