//! Error types for plugstrap.
//!
//! Only [`Error::ManifestValidation`], [`Error::Configuration`] and
//! [`Error::FatalPlugin`] are meant to escape the orchestrator. Every other
//! variant is caught at the plugin boundary and recorded as a failed
//! [`InstallOutcome`](crate::outcome::InstallOutcome).

use miette::Diagnostic;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::outcome::RunReport;

/// Main error type for plugstrap operations
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// The plugin manifest is malformed or inconsistent
    #[error("Invalid manifest{}: {message}", .plugin.as_deref().map(|p| format!(" (plugin '{p}')")).unwrap_or_default())]
    #[diagnostic(
        code(plugstrap::manifest::invalid),
        help("Fix the manifest entry and run again; nothing was downloaded")
    )]
    ManifestValidation {
        /// Offending plugin, when the problem is specific to one entry
        plugin: Option<String>,
        /// What is wrong
        message: String,
    },

    /// Settings could not be loaded or are invalid
    #[error("Configuration error: {message}")]
    #[diagnostic(code(plugstrap::config::invalid))]
    Configuration {
        /// The error message describing the configuration issue
        message: String,
    },

    /// HTTP transport failure or non-success status
    #[error("Network request to {url} failed: {message}")]
    #[diagnostic(code(plugstrap::network))]
    Network {
        /// Requested URL
        url: String,
        /// Failure description
        message: String,
        /// HTTP status, when a response was received
        status: Option<u16>,
    },

    /// An executable could not be spawned
    #[error("Failed to launch {program}: {message}")]
    #[diagnostic(code(plugstrap::process::launch))]
    ProcessLaunch {
        /// Program that failed to start
        program: String,
        /// Failure description
        message: String,
    },

    /// An archive is corrupt or in an unsupported format
    #[error("Failed to extract {}: {message}", .archive.display())]
    #[diagnostic(code(plugstrap::archive::extract))]
    Extraction {
        /// Archive path
        archive: PathBuf,
        /// Failure description
        message: String,
    },

    /// An install mechanic failed (installer exit code, missing archiver, ...)
    #[error("Installing '{plugin}' failed: {message}")]
    #[diagnostic(code(plugstrap::install))]
    Install {
        /// Plugin being installed
        plugin: String,
        /// Failure description
        message: String,
    },

    /// The latest version could not be determined from the declared source
    #[error("Could not resolve the latest version of '{plugin}': {message}")]
    #[diagnostic(code(plugstrap::version::resolution))]
    VersionResolution {
        /// Plugin being resolved
        plugin: String,
        /// Failure description
        message: String,
    },

    /// Timeout error
    #[error("Operation timed out after {seconds} seconds")]
    #[diagnostic(code(plugstrap::timeout))]
    Timeout {
        /// The number of seconds before the timeout occurred
        seconds: u64,
    },

    /// I/O error with path context
    #[error("I/O error during {operation}: {source}")]
    #[diagnostic(code(plugstrap::io))]
    Io {
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
        /// The path where the I/O error occurred, if applicable
        path: Option<Box<Path>>,
        /// Description of the operation that failed
        operation: String,
    },

    /// A mandatory plugin has no installed version and could not be installed
    #[error("Mandatory plugin '{plugin}' is not installed and could not be installed: {cause}")]
    #[diagnostic(
        code(plugstrap::plugin::fatal),
        help("Later phases depend on this plugin; the run was aborted")
    )]
    FatalPlugin {
        /// Offending plugin
        plugin: String,
        /// Root cause, rendered
        cause: String,
        /// Outcomes gathered before the run aborted
        report: Box<RunReport>,
    },
}

impl Error {
    /// Create a manifest validation error for a specific plugin
    #[must_use]
    pub fn manifest(plugin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ManifestValidation {
            plugin: Some(plugin.into()),
            message: message.into(),
        }
    }

    /// Create a manifest validation error not tied to one plugin
    #[must_use]
    pub fn manifest_general(message: impl Into<String>) -> Self {
        Self::ManifestValidation {
            plugin: None,
            message: message.into(),
        }
    }

    /// Create a configuration error with a message
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a network error without an HTTP status
    #[must_use]
    pub fn network(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Network {
            url: url.into(),
            message: message.into(),
            status: None,
        }
    }

    /// Create a network error for a non-success HTTP status
    #[must_use]
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::Network {
            url: url.into(),
            message: format!("HTTP {status}"),
            status: Some(status),
        }
    }

    /// Create a process launch error
    #[must_use]
    pub fn process_launch(program: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ProcessLaunch {
            program: program.into(),
            message: message.into(),
        }
    }

    /// Create an extraction error
    #[must_use]
    pub fn extraction(archive: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Extraction {
            archive: archive.into(),
            message: message.into(),
        }
    }

    /// Create an install error
    #[must_use]
    pub fn install(plugin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Install {
            plugin: plugin.into(),
            message: message.into(),
        }
    }

    /// Create a version resolution error
    #[must_use]
    pub fn version_resolution(plugin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::VersionResolution {
            plugin: plugin.into(),
            message: message.into(),
        }
    }

    /// Create an I/O error with context
    #[must_use]
    pub fn io(source: std::io::Error, path: Option<&Path>, operation: impl Into<String>) -> Self {
        Self::Io {
            source,
            path: path.map(|p| p.to_path_buf().into_boxed_path()),
            operation: operation.into(),
        }
    }

    /// Whether a retry might succeed.
    ///
    /// Network failures and timeouts are transient; 4xx responses other than
    /// 408 and 429 are not.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network { status, .. } => match status {
                Some(code) => *code >= 500 || *code == 408 || *code == 429,
                None => true,
            },
            Self::Timeout { .. } => true,
            _ => false,
        }
    }

    /// Whether this error aborts the whole run.
    #[must_use]
    pub fn is_run_aborting(&self) -> bool {
        matches!(
            self,
            Self::ManifestValidation { .. } | Self::Configuration { .. } | Self::FatalPlugin { .. }
        )
    }
}

impl From<std::io::Error> for Error {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            source,
            path: None,
            operation: "file operation".to_string(),
        }
    }
}

/// Result type for plugstrap operations
pub type Result<T> = std::result::Result<T, Error>;
