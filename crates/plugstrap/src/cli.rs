use clap::{Args, Parser, Subcommand};
use miette::{Diagnostic, Report};
use serde::Serialize;
use std::io::{self, Write};
use std::path::PathBuf;
use thiserror::Error;

use crate::tracing::{LogLevel, TracingFormat};

/// Exit codes for the CLI application
pub const EXIT_OK: i32 = 0;
/// CLI, configuration or manifest error exit code
pub const EXIT_CLI: i32 = 2;
/// Fatal plugin or unexpected error exit code
pub const EXIT_FATAL: i32 = 3;

/// CLI-specific error types with proper exit code mapping
#[derive(Error, Debug, Clone, Diagnostic)]
pub enum CliError {
    /// Configuration or manifest error (exit code 2)
    #[error("Configuration error: {message}")]
    #[diagnostic(code(plugstrap::cli::config))]
    Config {
        /// The error message
        message: String,
        /// Optional help text
        #[help]
        help: Option<String>,
    },
    /// A mandatory plugin could not be provisioned (exit code 3)
    #[error("Mandatory plugin '{plugin}' failed: {message}")]
    #[diagnostic(code(plugstrap::cli::fatal))]
    Fatal {
        /// Offending plugin
        plugin: String,
        /// Root cause
        message: String,
        /// Optional help text
        #[help]
        help: Option<String>,
    },
    /// Other unexpected error (exit code 3)
    #[error("Unexpected error: {message}")]
    #[diagnostic(code(plugstrap::cli::other))]
    Other {
        /// The error message
        message: String,
        /// Optional help text
        #[help]
        help: Option<String>,
    },
}

impl CliError {
    /// Create a new configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: None,
        }
    }

    /// Create a new configuration error with help text
    #[must_use]
    pub fn config_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    /// Create a fatal plugin error
    #[must_use]
    pub fn fatal(plugin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Fatal {
            plugin: plugin.into(),
            message: message.into(),
            help: Some("Later phases depend on this plugin; fix it and run sync again".into()),
        }
    }

    /// Create a new other error
    #[must_use]
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
            help: None,
        }
    }

    /// Create a new other error with help text
    #[must_use]
    pub fn other_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
            help: Some(help.into()),
        }
    }
}

/// Convert `plugstrap_core::Error` to the matching `CliError` variant.
///
/// - Manifest and settings problems -> Config (exit code 2)
/// - A failed mandatory plugin -> Fatal (exit code 3)
/// - Anything else -> Other (exit code 3)
impl From<plugstrap_core::Error> for CliError {
    fn from(err: plugstrap_core::Error) -> Self {
        match err {
            plugstrap_core::Error::Configuration { message } => Self::config(message),
            plugstrap_core::Error::ManifestValidation { .. } => Self::config_with_help(
                err.to_string(),
                "Fix the manifest entry and run again; nothing was downloaded",
            ),
            plugstrap_core::Error::FatalPlugin { plugin, cause, .. } => Self::fatal(plugin, cause),
            plugstrap_core::Error::Io {
                source,
                path,
                operation,
            } => {
                let path_str = path
                    .as_ref()
                    .map_or(String::new(), |p| format!(" on {}", p.display()));
                Self::other_with_help(
                    format!("I/O {operation} failed{path_str}: {source}"),
                    "Check file permissions and ensure the path exists",
                )
            }
            other => Self::other(other.to_string()),
        }
    }
}

/// Map CLI error to appropriate exit code
#[must_use]
pub const fn exit_code_for(err: &CliError) -> i32 {
    match err {
        CliError::Config { .. } => EXIT_CLI,
        CliError::Fatal { .. } | CliError::Other { .. } => EXIT_FATAL,
    }
}

/// Render error appropriately based on JSON flag
pub fn render_error(err: &CliError, json_mode: bool) {
    if json_mode {
        let mut body = serde_json::json!({
            "code": match err {
                CliError::Config { .. } => "config",
                CliError::Fatal { .. } => "fatal",
                CliError::Other { .. } => "other",
            },
            "message": err.to_string(),
        });
        if let CliError::Fatal { plugin, .. } = err {
            body["plugin"] = serde_json::Value::String(plugin.clone());
        }

        match serde_json::to_string(&ErrorEnvelope::new(body)) {
            Ok(json) => println!("{json}"),
            Err(_) => eprintln!("Error serializing error response"),
        }
    } else {
        let report = Report::new(err.clone());
        eprintln!("{report:?}");
        let _ = io::stderr().flush();
    }
}

/// Success response envelope for JSON output
#[derive(Debug, Clone, Serialize)]
pub struct OkEnvelope<T> {
    /// Status indicator - always "ok" for success
    pub status: &'static str,
    /// The actual data payload
    pub data: T,
}

impl<T> OkEnvelope<T> {
    /// Create a new success envelope
    #[must_use]
    pub const fn new(data: T) -> Self {
        Self { status: "ok", data }
    }

    /// Envelope for a run that stopped early; the data is partial
    #[must_use]
    pub const fn aborted(data: T) -> Self {
        Self {
            status: "aborted",
            data,
        }
    }
}

/// Error response envelope for JSON output
#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelope<E> {
    /// Status indicator - always "error" for failures
    pub status: &'static str,
    /// The error details
    pub error: E,
}

impl<E> ErrorEnvelope<E> {
    /// Create a new error envelope
    #[must_use]
    pub const fn new(error: E) -> Self {
        Self {
            status: "error",
            error,
        }
    }
}

/// Provision third-party command-line tools into a local plugins root.
#[derive(Parser, Debug)]
#[command(name = "plugstrap")]
#[command(about = "Resolve, download and install the plugins a manifest declares")]
#[command(long_about = None)]
#[command(version)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Where settings, manifest and plugins live.
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Logging verbosity level.
    #[arg(
        long = "log-level",
        global = true,
        help = "Set logging level",
        default_value = "warn",
        value_enum
    )]
    pub level: LogLevel,

    /// Log output format.
    #[arg(
        long = "log-format",
        global = true,
        help = "Set log output format",
        default_value = "pretty",
        value_enum
    )]
    pub log_format: TracingFormat,
}

impl Cli {
    /// Whether the selected subcommand asked for JSON output.
    #[must_use]
    pub const fn json_mode(&self) -> bool {
        match &self.command {
            Commands::Sync { json, .. } | Commands::Check { json } | Commands::Roots { json } => {
                *json
            }
            Commands::List => false,
        }
    }
}

/// Locations shared by every subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Settings file (defaults to `PLUGSTRAP_CONFIG`, then built-in defaults).
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Plugin manifest (defaults to the built-in manifest).
    #[arg(long, global = true, value_name = "FILE")]
    pub manifest: Option<PathBuf>,

    /// Plugins root, overriding settings and `PLUGSTRAP_PLUGINS_ROOT`.
    #[arg(long, global = true, value_name = "DIR")]
    pub root: Option<PathBuf>,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Install missing and outdated plugins.
    #[command(about = "Install missing and outdated plugins")]
    Sync {
        /// Reinstall up-to-date plugins and treat unknown latest versions as failures.
        #[arg(long)]
        force_refresh: bool,

        /// Only process these plugins (plus what they require).
        #[arg(long, value_name = "NAME", num_args = 1..)]
        only: Vec<String>,

        /// Plugins processed concurrently inside a phase.
        #[arg(long, value_name = "N")]
        parallel: Option<usize>,

        /// Print the run report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Compare installed and latest versions without installing.
    #[command(about = "Compare installed and latest versions without installing")]
    Check {
        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show the manifest with resolved strategies.
    #[command(about = "Show phases, plugins and their probe/install strategies")]
    List,

    /// Show where each installed plugin lives.
    #[command(about = "Show the install directory of each installed plugin")]
    Roots {
        /// Print the roots as JSON.
        #[arg(long)]
        json: bool,
    },
}
