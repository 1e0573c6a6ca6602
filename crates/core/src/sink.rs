//! Per-plugin log messages.
//!
//! The orchestrator reports progress through a [`LogSink`] so hosts can route
//! plugin messages to their own console or log store. [`TracingSink`] is the
//! default and forwards everything to `tracing`.

use std::fmt;

use crate::Error;

/// Severity of a plugin message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogLevel {
    /// Progress
    Info,
    /// A plugin finished successfully
    Success,
    /// Something degraded but the run continues
    Warning,
    /// A plugin failed
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Info => "info",
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Error => "error",
        })
    }
}

/// Destination for plugin messages.
pub trait LogSink: Send + Sync {
    /// Record a message. `context` is usually the plugin name.
    fn log(&self, level: LogLevel, context: &str, message: &str, error: Option<&Error>);
}

/// Forwards plugin messages to `tracing` under the `plugstrap::plugin` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, level: LogLevel, context: &str, message: &str, error: Option<&Error>) {
        let error = error.map(ToString::to_string);
        match level {
            LogLevel::Info | LogLevel::Success => {
                tracing::info!(target: "plugstrap::plugin", %level, context, error = error.as_deref(), "{message}");
            }
            LogLevel::Warning => {
                tracing::warn!(target: "plugstrap::plugin", %level, context, error = error.as_deref(), "{message}");
            }
            LogLevel::Error => {
                tracing::error!(target: "plugstrap::plugin", %level, context, error = error.as_deref(), "{message}");
            }
        }
    }
}
