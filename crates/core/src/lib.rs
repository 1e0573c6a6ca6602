//! Core engine for plugstrap.
//!
//! plugstrap provisions third-party command-line tools ("plugins") into a
//! local install root. A declarative [`Manifest`] lists the plugins in
//! phases; the engine works out which are missing or outdated and installs
//! them idempotently.
//!
//! Data flows one way:
//!
//! ```text
//! Manifest ──plan──▶ Plan ──▶ Resolver (local + remote probe)
//!                                  │ drift only
//!                                  ▼
//!                              Installer ──▶ Orchestrator ──▶ RunReport
//! ```
//!
//! All outside-world access goes through the traits in [`capabilities`]
//! and release lookups go through [`ReleaseSource`] implementations.

pub mod capabilities;
pub mod config;
pub mod error;
pub mod install;
pub mod manifest;
pub mod orchestrator;
pub mod outcome;
pub mod paths;
pub mod resolver;
pub mod retry;
pub mod sink;
pub mod source;
pub mod strategy;
pub mod version;

pub use capabilities::{
    Clock, Download, Entry, EntryKind, FileSystem, HttpClient, ProcessOutput, ProcessRunner,
    Services,
};
pub use config::Settings;
pub use error::{Error, Result};
pub use manifest::{AssetPattern, Manifest, Phase, PluginSource, PluginSpec};
pub use orchestrator::{EngineOptions, Orchestrator, VersionReport, resolve_plugins};
pub use outcome::{Action, InstallOutcome, InstalledTool, RunReport, RunState, SkipReason};
pub use paths::InstallRoot;
pub use retry::RetryPolicy;
pub use sink::{LogLevel, LogSink, TracingSink};
pub use source::{ReleaseSource, RemoteRelease, SourceRegistry};
pub use strategy::{InstallMethod, Plan, PluginPlan, StrategyTable, VersionProbe};
pub use version::ResolvedVersion;
