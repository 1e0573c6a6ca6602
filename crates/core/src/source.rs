//! Release sources.
//!
//! A [`ReleaseSource`] answers one question for a plugin: what is the latest
//! release and where can its asset be downloaded? There is one implementation
//! per [`PluginSource`] variant, collected in a [`SourceRegistry`].

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::Result;
use crate::manifest::PluginSource;
use crate::strategy::PluginPlan;

/// The newest release offered by a source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteRelease {
    /// Version used for comparison
    pub version: String,
    /// Release tag or label as published
    pub tag: String,
    /// File name of the selected asset
    pub asset_name: String,
    /// Where to download the asset
    pub download_url: String,
    /// Published SHA-256 of the asset, when the source provides one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

/// Resolves the latest release of a plugin.
#[async_trait]
pub trait ReleaseSource: Send + Sync {
    /// Source name (e.g., "github", "url").
    fn name(&self) -> &'static str;

    /// Check if this source serves the given manifest source kind.
    fn can_handle(&self, source: PluginSource) -> bool;

    /// Determine the latest release for a plugin.
    ///
    /// Implementations make a single attempt; the caller owns retries.
    ///
    /// # Errors
    ///
    /// Returns a network error when the source is unreachable and a version
    /// resolution error when no matching release or version exists.
    async fn latest(&self, plugin: &PluginPlan) -> Result<RemoteRelease>;
}

/// Registry of release sources.
#[derive(Default, Clone)]
pub struct SourceRegistry {
    sources: HashMap<&'static str, Arc<dyn ReleaseSource>>,
}

impl SourceRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source, replacing any with the same name.
    pub fn register<S: ReleaseSource + 'static>(&mut self, source: S) {
        self.register_arc(Arc::new(source));
    }

    /// Register a shared source.
    pub fn register_arc(&mut self, source: Arc<dyn ReleaseSource>) {
        self.sources.insert(source.name(), source);
    }

    /// Get a source by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn ReleaseSource>> {
        self.sources.get(name)
    }

    /// Find the source serving a manifest source kind.
    #[must_use]
    pub fn find_for_source(&self, source: PluginSource) -> Option<&Arc<dyn ReleaseSource>> {
        self.sources.values().find(|s| s.can_handle(source))
    }

    /// Registered source names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.sources.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Number of registered sources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Whether no source is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl std::fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceRegistry")
            .field("sources", &self.names())
            .finish()
    }
}

/// Host operating system, as used in download URL templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Os {
    /// Windows
    Windows,
    /// macOS
    Darwin,
    /// Linux and anything else
    Linux,
}

impl Os {
    /// Get the current OS.
    #[must_use]
    pub const fn current() -> Self {
        if cfg!(target_os = "windows") {
            Self::Windows
        } else if cfg!(target_os = "macos") {
            Self::Darwin
        } else {
            Self::Linux
        }
    }
}

impl std::fmt::Display for Os {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Windows => "windows",
            Self::Darwin => "darwin",
            Self::Linux => "linux",
        })
    }
}

/// Host CPU architecture, as used in download URL templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    /// 64-bit ARM
    Arm64,
    /// 64-bit x86
    X64,
}

impl Arch {
    /// Get the current architecture.
    #[must_use]
    pub const fn current() -> Self {
        if cfg!(target_arch = "aarch64") {
            Self::Arm64
        } else {
            Self::X64
        }
    }
}

impl std::fmt::Display for Arch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Arm64 => "arm64",
            Self::X64 => "x64",
        })
    }
}
