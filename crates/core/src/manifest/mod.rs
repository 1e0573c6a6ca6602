//! Declarative plugin manifest.
//!
//! A manifest is an ordered list of phases, each an ordered list of plugin
//! specs:
//!
//! ```toml
//! [[phase]]
//! name = "essentials"
//!
//! [[phase.plugin]]
//! name = "7zip"
//! mandatory = true
//! source = "direct-url"
//! base_uri = "https://www.7-zip.org/a/7z{version_compact}-x64.exe"
//! version_probe_url = "https://www.7-zip.org/download.html"
//! version_pattern = 'Download 7-Zip (?<version>\d+\.\d+)'
//! command_file_name = "7z.exe"
//! ```
//!
//! Validation happens before any network or process work and rejects the
//! whole manifest on the first problem.

mod pattern;

pub use pattern::{AssetPattern, REGEX_PREFIX};

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::strategy::{InstallConfig, ProbeConfig};
use crate::{Error, Result};

/// Where a plugin's releases come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PluginSource {
    /// Release listing of a hosted repository (`owner/name`).
    Repository,
    /// A download URL plus a page scraped for the current version.
    DirectUrl,
}

impl PluginSource {
    /// Name used in logs and listings.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Repository => "repository",
            Self::DirectUrl => "direct-url",
        }
    }
}

impl std::fmt::Display for PluginSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declarative definition of one plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PluginSpec {
    /// Unique key within its phase
    pub name: String,

    /// A failed first install aborts the run
    #[serde(default)]
    pub mandatory: bool,

    /// Disabled plugins are reported as skipped and never probed
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Acquisition source
    pub source: PluginSource,

    /// `owner/name` of the repository (repository sources)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository_id: Option<String>,

    /// Glob or `regex:` pattern selecting the release asset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_pattern: Option<String>,

    /// Download URL template (direct-url sources)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_uri: Option<String>,

    /// Page scraped for the current version (direct-url sources)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_probe_url: Option<String>,

    /// Regex extracting the version from the probe page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_pattern: Option<String>,

    /// Subdirectory holding the executable, relative to the tool directory
    #[serde(default)]
    pub command_relative_path: String,

    /// Executable whose presence and version identify the install
    pub command_file_name: String,

    /// Advisory only; the engine never modifies PATH
    #[serde(default)]
    pub register_to_path: bool,

    /// Consider prerelease builds when listing releases
    #[serde(default)]
    pub include_prereleases: bool,

    /// Plugins from earlier phases that must be installed first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requires: Vec<String>,

    /// Override for the built-in version probe
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe: Option<ProbeConfig>,

    /// Override for the built-in install method
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install: Option<InstallConfig>,
}

fn default_true() -> bool {
    true
}

impl PluginSpec {
    /// Minimal repository-sourced spec. Mostly useful for tests and defaults.
    #[must_use]
    pub fn repository(
        name: impl Into<String>,
        repository_id: impl Into<String>,
        asset_pattern: impl Into<String>,
        command_file_name: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            mandatory: false,
            enabled: true,
            source: PluginSource::Repository,
            repository_id: Some(repository_id.into()),
            asset_pattern: Some(asset_pattern.into()),
            base_uri: None,
            version_probe_url: None,
            version_pattern: None,
            command_relative_path: String::new(),
            command_file_name: command_file_name.into(),
            register_to_path: false,
            include_prereleases: false,
            requires: Vec::new(),
            probe: None,
            install: None,
        }
    }

    /// Minimal direct-url spec.
    #[must_use]
    pub fn direct_url(
        name: impl Into<String>,
        base_uri: impl Into<String>,
        version_probe_url: impl Into<String>,
        command_file_name: impl Into<String>,
    ) -> Self {
        Self {
            source: PluginSource::DirectUrl,
            repository_id: None,
            asset_pattern: None,
            base_uri: Some(base_uri.into()),
            version_probe_url: Some(version_probe_url.into()),
            ..Self::repository(name, "", "", command_file_name)
        }
    }

    /// Check the field-level rules for this spec.
    ///
    /// # Errors
    ///
    /// Returns a manifest validation error naming this plugin.
    pub fn validate(&self) -> Result<()> {
        let fail = |message: &str| Err(Error::manifest(&self.name, message));

        if self.name.trim().is_empty() {
            return Err(Error::manifest_general("plugin name must not be empty"));
        }
        if self.command_file_name.trim().is_empty() {
            return fail("command_file_name must not be empty");
        }
        if Path::new(&self.command_file_name).components().count() != 1 {
            return fail("command_file_name must be a bare file name");
        }

        match self.source {
            PluginSource::Repository => {
                let repo = self.repository_id.as_deref().unwrap_or_default().trim();
                if repo.is_empty() {
                    return fail("repository sources need a repository_id");
                }
                let mut parts = repo.split('/');
                let valid = matches!(
                    (parts.next(), parts.next(), parts.next()),
                    (Some(owner), Some(name), None) if !owner.is_empty() && !name.is_empty()
                );
                if !valid {
                    return fail("repository_id must look like 'owner/name'");
                }
                if self.asset_pattern.as_deref().unwrap_or_default().trim().is_empty() {
                    return fail("repository sources need an asset_pattern");
                }
            }
            PluginSource::DirectUrl => {
                let base = self.base_uri.as_deref().unwrap_or_default().trim();
                if base.is_empty() {
                    return fail("direct-url sources need a base_uri");
                }
                if base.contains('{') && self.version_probe_url.is_none() {
                    return fail("a templated base_uri needs a version_probe_url");
                }
            }
        }

        if let Some(pattern) = &self.asset_pattern
            && !pattern.trim().is_empty()
        {
            AssetPattern::parse(pattern).map_err(|e| Error::manifest(&self.name, e))?;
        }
        if let Some(pattern) = &self.version_pattern {
            Regex::new(pattern).map_err(|e| {
                Error::manifest(&self.name, format!("invalid version_pattern: {e}"))
            })?;
        }
        if self.requires.iter().any(|r| r == &self.name) {
            return fail("a plugin cannot require itself");
        }
        Ok(())
    }
}

/// An ordered group of plugins sharing an install-order boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Phase {
    /// Phase name, e.g. "essentials"
    pub name: String,

    /// Plugins in install order
    #[serde(default, rename = "plugin")]
    pub plugins: Vec<PluginSpec>,
}

impl Phase {
    /// Create a phase.
    #[must_use]
    pub fn new(name: impl Into<String>, plugins: Vec<PluginSpec>) -> Self {
        Self {
            name: name.into(),
            plugins,
        }
    }
}

/// The full, ordered plugin manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    /// Phases in execution order
    #[serde(default, rename = "phase")]
    pub phases: Vec<Phase>,
}

impl Manifest {
    /// Create a manifest from phases.
    #[must_use]
    pub fn new(phases: Vec<Phase>) -> Self {
        Self { phases }
    }

    /// Parse and validate a manifest from TOML text.
    ///
    /// # Errors
    ///
    /// Returns a manifest validation error for malformed TOML or any rule
    /// violation.
    pub fn from_toml(text: &str) -> Result<Self> {
        let manifest: Self = toml::from_str(text)
            .map_err(|e| Error::manifest_general(format!("could not parse manifest: {e}")))?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Load and validate a manifest file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or fails validation.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::io(e, Some(path), "read manifest"))?;
        Self::from_toml(&text)
    }

    /// Validate every phase and plugin.
    ///
    /// # Errors
    ///
    /// Returns the first violation found.
    pub fn validate(&self) -> Result<()> {
        let mut earlier: HashSet<&str> = HashSet::new();

        for phase in &self.phases {
            if phase.name.trim().is_empty() {
                return Err(Error::manifest_general("phase name must not be empty"));
            }

            let mut in_phase: HashSet<&str> = HashSet::new();
            for spec in &phase.plugins {
                spec.validate()?;
                if !in_phase.insert(spec.name.as_str()) {
                    return Err(Error::manifest(
                        &spec.name,
                        format!("declared twice in phase '{}'", phase.name),
                    ));
                }
                for required in &spec.requires {
                    if !earlier.contains(required.as_str()) {
                        return Err(Error::manifest(
                            &spec.name,
                            format!("requires '{required}', which is not declared in an earlier phase"),
                        ));
                    }
                }
            }
            earlier.extend(in_phase);
        }
        Ok(())
    }

    /// Iterate over `(phase, spec)` pairs in declared order.
    pub fn plugins(&self) -> impl Iterator<Item = (&Phase, &PluginSpec)> {
        self.phases
            .iter()
            .flat_map(|phase| phase.plugins.iter().map(move |spec| (phase, spec)))
    }

    /// Keep only the named plugins (and their phases' order).
    ///
    /// Unknown names are ignored; empty phases are dropped.
    #[must_use]
    pub fn retain_plugins(mut self, names: &[String]) -> Self {
        for phase in &mut self.phases {
            phase.plugins.retain(|spec| names.contains(&spec.name));
        }
        self.phases.retain(|phase| !phase.plugins.is_empty());
        self
    }
}
