//! Per-plugin version probes and install mechanics.
//!
//! Every plugin gets exactly one [`VersionProbe`] and one [`InstallMethod`],
//! chosen once when the manifest is planned:
//!
//! 1. the `probe` / `install` override on the manifest entry, if any;
//! 2. the built-in entry for the plugin's (lower-cased) name;
//! 3. otherwise `directory-name` with the plugin name as prefix, plus `archive`.
//!
//! ```toml
//! [[phase.plugin]]
//! name = "mytool"
//! # ...
//! probe = { kind = "command-output", args = ["--version"] }
//! install = { kind = "self-extracting", archiver = "7zip" }
//! ```

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::manifest::{AssetPattern, Manifest, PluginSpec};
use crate::{Error, Result};

/// Fallback pattern: the first dotted number.
pub const DEFAULT_VERSION_PATTERN: &str = r"(?<version>\d+(?:\.\d+)+)";

/// Arguments passed to the archiver of a self-extracting install by default.
pub const DEFAULT_ARCHIVER_ARGS: [&str; 4] = ["x", "{file}", "-o{dest}", "-y"];

/// Version probe as written in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case", deny_unknown_fields)]
pub enum ProbeConfig {
    /// Read version metadata embedded in the command binary.
    FileMetadata,
    /// Run the command and parse its output.
    CommandOutput {
        /// Arguments, e.g. `["--version"]`
        #[serde(default)]
        args: Vec<String>,
        /// Regex applied to stdout then stderr
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pattern: Option<String>,
    },
    /// Parse the version from an install directory name.
    DirectoryName {
        /// Directory name prefix; defaults to the plugin name
        #[serde(default, skip_serializing_if = "Option::is_none")]
        prefix: Option<String>,
        /// Regex applied to the directory name
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pattern: Option<String>,
    },
}

/// Install mechanic as written in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case", deny_unknown_fields)]
pub enum InstallConfig {
    /// Run the downloaded installer unattended.
    SilentInstaller {
        /// Installer arguments; `{dest}` and `{file}` are substituted
        #[serde(default)]
        args: Vec<String>,
    },
    /// Unpack a self-extracting archive with a previously installed archiver.
    SelfExtracting {
        /// Plugin providing the archiver command
        archiver: String,
        /// Archiver arguments; defaults to `x {file} -o{dest} -y`
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        args: Vec<String>,
    },
    /// Extract a zip or tarball.
    Archive,
}

/// Probe and install configuration for one plugin identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Strategy {
    /// How to find the installed version
    pub probe: ProbeConfig,
    /// How to install a download
    pub install: InstallConfig,
}

/// Compiled version probe.
#[derive(Debug, Clone)]
pub enum VersionProbe {
    /// Binary version metadata of the located command
    FileMetadata,
    /// Output of running the located command
    CommandOutput {
        /// Arguments
        args: Vec<String>,
        /// Version extractor
        pattern: Regex,
    },
    /// Name of a directory below the install root
    DirectoryName {
        /// Case-insensitive name prefix
        prefix: String,
        /// Version extractor
        pattern: Regex,
    },
}

impl VersionProbe {
    /// Short name used in listings.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::FileMetadata => "file-metadata",
            Self::CommandOutput { .. } => "command-output",
            Self::DirectoryName { .. } => "directory-name",
        }
    }
}

/// Compiled install mechanic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallMethod {
    /// Run the download with `args`
    SilentInstaller {
        /// Installer arguments
        args: Vec<String>,
    },
    /// Run the archiver plugin's command over the download
    SelfExtracting {
        /// Plugin providing the archiver
        archiver: String,
        /// Archiver arguments
        args: Vec<String>,
    },
    /// Extract with the file system capability
    Archive,
}

impl InstallMethod {
    /// Short name used in listings.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::SilentInstaller { .. } => "silent-installer",
            Self::SelfExtracting { .. } => "self-extracting",
            Self::Archive => "archive",
        }
    }
}

/// Pull a version out of `text` with `pattern`.
///
/// Prefers the `version` group, then the first group, then the whole match.
#[must_use]
pub fn capture_version(pattern: &Regex, text: &str) -> Option<String> {
    let caps = pattern.captures(text)?;
    caps.name("version")
        .or_else(|| caps.get(1))
        .or_else(|| caps.get(0))
        .map(|m| m.as_str().trim().to_string())
        .filter(|v| !v.is_empty())
}

/// A plugin ready to be probed and installed.
#[derive(Debug, Clone)]
pub struct PluginPlan {
    /// Phase the plugin belongs to
    pub phase: String,
    /// Manifest entry
    pub spec: PluginSpec,
    /// Compiled asset pattern, if declared
    pub pattern: Option<AssetPattern>,
    /// Resolved version probe
    pub probe: VersionProbe,
    /// Resolved install mechanic
    pub install: InstallMethod,
    /// Declared requirements plus the archiver, if any
    pub requires: Vec<String>,
}

impl PluginPlan {
    /// Plugin name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.spec.name
    }
}

/// One phase of a plan.
#[derive(Debug, Clone)]
pub struct PhasePlan {
    /// Phase name
    pub name: String,
    /// Plugins in declared order
    pub plugins: Vec<PluginPlan>,
}

/// A validated manifest with every strategy resolved.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    /// Phases in execution order
    pub phases: Vec<PhasePlan>,
}

impl Plan {
    /// Iterate over all plugin plans in declared order.
    pub fn plugins(&self) -> impl Iterator<Item = &PluginPlan> {
        self.phases.iter().flat_map(|phase| phase.plugins.iter())
    }

    /// Number of plugins across all phases.
    #[must_use]
    pub fn len(&self) -> usize {
        self.phases.iter().map(|phase| phase.plugins.len()).sum()
    }

    /// Whether the plan has no plugins.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Identity → strategy map.
#[derive(Debug, Clone, Default)]
pub struct StrategyTable {
    entries: HashMap<String, Strategy>,
}

impl StrategyTable {
    /// An empty table; every plugin falls back to the default strategy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Strategies for the tool families shipped in the default manifest.
    #[must_use]
    pub fn builtin() -> Self {
        let command = |args: &[&str], pattern: &str| ProbeConfig::CommandOutput {
            args: args.iter().map(ToString::to_string).collect(),
            pattern: Some(pattern.to_string()),
        };
        let silent = || InstallConfig::SilentInstaller {
            args: vec!["/S".to_string(), "/D={dest}".to_string()],
        };

        let mut table = Self::new();
        table.insert(
            "7zip",
            Strategy {
                probe: command(&[], r"7-Zip (?:\(a\) )?(?<version>\d+\.\d+)"),
                install: silent(),
            },
        );
        table.insert(
            "git",
            Strategy {
                probe: command(&["--version"], r"git version (?<version>\d+(?:\.\d+)+)"),
                install: InstallConfig::SelfExtracting {
                    archiver: "7zip".to_string(),
                    args: Vec::new(),
                },
            },
        );
        table.insert(
            "git-lfs",
            Strategy {
                probe: command(&["version"], r"git-lfs/(?<version>\d+(?:\.\d+)+)"),
                install: InstallConfig::Archive,
            },
        );
        table.insert(
            "ffmpeg",
            Strategy {
                probe: command(&["-version"], r"ffmpeg version n?(?<version>\d+(?:\.\d+)+)"),
                install: InstallConfig::Archive,
            },
        );
        table.insert(
            "exiftool",
            Strategy {
                probe: command(&["-ver"], r"(?<version>\d+\.\d+)"),
                install: InstallConfig::Archive,
            },
        );
        table.insert(
            "postgresql",
            Strategy {
                probe: ProbeConfig::DirectoryName {
                    prefix: Some("postgresql".to_string()),
                    pattern: None,
                },
                install: InstallConfig::Archive,
            },
        );
        table.insert(
            "digikam",
            Strategy {
                probe: ProbeConfig::FileMetadata,
                install: silent(),
            },
        );
        table
    }

    /// Add or replace the strategy for a plugin identity.
    pub fn insert(&mut self, name: &str, strategy: Strategy) {
        self.entries.insert(name.to_lowercase(), strategy);
    }

    /// Look up a plugin identity.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Strategy> {
        self.entries.get(&name.to_lowercase())
    }

    /// Strategy for a spec after applying its overrides.
    #[must_use]
    pub fn strategy_for(&self, spec: &PluginSpec) -> Strategy {
        let base = self.get(&spec.name).cloned().unwrap_or_else(|| Strategy {
            probe: ProbeConfig::DirectoryName {
                prefix: None,
                pattern: None,
            },
            install: InstallConfig::Archive,
        });
        Strategy {
            probe: spec.probe.clone().unwrap_or(base.probe),
            install: spec.install.clone().unwrap_or(base.install),
        }
    }

    /// Validate a manifest and resolve every plugin's strategy.
    ///
    /// # Errors
    ///
    /// Returns a manifest validation error for any rule violation, including
    /// an archiver that is not declared in an earlier phase.
    pub fn plan(&self, manifest: &Manifest) -> Result<Plan> {
        manifest.validate()?;

        let mut earlier: HashSet<&str> = HashSet::new();
        let mut phases = Vec::with_capacity(manifest.phases.len());

        for phase in &manifest.phases {
            let mut plugins = Vec::with_capacity(phase.plugins.len());
            for spec in &phase.plugins {
                let strategy = self.strategy_for(spec);
                let probe = compile_probe(spec, &strategy.probe)?;
                let install = compile_install(&strategy.install);

                let mut requires = spec.requires.clone();
                if let InstallMethod::SelfExtracting { archiver, .. } = &install {
                    if !earlier.contains(archiver.as_str()) {
                        return Err(Error::manifest(
                            &spec.name,
                            format!("archiver '{archiver}' is not declared in an earlier phase"),
                        ));
                    }
                    if !requires.contains(archiver) {
                        requires.push(archiver.clone());
                    }
                }

                let pattern = spec
                    .asset_pattern
                    .as_deref()
                    .filter(|p| !p.trim().is_empty())
                    .map(AssetPattern::parse)
                    .transpose()
                    .map_err(|e| Error::manifest(&spec.name, e))?;

                plugins.push(PluginPlan {
                    phase: phase.name.clone(),
                    spec: spec.clone(),
                    pattern,
                    probe,
                    install,
                    requires,
                });
            }
            earlier.extend(phase.plugins.iter().map(|spec| spec.name.as_str()));
            phases.push(PhasePlan {
                name: phase.name.clone(),
                plugins,
            });
        }

        Ok(Plan { phases })
    }
}

fn compile_regex(spec: &PluginSpec, pattern: Option<&str>) -> Result<Regex> {
    let pattern = pattern.unwrap_or(DEFAULT_VERSION_PATTERN);
    Regex::new(pattern)
        .map_err(|e| Error::manifest(&spec.name, format!("invalid probe pattern: {e}")))
}

fn compile_probe(spec: &PluginSpec, config: &ProbeConfig) -> Result<VersionProbe> {
    Ok(match config {
        ProbeConfig::FileMetadata => VersionProbe::FileMetadata,
        ProbeConfig::CommandOutput { args, pattern } => VersionProbe::CommandOutput {
            args: args.clone(),
            pattern: compile_regex(spec, pattern.as_deref())?,
        },
        ProbeConfig::DirectoryName { prefix, pattern } => VersionProbe::DirectoryName {
            prefix: prefix.clone().unwrap_or_else(|| spec.name.clone()),
            pattern: compile_regex(spec, pattern.as_deref())?,
        },
    })
}

fn compile_install(config: &InstallConfig) -> InstallMethod {
    match config {
        InstallConfig::SilentInstaller { args } => InstallMethod::SilentInstaller { args: args.clone() },
        InstallConfig::SelfExtracting { archiver, args } => InstallMethod::SelfExtracting {
            archiver: archiver.clone(),
            args: if args.is_empty() {
                DEFAULT_ARCHIVER_ARGS.iter().map(ToString::to_string).collect()
            } else {
                args.clone()
            },
        },
        InstallConfig::Archive => InstallMethod::Archive,
    }
}
