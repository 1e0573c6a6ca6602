//! Installed and latest version detection.
//!
//! The local probe walks the install root for the plugin's command and asks
//! the plan's [`VersionProbe`] for a version; absence is never an error. The
//! remote probe asks the registered [`ReleaseSource`](crate::source::ReleaseSource)
//! under the retry policy.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, instrument};

use crate::capabilities::{Entry, EntryKind, Services};
use crate::outcome::InstalledTool;
use crate::paths::InstallRoot;
use crate::retry::RetryPolicy;
use crate::source::{RemoteRelease, SourceRegistry};
use crate::strategy::{PluginPlan, VersionProbe, capture_version};
use crate::version::compare;
use crate::{Error, Result};

/// Default directory depth searched for commands.
pub const DEFAULT_SEARCH_DEPTH: usize = 4;

/// A command located under the install root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalInstall {
    /// Full command path
    pub command: PathBuf,
    /// Probed version; `None` when the probe produced nothing usable
    pub version: Option<String>,
}

impl LocalInstall {
    /// Directory containing the command.
    #[must_use]
    pub fn directory(&self) -> PathBuf {
        self.command
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default()
    }

    /// Convert into an installed-tool record.
    #[must_use]
    pub fn to_tool(&self) -> InstalledTool {
        InstalledTool {
            directory: self.directory(),
            command: self.command.clone(),
            version: self.version.clone(),
        }
    }
}

/// Probes local and remote versions of plugins.
#[derive(Debug, Clone)]
pub struct Resolver {
    services: Services,
    root: InstallRoot,
    sources: SourceRegistry,
    retry: RetryPolicy,
    probe_timeout: Duration,
    search_depth: usize,
}

impl Resolver {
    /// Create a resolver with default retry, timeout and depth.
    #[must_use]
    pub fn new(services: Services, root: InstallRoot, sources: SourceRegistry) -> Self {
        Self {
            services,
            root,
            sources,
            retry: RetryPolicy::default(),
            probe_timeout: Duration::from_secs(30),
            search_depth: DEFAULT_SEARCH_DEPTH,
        }
    }

    /// Set the retry policy for remote probes.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the timeout for command-output probes.
    #[must_use]
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Set how deep below the root commands are searched.
    #[must_use]
    pub fn with_search_depth(mut self, depth: usize) -> Self {
        self.search_depth = depth.max(1);
        self
    }

    /// Find the installed command and its version.
    ///
    /// When several candidates exist the highest version wins.
    #[instrument(skip_all, fields(plugin = plugin.name()))]
    pub async fn probe_local(&self, plugin: &PluginPlan) -> Option<LocalInstall> {
        let candidates = match &plugin.probe {
            VersionProbe::DirectoryName { prefix, pattern } => {
                self.directory_candidates(plugin, prefix, pattern)
            }
            VersionProbe::FileMetadata | VersionProbe::CommandOutput { .. } => {
                let mut found = Vec::new();
                for command in self.find_commands(plugin, self.root.root(), self.search_depth) {
                    let version = self.probe_command(&plugin.probe, &command).await;
                    found.push(LocalInstall { command, version });
                }
                found
            }
        };

        let best = candidates.into_iter().reduce(|best, next| {
            if rank(&next, &best) == Ordering::Greater {
                next
            } else {
                best
            }
        });
        debug!(found = ?best, "Local probe finished");
        best
    }

    /// Ask the plugin's release source for its latest release.
    ///
    /// # Errors
    ///
    /// Returns the last source error once retries are exhausted, or a version
    /// resolution error when no source serves the plugin.
    #[instrument(skip_all, fields(plugin = plugin.name()))]
    pub async fn probe_remote(&self, plugin: &PluginPlan) -> Result<RemoteRelease> {
        let source = self
            .sources
            .find_for_source(plugin.spec.source)
            .ok_or_else(|| {
                Error::version_resolution(
                    plugin.name(),
                    format!("no release source registered for '{}'", plugin.spec.source),
                )
            })?;

        let what = format!("latest release of {}", plugin.name());
        let release = self.retry.run(&what, || source.latest(plugin)).await?;
        debug!(version = %release.version, asset = %release.asset_name, "Remote probe finished");
        Ok(release)
    }

    /// Command files under `dir` honoring the plugin's relative path, with
    /// the downloads and scratch directories excluded.
    fn find_commands(&self, plugin: &PluginPlan, dir: &Path, depth: usize) -> Vec<PathBuf> {
        let name = globset::escape(&plugin.spec.command_file_name);
        let entries = match self.services.fs.list_children(
            dir,
            Some(&name),
            EntryKind::File,
            depth,
        ) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(dir = %dir.display(), error = %e, "Could not list directory");
                return Vec::new();
            }
        };

        let suffix = relative_components(&plugin.spec.command_relative_path);
        entries
            .into_iter()
            .map(|Entry { path, .. }| path)
            .filter(|path| !self.root.is_bookkeeping_path(path))
            .filter(|path| parent_ends_with(path, &suffix))
            .collect()
    }

    fn directory_candidates(
        &self,
        plugin: &PluginPlan,
        prefix: &str,
        pattern: &regex::Regex,
    ) -> Vec<LocalInstall> {
        let glob = format!("{}*", globset::escape(prefix));
        let dirs = match self.services.fs.list_children(
            self.root.root(),
            Some(&glob),
            EntryKind::Directory,
            1,
        ) {
            Ok(dirs) => dirs,
            Err(e) => {
                debug!(error = %e, "Could not list install root");
                return Vec::new();
            }
        };

        dirs.into_iter()
            .filter(|entry| !self.root.is_bookkeeping_path(&entry.path))
            .filter_map(|entry| {
                // Half-extracted trees without the command do not count
                let command = self
                    .find_commands(plugin, &entry.path, self.search_depth)
                    .into_iter()
                    .next()?;
                Some(LocalInstall {
                    command,
                    version: capture_version(pattern, &entry.file_name()),
                })
            })
            .collect()
    }

    async fn probe_command(&self, probe: &VersionProbe, command: &Path) -> Option<String> {
        match probe {
            VersionProbe::FileMetadata => self.services.fs.file_version(command),
            VersionProbe::CommandOutput { args, pattern } => {
                match self
                    .services
                    .process
                    .run(command, args, self.probe_timeout)
                    .await
                {
                    Ok(output) => capture_version(pattern, &output.combined()),
                    Err(e) => {
                        debug!(command = %command.display(), error = %e, "Version probe failed");
                        None
                    }
                }
            }
            VersionProbe::DirectoryName { pattern, .. } => command
                .parent()
                .and_then(Path::file_name)
                .and_then(|name| capture_version(pattern, &name.to_string_lossy())),
        }
    }
}

/// Order candidates: any version beats none, then by version.
fn rank(a: &LocalInstall, b: &LocalInstall) -> Ordering {
    match (&a.version, &b.version) {
        (Some(x), Some(y)) => compare(x, y),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => Ordering::Equal,
    }
}

/// Split a manifest relative path on either separator.
fn relative_components(relative: &str) -> Vec<String> {
    relative
        .split(['/', '\\'])
        .filter(|part| !part.is_empty() && *part != ".")
        .map(str::to_lowercase)
        .collect()
}

/// Whether the command's parent directory ends with `suffix`, ignoring case.
fn parent_ends_with(command: &Path, suffix: &[String]) -> bool {
    let Some(parent) = command.parent() else {
        return suffix.is_empty();
    };
    let components: Vec<String> = parent
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_lowercase())
        .collect();
    components.ends_with(suffix)
}
