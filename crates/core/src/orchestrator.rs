//! Phase-by-phase plugin orchestration.
//!
//! Phases run strictly in order. Inside a phase, plugins are processed in
//! declared order, optionally `max_parallel` at a time; outcomes always keep
//! the declared order. Each plugin goes through:
//!
//! 1. disabled → skipped;
//! 2. run cancelled → skipped;
//! 3. a requirement missing from the installed-tool map → failed;
//! 4. local probe, then remote probe;
//! 5. remote failure → skipped (latest unknown) when installed, else failed;
//! 6. up to date → skipped;
//! 7. download and install, then probe locally again.
//!
//! A mandatory plugin that fails with nothing installed aborts the run.

use futures::StreamExt;
use futures::stream;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info, info_span};

use crate::capabilities::Services;
use crate::config::Settings;
use crate::install::Installer;
use crate::outcome::{Action, InstallOutcome, InstalledTool, RunReport, RunState, SkipReason};
use crate::paths::InstallRoot;
use crate::resolver::{DEFAULT_SEARCH_DEPTH, LocalInstall, Resolver};
use crate::retry::RetryPolicy;
use crate::sink::{LogLevel, LogSink, TracingSink};
use crate::source::SourceRegistry;
use crate::strategy::{PluginPlan, Plan};
use crate::version::ResolvedVersion;
use crate::{Error, Result};

/// Knobs for a run.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Reinstall even when up to date, and fail when the latest version is unknown
    pub force_refresh: bool,
    /// Plugins processed concurrently within a phase
    pub max_parallel: usize,
    /// Retry policy for remote probes and downloads
    pub retry: RetryPolicy,
    /// Timeout for version probes
    pub probe_timeout: Duration,
    /// Timeout for installers and archivers
    pub install_timeout: Duration,
    /// Directory depth searched for commands
    pub search_depth: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            force_refresh: false,
            max_parallel: 1,
            retry: RetryPolicy::default(),
            probe_timeout: Duration::from_secs(30),
            install_timeout: Duration::from_secs(900),
            search_depth: DEFAULT_SEARCH_DEPTH,
        }
    }
}

impl EngineOptions {
    /// Options taken from loaded settings.
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            force_refresh: false,
            max_parallel: settings.engine.max_parallel,
            retry: settings.retry_policy(),
            probe_timeout: settings.probe_timeout(),
            install_timeout: settings.install_timeout(),
            search_depth: settings.process.search_depth,
        }
    }
}

/// Installed versus latest version of one plugin, without installing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionReport {
    /// Plugin name
    pub name: String,
    /// Phase name
    pub phase: String,
    /// Version found on disk
    pub installed: Option<String>,
    /// Latest version offered by the source
    pub latest: Option<String>,
    /// Whether the installed version is current
    pub up_to_date: bool,
    /// Why the latest version is unknown
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of processing one plugin inside a phase.
struct Processed {
    outcome: InstallOutcome,
    tool: Option<InstalledTool>,
    /// Set when a mandatory plugin failed with nothing installed
    fatal: Option<String>,
}

/// Drives manifest plans against an install root.
pub struct Orchestrator {
    root: InstallRoot,
    services: Services,
    resolver: Resolver,
    installer: Installer,
    options: EngineOptions,
    sink: Arc<dyn LogSink>,
    cancel: CancellationToken,
}

impl Orchestrator {
    /// Create an orchestrator with default options.
    #[must_use]
    pub fn new(root: InstallRoot, services: Services, sources: SourceRegistry) -> Self {
        Self {
            resolver: Resolver::new(services.clone(), root.clone(), sources),
            installer: Installer::new(services.clone(), root.clone()),
            root,
            services,
            options: EngineOptions::default(),
            sink: Arc::new(TracingSink),
            cancel: CancellationToken::new(),
        }
    }

    /// Replace the run options.
    #[must_use]
    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.resolver = self
            .resolver
            .with_retry(options.retry)
            .with_probe_timeout(options.probe_timeout)
            .with_search_depth(options.search_depth);
        self.installer = self
            .installer
            .with_retry(options.retry)
            .with_install_timeout(options.install_timeout);
        self.options = options;
        self
    }

    /// Route plugin messages to `sink`.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Use an externally owned cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that cancels the run; plugins not yet started are skipped.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Install root the orchestrator works in.
    #[must_use]
    pub fn root(&self) -> &InstallRoot {
        &self.root
    }

    /// Run every phase of `plan`.
    ///
    /// Per-plugin failures are recorded as outcomes; the run only fails when
    /// a mandatory plugin cannot be installed or the install root cannot be
    /// created.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FatalPlugin`] carrying the partial report, or a
    /// configuration error for an unusable install root.
    pub async fn resolve_plugins(&self, plan: &Plan) -> Result<RunReport> {
        let run_id = self.services.clock.run_id();
        let span = info_span!("resolve_plugins", %run_id);
        self.run(plan, run_id).instrument(span).await
    }

    async fn run(&self, plan: &Plan, run_id: uuid::Uuid) -> Result<RunReport> {
        let mut report = RunReport::new(run_id);
        info!(
            started_at = %self.services.clock.now(),
            root = %self.root.root().display(),
            plugins = plan.len(),
            "Starting plugin run"
        );

        self.services.fs.create_dir_all(self.root.root()).map_err(|e| {
            Error::configuration(format!(
                "install root {} cannot be created: {e}",
                self.root.root().display()
            ))
        })?;

        let abort = self.cancel.child_token();
        let width = self.options.max_parallel.max(1);

        for (index, phase) in plan.phases.iter().enumerate() {
            transition(&mut report, RunState::ProbingPhase(index));
            let installed = report.installed.clone();

            let mut results = stream::iter(phase.plugins.iter())
                .map(|plugin| self.process(plugin, &installed, &abort))
                .buffered(width);

            let mut fatal: Option<(String, String)> = None;
            while let Some(processed) = results.next().await {
                if let Some(tool) = processed.tool {
                    report.installed.insert(processed.outcome.name.clone(), tool);
                }
                if fatal.is_none()
                    && let Some(cause) = processed.fatal
                {
                    // Plugins not yet started in this phase are skipped
                    abort.cancel();
                    fatal = Some((processed.outcome.name.clone(), cause));
                }
                report.outcomes.push(processed.outcome);
            }

            if let Some((plugin, cause)) = fatal {
                transition(&mut report, RunState::RunAborted);
                self.sink.log(
                    LogLevel::Error,
                    &plugin,
                    "mandatory plugin could not be installed; aborting",
                    None,
                );
                return Err(Error::FatalPlugin {
                    plugin,
                    cause,
                    report: Box::new(report),
                });
            }
            transition(&mut report, RunState::PhaseComplete(index));
        }

        transition(&mut report, RunState::RunComplete);
        let summary = report.summary();
        info!(
            installed = summary.installed,
            upgraded = summary.upgraded,
            skipped = summary.skipped,
            failed = summary.failed,
            "Plugin run complete"
        );
        Ok(report)
    }

    async fn process(
        &self,
        plugin: &PluginPlan,
        installed: &BTreeMap<String, InstalledTool>,
        abort: &CancellationToken,
    ) -> Processed {
        let started = Instant::now();
        let mut processed = self.decide(plugin, installed, abort).await;
        processed.outcome.duration_ms =
            u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        processed
    }

    async fn decide(
        &self,
        plugin: &PluginPlan,
        installed: &BTreeMap<String, InstalledTool>,
        abort: &CancellationToken,
    ) -> Processed {
        let name = plugin.name();
        let outcome = |action| InstallOutcome::new(name, &plugin.phase, action);

        if !plugin.spec.enabled {
            self.sink.log(LogLevel::Info, name, "disabled, skipping", None);
            return skipped(outcome(Action::Skipped(SkipReason::Disabled)), None);
        }
        if abort.is_cancelled() {
            self.sink.log(LogLevel::Warning, name, "run cancelled, skipping", None);
            return skipped(outcome(Action::Skipped(SkipReason::Cancelled)), None);
        }

        if let Some(missing) = plugin.requires.iter().find(|r| !installed.contains_key(*r)) {
            let local = self.resolver.probe_local(plugin).await;
            let err = Error::install(name, format!("dependency unavailable: '{missing}' is not installed"));
            return self.failed(plugin, local, None, &err, true);
        }

        self.sink.log(LogLevel::Info, name, "checking versions", None);
        let local = self.resolver.probe_local(plugin).await;
        let installed_version = local.as_ref().and_then(|l| l.version.clone());

        let release = match self.resolver.probe_remote(plugin).await {
            Ok(release) => release,
            Err(err) if local.is_some() && !self.options.force_refresh => {
                self.sink.log(
                    LogLevel::Warning,
                    name,
                    "latest version unknown, keeping the installed version",
                    Some(&err),
                );
                return Processed {
                    outcome: outcome(Action::Skipped(SkipReason::LatestUnknown))
                        .with_versions(installed_version, None)
                        .with_error(&err),
                    tool: local.as_ref().map(LocalInstall::to_tool),
                    fatal: None,
                };
            }
            // Not knowing the latest version fails this plugin but never the run
            Err(err) => return self.failed(plugin, local, None, &err, false),
        };

        let versions = ResolvedVersion::new(installed_version, Some(release.version.clone()));
        if versions.is_up_to_date() && !self.options.force_refresh {
            self.sink.log(LogLevel::Info, name, "up to date", None);
            return Processed {
                outcome: outcome(Action::Skipped(SkipReason::UpToDate))
                    .with_versions(versions.installed, versions.latest),
                tool: local.as_ref().map(LocalInstall::to_tool),
                fatal: None,
            };
        }

        info!(plugin = name, state = %RunState::Installing(name.to_string()), "Run state changed");
        self.sink.log(
            LogLevel::Info,
            name,
            &format!("installing {} from {}", release.version, release.asset_name),
            None,
        );
        if let Err(err) = self.installer.install(plugin, &release, installed).await {
            return self.failed(plugin, local, versions.latest, &err, true);
        }

        let Some(fresh) = self.resolver.probe_local(plugin).await else {
            let err = Error::install(
                name,
                format!(
                    "installation finished but '{}' was not found under {}",
                    plugin.spec.command_file_name,
                    self.root.root().display()
                ),
            );
            return self.failed(plugin, local, versions.latest, &err, true);
        };

        let action = if local.is_some() {
            Action::Upgraded
        } else {
            Action::Installed
        };
        self.sink.log(
            LogLevel::Success,
            name,
            &format!("{action} {}", fresh.version.as_deref().unwrap_or("(unknown version)")),
            None,
        );
        Processed {
            outcome: outcome(action).with_versions(fresh.version.clone(), versions.latest),
            tool: Some(fresh.to_tool()),
            fatal: None,
        }
    }

    fn failed(
        &self,
        plugin: &PluginPlan,
        local: Option<LocalInstall>,
        latest: Option<String>,
        err: &Error,
        may_abort: bool,
    ) -> Processed {
        let name = plugin.name();
        self.sink.log(LogLevel::Error, name, "failed", Some(err));
        let fatal =
            (may_abort && plugin.spec.mandatory && local.is_none()).then(|| err.to_string());
        Processed {
            outcome: InstallOutcome::new(name, &plugin.phase, Action::Failed)
                .with_versions(local.as_ref().and_then(|l| l.version.clone()), latest)
                .with_error(err),
            tool: local.as_ref().map(LocalInstall::to_tool),
            fatal,
        }
    }

    /// Compare installed and latest versions of every enabled plugin without
    /// installing anything.
    pub async fn check(&self, plan: &Plan) -> Vec<VersionReport> {
        let width = self.options.max_parallel.max(1);
        stream::iter(plan.plugins().filter(|p| p.spec.enabled))
            .map(|plugin| async move {
                let local = self.resolver.probe_local(plugin).await;
                let installed = local.and_then(|l| l.version);
                let (latest, error) = match self.resolver.probe_remote(plugin).await {
                    Ok(release) => (Some(release.version), None),
                    Err(err) => (None, Some(err.to_string())),
                };
                let up_to_date = ResolvedVersion::new(installed.clone(), latest.clone()).is_up_to_date();
                VersionReport {
                    name: plugin.name().to_string(),
                    phase: plugin.phase.clone(),
                    installed,
                    latest,
                    up_to_date,
                    error,
                }
            })
            .buffered(width)
            .collect()
            .await
    }

    /// Locate installed commands of every enabled plugin. Local only.
    pub async fn probe_installed(&self, plan: &Plan) -> BTreeMap<String, InstalledTool> {
        let mut installed = BTreeMap::new();
        for plugin in plan.plugins().filter(|p| p.spec.enabled) {
            if let Some(local) = self.resolver.probe_local(plugin).await {
                installed.insert(plugin.name().to_string(), local.to_tool());
            }
        }
        installed
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("root", &self.root)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

fn skipped(outcome: InstallOutcome, tool: Option<InstalledTool>) -> Processed {
    Processed {
        outcome,
        tool,
        fatal: None,
    }
}

fn transition(report: &mut RunReport, next: RunState) {
    info!(from = %report.state, to = %next, "Run state changed");
    report.state = next;
}

/// Run `plan` once with the given collaborators.
///
/// # Errors
///
/// See [`Orchestrator::resolve_plugins`].
pub async fn resolve_plugins(
    plan: &Plan,
    root: InstallRoot,
    services: Services,
    sources: SourceRegistry,
    options: EngineOptions,
) -> Result<RunReport> {
    Orchestrator::new(root, services, sources)
        .with_options(options)
        .resolve_plugins(plan)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = EngineOptions::default();
        assert_eq!(options.max_parallel, 1);
        assert!(!options.force_refresh);
        assert_eq!(options.retry.max_attempts(), 3);
        assert_eq!(options.search_depth, DEFAULT_SEARCH_DEPTH);
    }

    #[test]
    fn test_options_from_settings() {
        let settings = Settings::from_toml("[engine]\nmax_parallel = 4\n[process]\nsearch_depth = 2\n").unwrap();
        let options = EngineOptions::from_settings(&settings);
        assert_eq!(options.max_parallel, 4);
        assert_eq!(options.search_depth, 2);
    }

    #[test]
    fn test_transition_updates_state() {
        let mut report = RunReport::default();
        transition(&mut report, RunState::ProbingPhase(0));
        assert_eq!(report.state, RunState::ProbingPhase(0));
    }
}
