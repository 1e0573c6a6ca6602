//! Per-plugin outcomes and the run report.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

/// Why a plugin was not installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    /// Disabled in the manifest
    Disabled,
    /// Installed version is current
    UpToDate,
    /// Installed, but the latest version could not be determined
    LatestUnknown,
    /// The run was cancelled before this plugin started
    Cancelled,
}

impl SkipReason {
    /// Kebab-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::UpToDate => "up-to-date",
            Self::LatestUnknown => "latest-unknown",
            Self::Cancelled => "cancelled",
        }
    }
}

/// What happened to a plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "action", content = "reason", rename_all = "kebab-case")]
pub enum Action {
    /// Nothing was done
    Skipped(SkipReason),
    /// First install
    Installed,
    /// Replaced an older install
    Upgraded,
    /// Probing or installing failed
    Failed,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skipped(reason) => write!(f, "skipped ({})", reason.as_str()),
            Self::Installed => f.write_str("installed"),
            Self::Upgraded => f.write_str("upgraded"),
            Self::Failed => f.write_str("failed"),
        }
    }
}

/// Result of processing one plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallOutcome {
    /// Plugin name
    pub name: String,
    /// Phase name
    pub phase: String,
    /// What happened
    #[serde(flatten)]
    pub action: Action,
    /// Rendered root cause, for failures and degraded skips
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Version found on disk after processing
    pub installed_version: Option<String>,
    /// Latest version offered by the source
    pub latest_version: Option<String>,
    /// Wall time spent on this plugin
    pub duration_ms: u64,
}

impl InstallOutcome {
    /// Create an outcome with no versions or error.
    #[must_use]
    pub fn new(name: impl Into<String>, phase: impl Into<String>, action: Action) -> Self {
        Self {
            name: name.into(),
            phase: phase.into(),
            action,
            error: None,
            installed_version: None,
            latest_version: None,
            duration_ms: 0,
        }
    }

    /// Attach versions.
    #[must_use]
    pub fn with_versions(mut self, installed: Option<String>, latest: Option<String>) -> Self {
        self.installed_version = installed;
        self.latest_version = latest;
        self
    }

    /// Attach an error message.
    #[must_use]
    pub fn with_error(mut self, error: impl fmt::Display) -> Self {
        self.error = Some(error.to_string());
        self
    }

    /// Whether the plugin failed.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.action == Action::Failed
    }

    /// Whether the plugin was installed or upgraded in this run.
    #[must_use]
    pub fn is_change(&self) -> bool {
        matches!(self.action, Action::Installed | Action::Upgraded)
    }
}

/// A located, usable plugin command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstalledTool {
    /// Directory containing the command
    pub directory: PathBuf,
    /// Full command path
    pub command: PathBuf,
    /// Version reported by the probe
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Where a run is in its lifecycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "kebab-case")]
pub enum RunState {
    /// Nothing has happened yet
    #[default]
    NotStarted,
    /// Probing plugins of the phase at this index
    ProbingPhase(usize),
    /// Acquiring and installing this plugin
    Installing(String),
    /// The phase at this index finished
    PhaseComplete(usize),
    /// Every phase ran
    RunComplete,
    /// A mandatory plugin failed
    RunAborted,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => f.write_str("not-started"),
            Self::ProbingPhase(i) => write!(f, "probing-phase({i})"),
            Self::Installing(name) => write!(f, "installing({name})"),
            Self::PhaseComplete(i) => write!(f, "phase-complete({i})"),
            Self::RunComplete => f.write_str("run-complete"),
            Self::RunAborted => f.write_str("run-aborted"),
        }
    }
}

/// Counts of each action in a report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    /// First installs
    pub installed: usize,
    /// Upgrades
    pub upgraded: usize,
    /// Skips of any reason
    pub skipped: usize,
    /// Failures
    pub failed: usize,
}

/// Everything a run produced.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    /// Correlation id
    pub run_id: Uuid,
    /// Final state
    pub state: RunState,
    /// Outcomes in declared order
    pub outcomes: Vec<InstallOutcome>,
    /// Located commands by plugin name
    pub installed: BTreeMap<String, InstalledTool>,
}

impl RunReport {
    /// Empty report for a run.
    #[must_use]
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            ..Self::default()
        }
    }

    /// Located commands by plugin name.
    #[must_use]
    pub fn installed(&self) -> &BTreeMap<String, InstalledTool> {
        &self.installed
    }

    /// Plugin name → install directory.
    #[must_use]
    pub fn install_roots(&self) -> BTreeMap<String, PathBuf> {
        self.installed
            .iter()
            .map(|(name, tool)| (name.clone(), tool.directory.clone()))
            .collect()
    }

    /// Outcome for a plugin, if it was processed.
    #[must_use]
    pub fn outcome(&self, name: &str) -> Option<&InstallOutcome> {
        self.outcomes.iter().find(|o| o.name == name)
    }

    /// Failed plugins and plugins whose latest version was unknown.
    pub fn warnings(&self) -> impl Iterator<Item = &InstallOutcome> {
        self.outcomes.iter().filter(|o| {
            o.is_failed() || o.action == Action::Skipped(SkipReason::LatestUnknown)
        })
    }

    /// Count outcomes by action.
    #[must_use]
    pub fn summary(&self) -> Summary {
        self.outcomes
            .iter()
            .fold(Summary::default(), |mut summary, outcome| {
                match outcome.action {
                    Action::Installed => summary.installed += 1,
                    Action::Upgraded => summary.upgraded += 1,
                    Action::Skipped(_) => summary.skipped += 1,
                    Action::Failed => summary.failed += 1,
                }
                summary
            })
    }
}
