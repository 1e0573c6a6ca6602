//! Settings for the plugin engine.
//!
//! Settings are read from a TOML file. Every field has a default so an empty
//! file (or no file at all) is valid:
//!
//! ```toml
//! [paths]
//! plugins_root = "/opt/media-app/plugins"
//!
//! [network]
//! metadata_timeout_secs = 30
//! download_timeout_secs = 600
//! retries = 2
//! backoff_ms = 1000
//!
//! [process]
//! probe_timeout_secs = 30
//! install_timeout_secs = 900
//!
//! [engine]
//! max_parallel = 1
//! ```
//!
//! Resolution order for the plugins root:
//! 1. `PLUGSTRAP_PLUGINS_ROOT` environment variable
//! 2. `paths.plugins_root` from the settings file
//! 3. Platform local data directory + `/plugstrap/plugins`

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::paths::InstallRoot;
use crate::retry::RetryPolicy;
use crate::{Error, Result};

/// Environment variable overriding the plugins root.
pub const PLUGINS_ROOT_ENV: &str = "PLUGSTRAP_PLUGINS_ROOT";

/// Environment variable pointing at a settings file.
pub const CONFIG_ENV: &str = "PLUGSTRAP_CONFIG";

/// Top-level settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Install-root locations.
    pub paths: PathSettings,
    /// HTTP behaviour.
    pub network: NetworkSettings,
    /// Child-process behaviour.
    pub process: ProcessSettings,
    /// Orchestration knobs.
    pub engine: EngineSettings,
}

/// Install-root locations. Unset downloads/temp directories live under the root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathSettings {
    /// Root under which every plugin is installed.
    pub plugins_root: Option<PathBuf>,
    /// Where release assets are downloaded.
    pub plugins_downloads: Option<PathBuf>,
    /// Reserved scratch directory, excluded from local probes.
    pub plugins_temp: Option<PathBuf>,
}

/// HTTP timeouts and retry policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NetworkSettings {
    /// Timeout for release listings and version pages.
    pub metadata_timeout_secs: u64,
    /// Timeout for asset downloads.
    pub download_timeout_secs: u64,
    /// Retries after the first attempt.
    pub retries: u32,
    /// Linear backoff step between attempts.
    pub backoff_ms: u64,
    /// User agent sent with every request.
    pub user_agent: String,
    /// Base URL of the GitHub REST API.
    pub github_api_url: String,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            metadata_timeout_secs: 30,
            download_timeout_secs: 600,
            retries: 2,
            backoff_ms: 1000,
            user_agent: format!("plugstrap/{}", env!("CARGO_PKG_VERSION")),
            github_api_url: "https://api.github.com".to_string(),
        }
    }
}

/// Child-process timeouts and local search depth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessSettings {
    /// Timeout for `--version` style probes.
    pub probe_timeout_secs: u64,
    /// Timeout for silent installers and archivers.
    pub install_timeout_secs: u64,
    /// How deep below the root to look for commands.
    pub search_depth: usize,
}

impl Default for ProcessSettings {
    fn default() -> Self {
        Self {
            probe_timeout_secs: 30,
            install_timeout_secs: 900,
            search_depth: 4,
        }
    }
}

/// Orchestration knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineSettings {
    /// Concurrent work units inside one phase.
    pub max_parallel: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self { max_parallel: 1 }
    }
}

impl Settings {
    /// Parse settings from TOML text.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the text is not valid settings TOML or
    /// a value is out of range.
    pub fn from_toml(text: &str) -> Result<Self> {
        let settings: Self = toml::from_str(text)
            .map_err(|e| Error::configuration(format!("invalid settings: {e}")))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::io(e, Some(path), "read settings file"))?;
        Self::from_toml(&text)
    }

    /// Load settings from an explicit path, `PLUGSTRAP_CONFIG`, or defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a named settings file cannot be read or parsed.
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        if let Ok(path) = std::env::var(CONFIG_ENV)
            && !path.is_empty()
        {
            return Self::load(Path::new(&path));
        }
        Ok(Self::default())
    }

    fn validate(&self) -> Result<()> {
        if self.engine.max_parallel == 0 {
            return Err(Error::configuration("engine.max_parallel must be at least 1"));
        }
        if self.network.metadata_timeout_secs == 0 || self.network.download_timeout_secs == 0 {
            return Err(Error::configuration("network timeouts must be positive"));
        }
        if self.process.probe_timeout_secs == 0 || self.process.install_timeout_secs == 0 {
            return Err(Error::configuration("process timeouts must be positive"));
        }
        Ok(())
    }

    /// Resolve the plugins root.
    ///
    /// # Errors
    ///
    /// Returns an error if no root is configured and the platform data
    /// directory cannot be determined.
    pub fn plugins_root(&self) -> Result<PathBuf> {
        if let Ok(dir) = std::env::var(PLUGINS_ROOT_ENV)
            && !dir.is_empty()
        {
            return Ok(PathBuf::from(dir));
        }
        if let Some(root) = &self.paths.plugins_root {
            return Ok(root.clone());
        }
        let base = dirs::data_local_dir()
            .ok_or_else(|| Error::configuration("Could not determine local data directory"))?;
        Ok(base.join("plugstrap").join("plugins"))
    }

    /// Build the install root from these settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the plugins root cannot be resolved.
    pub fn install_root(&self) -> Result<InstallRoot> {
        Ok(self.install_root_at(self.plugins_root()?))
    }

    /// Build an install root at an explicit directory, keeping the configured
    /// downloads and scratch locations.
    #[must_use]
    pub fn install_root_at(&self, dir: impl Into<PathBuf>) -> InstallRoot {
        let mut root = InstallRoot::new(dir);
        if let Some(downloads) = &self.paths.plugins_downloads {
            root = root.with_downloads_dir(downloads.clone());
        }
        if let Some(temp) = &self.paths.plugins_temp {
            root = root.with_temp_dir(temp.clone());
        }
        root
    }

    /// Retry policy for network operations.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::linear(
            self.network.retries,
            Duration::from_millis(self.network.backoff_ms),
        )
    }

    /// Timeout for local version probes.
    #[must_use]
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.process.probe_timeout_secs)
    }

    /// Timeout for installers and archivers.
    #[must_use]
    pub fn install_timeout(&self) -> Duration {
        Duration::from_secs(self.process.install_timeout_secs)
    }
}
