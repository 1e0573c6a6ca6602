//! Acquisition and install pipeline.
//!
//! Downloads the selected asset into the downloads directory, then runs the
//! plan's [`InstallMethod`]. Every mechanic writes into a fresh or overwritten
//! directory, so running it over a correct install is harmless.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, instrument};

use crate::capabilities::Services;
use crate::outcome::InstalledTool;
use crate::paths::InstallRoot;
use crate::retry::RetryPolicy;
use crate::source::RemoteRelease;
use crate::strategy::{InstallMethod, PluginPlan};
use crate::{Error, Result};

/// Suffixes removed from an asset name to get its install directory name.
/// Longer suffixes come first.
const ASSET_SUFFIXES: [&str; 9] = [
    ".tar.gz", ".tar.xz", ".7z.exe", ".tgz", ".tar", ".zip", ".7z", ".exe", ".msi",
];

/// Directory name for an extracted asset: `tool-2.0.0-x64.zip` → `tool-2.0.0-x64`.
#[must_use]
pub fn asset_base_name(asset_name: &str) -> &str {
    ASSET_SUFFIXES
        .iter()
        .find_map(|suffix| {
            let cut = asset_name.len().checked_sub(suffix.len())?;
            (cut > 0
                && asset_name.is_char_boundary(cut)
                && asset_name[cut..].eq_ignore_ascii_case(suffix))
            .then(|| &asset_name[..cut])
        })
        .unwrap_or(asset_name)
}

/// Replace `{dest}` and `{file}` in installer arguments.
fn expand_args(args: &[String], dest: &Path, file: &Path) -> Vec<String> {
    let dest = dest.display().to_string();
    let file = file.display().to_string();
    args.iter()
        .map(|arg| arg.replace("{dest}", &dest).replace("{file}", &file))
        .collect()
}

/// Downloads and installs plugin releases.
#[derive(Debug, Clone)]
pub struct Installer {
    services: Services,
    root: InstallRoot,
    retry: RetryPolicy,
    install_timeout: Duration,
}

impl Installer {
    /// Create an installer with default retry and timeout.
    #[must_use]
    pub fn new(services: Services, root: InstallRoot) -> Self {
        Self {
            services,
            root,
            retry: RetryPolicy::default(),
            install_timeout: Duration::from_secs(900),
        }
    }

    /// Set the retry policy for downloads.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the timeout for installers and archivers.
    #[must_use]
    pub fn with_install_timeout(mut self, timeout: Duration) -> Self {
        self.install_timeout = timeout;
        self
    }

    /// Download `release` and install it. Returns the directory written.
    ///
    /// `installed` supplies archiver commands from earlier phases; PATH is
    /// never consulted.
    ///
    /// # Errors
    ///
    /// Returns the download, checksum, extraction or installer error.
    #[instrument(skip_all, fields(plugin = plugin.name(), version = %release.version))]
    pub async fn install(
        &self,
        plugin: &PluginPlan,
        release: &RemoteRelease,
        installed: &BTreeMap<String, InstalledTool>,
    ) -> Result<PathBuf> {
        let file = self.download(plugin, release).await?;

        match &plugin.install {
            InstallMethod::SilentInstaller { args } => {
                let dest = self.root.plugin_dir(plugin.name());
                self.services.fs.remove_dir_all(&dest)?;
                self.services.fs.create_dir_all(self.root.root())?;
                let args = expand_args(args, &dest, &file);
                self.run_checked(plugin, &file, &args).await?;
                Ok(dest)
            }
            InstallMethod::SelfExtracting { archiver, args } => {
                let tool = installed.get(archiver).ok_or_else(|| {
                    Error::install(
                        plugin.name(),
                        format!("archiver '{archiver}' is not installed"),
                    )
                })?;
                let dest = self.root.root().join(asset_base_name(&release.asset_name));
                self.services.fs.remove_dir_all(&dest)?;
                self.services.fs.create_dir_all(&dest)?;
                let args = expand_args(args, &dest, &file);
                self.run_checked(plugin, &tool.command, &args).await?;
                Ok(dest)
            }
            InstallMethod::Archive => {
                let dest = self.root.root().join(asset_base_name(&release.asset_name));
                self.services.fs.extract_archive(&file, &dest, true)?;
                Ok(dest)
            }
        }
    }

    async fn download(&self, plugin: &PluginPlan, release: &RemoteRelease) -> Result<PathBuf> {
        let downloads = self.root.downloads_dir();
        self.services.fs.create_dir_all(downloads)?;
        let file = downloads.join(&release.asset_name);

        let what = format!("download of {}", release.asset_name);
        let download = self
            .retry
            .run(&what, || self.services.http.download(&release.download_url, &file))
            .await?;
        info!(
            asset = %release.asset_name,
            bytes = download.bytes,
            sha256 = %download.sha256,
            "Downloaded release asset"
        );

        if let Some(expected) = &release.sha256 {
            let expected = expected.strip_prefix("sha256:").unwrap_or(expected);
            if !expected.eq_ignore_ascii_case(&download.sha256) {
                return Err(Error::install(
                    plugin.name(),
                    format!(
                        "checksum mismatch for {}: expected {expected}, got {}",
                        release.asset_name, download.sha256
                    ),
                ));
            }
        }
        Ok(file)
    }

    async fn run_checked(&self, plugin: &PluginPlan, program: &Path, args: &[String]) -> Result<()> {
        debug!(program = %program.display(), ?args, "Running installer");
        let output = self
            .services
            .process
            .run(program, args, self.install_timeout)
            .await?;
        if output.success() {
            return Ok(());
        }
        let code = output
            .exit_code
            .map_or_else(|| "a signal".to_string(), |c| format!("exit code {c}"));
        let detail = output.stderr.trim();
        let message = if detail.is_empty() {
            format!("{} terminated with {code}", program.display())
        } else {
            format!("{} terminated with {code}: {detail}", program.display())
        };
        Err(Error::install(plugin.name(), message))
    }
}
