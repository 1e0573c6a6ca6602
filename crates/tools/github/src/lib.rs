//! GitHub Releases release source for plugstrap.
//!
//! Resolves `repository` plugins against the GitHub REST API:
//! - Lists recent releases, newest first
//! - Skips drafts, and prereleases unless the plugin opts in
//! - Picks the first release carrying an asset that matches the plugin's
//!   asset pattern
//! - Passes through the asset's published SHA-256 digest when present

use async_trait::async_trait;
use plugstrap_core::strategy::PluginPlan;
use plugstrap_core::version::extract_dotted;
use plugstrap_core::{Error, HttpClient, PluginSource, ReleaseSource, RemoteRelease, Result};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

/// Public GitHub API.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Releases fetched per listing.
const PAGE_SIZE: u32 = 30;

/// GitHub release metadata from the API.
#[derive(Debug, Deserialize)]
struct Release {
    tag_name: String,
    #[serde(default)]
    draft: bool,
    #[serde(default)]
    prerelease: bool,
    #[serde(default)]
    assets: Vec<Asset>,
}

/// GitHub release asset.
#[derive(Debug, Deserialize)]
struct Asset {
    name: String,
    browser_download_url: String,
    /// `sha256:<hex>` on releases published since GitHub started hashing assets
    #[serde(default)]
    digest: Option<String>,
}

impl Asset {
    fn sha256(&self) -> Option<String> {
        self.digest
            .as_deref()
            .and_then(|d| d.strip_prefix("sha256:"))
            .map(str::to_ascii_lowercase)
    }
}

/// Release source for GitHub Releases.
pub struct GitHubReleaseSource {
    http: Arc<dyn HttpClient>,
    api_url: String,
}

impl std::fmt::Debug for GitHubReleaseSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubReleaseSource")
            .field("api_url", &self.api_url)
            .finish_non_exhaustive()
    }
}

impl GitHubReleaseSource {
    /// Create a source talking to `api_url` (e.g. [`DEFAULT_API_URL`]).
    #[must_use]
    pub fn new(http: Arc<dyn HttpClient>, api_url: impl Into<String>) -> Self {
        Self {
            http,
            api_url: api_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn releases_url(&self, repo: &str) -> String {
        format!("{}/repos/{}/releases?per_page={}", self.api_url, repo, PAGE_SIZE)
    }

    /// Fetch release listings from the GitHub API.
    async fn fetch_releases(&self, plugin: &str, repo: &str) -> Result<Vec<Release>> {
        let url = self.releases_url(repo);
        debug!(%url, "Fetching GitHub releases");

        let headers = [
            ("Accept".to_string(), "application/vnd.github+json".to_string()),
            ("X-GitHub-Api-Version".to_string(), "2022-11-28".to_string()),
        ];
        let body = self.http.get(&url, &headers).await?;

        serde_json::from_str(&body).map_err(|e| {
            Error::version_resolution(plugin, format!("unexpected response from {url}: {e}"))
        })
    }
}

/// Version of a release: pattern capture, then a tag with digits, then the
/// first dotted number in the asset name.
fn release_version(plugin: &PluginPlan, release: &Release, asset: &Asset) -> Option<String> {
    plugin
        .pattern
        .as_ref()
        .and_then(|p| p.version_of(&asset.name))
        .or_else(|| {
            release
                .tag_name
                .chars()
                .any(|c| c.is_ascii_digit())
                .then(|| release.tag_name.clone())
        })
        .or_else(|| extract_dotted(&asset.name))
}

#[async_trait]
impl ReleaseSource for GitHubReleaseSource {
    fn name(&self) -> &'static str {
        "github"
    }

    fn can_handle(&self, source: PluginSource) -> bool {
        source == PluginSource::Repository
    }

    async fn latest(&self, plugin: &PluginPlan) -> Result<RemoteRelease> {
        let name = plugin.name();
        let (Some(repo), Some(pattern)) = (plugin.spec.repository_id.as_deref(), &plugin.pattern)
        else {
            return Err(Error::version_resolution(
                name,
                "repository plugins need a repository id and an asset pattern",
            ));
        };

        let releases = self.fetch_releases(name, repo).await?;
        let include_prereleases = plugin.spec.include_prereleases;

        let candidate = releases
            .iter()
            .filter(|r| !r.draft && (include_prereleases || !r.prerelease))
            .find_map(|r| {
                r.assets
                    .iter()
                    .find(|a| pattern.matches(&a.name))
                    .map(|a| (r, a))
            });
        let Some((release, asset)) = candidate else {
            return Err(Error::version_resolution(
                name,
                format!(
                    "no release of {repo} has an asset matching '{}'",
                    pattern.as_str()
                ),
            ));
        };

        let version = release_version(plugin, release, asset).ok_or_else(|| {
            Error::version_resolution(
                name,
                format!("no version found in tag '{}' or asset '{}'", release.tag_name, asset.name),
            )
        })?;

        debug!(plugin = name, %version, asset = %asset.name, "Resolved GitHub release");
        Ok(RemoteRelease {
            version,
            tag: release.tag_name.clone(),
            asset_name: asset.name.clone(),
            download_url: asset.browser_download_url.clone(),
            sha256: asset.sha256(),
        })
    }
}
