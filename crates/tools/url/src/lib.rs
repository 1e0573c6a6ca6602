//! Direct-URL release source for plugstrap.
//!
//! For vendors that publish downloads at predictable URLs instead of through
//! a release API. The latest version is scraped from a page with a regular
//! expression and substituted into the plugin's `base_uri` template.
//!
//! Supported placeholders:
//! - `{version}`: the scraped version as published (`24.08`)
//! - `{version_compact}`: the version without dots (`2408`)
//! - `{major}`, `{minor}`: the first and second version components
//! - `{os}`: `windows`, `darwin` or `linux`
//! - `{arch}`: `x64` or `arm64`

use async_trait::async_trait;
use plugstrap_core::source::{Arch, Os};
use plugstrap_core::strategy::{DEFAULT_VERSION_PATTERN, PluginPlan};
use plugstrap_core::version::{compare, extract_dotted};
use plugstrap_core::{Error, HttpClient, PluginSource, ReleaseSource, RemoteRelease, Result};
use regex::Regex;
use std::sync::Arc;
use tracing::debug;

/// Platform values substituted into URL templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Platform {
    /// Operating system
    pub os: Os,
    /// CPU architecture
    pub arch: Arch,
}

impl Platform {
    /// Platform of the running binary.
    #[must_use]
    pub const fn current() -> Self {
        Self {
            os: Os::current(),
            arch: Arch::current(),
        }
    }
}

/// Release source for plugins downloaded from templated URLs.
pub struct DirectUrlSource {
    http: Arc<dyn HttpClient>,
    platform: Platform,
}

impl std::fmt::Debug for DirectUrlSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectUrlSource")
            .field("platform", &self.platform)
            .finish_non_exhaustive()
    }
}

impl DirectUrlSource {
    /// Create a source for the current platform.
    #[must_use]
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self::with_platform(http, Platform::current())
    }

    /// Create a source expanding `{os}`/`{arch}` for a fixed platform.
    #[must_use]
    pub const fn with_platform(http: Arc<dyn HttpClient>, platform: Platform) -> Self {
        Self { http, platform }
    }

    /// Expand template placeholders in a URL.
    #[must_use]
    pub fn expand_template(&self, template: &str, version: &str) -> String {
        let mut parts = version.split('.');
        let major = parts.next().unwrap_or_default();
        let minor = parts.next().unwrap_or_default();

        template
            .replace("{version_compact}", &version.replace('.', ""))
            .replace("{version}", version)
            .replace("{major}", major)
            .replace("{minor}", minor)
            .replace("{os}", &self.platform.os.to_string())
            .replace("{arch}", &self.platform.arch.to_string())
    }

    /// Scrape the newest version advertised on `url`.
    async fn scrape_version(&self, plugin: &PluginPlan, url: &str) -> Result<String> {
        let name = plugin.name();
        let pattern = plugin
            .spec
            .version_pattern
            .as_deref()
            .unwrap_or(DEFAULT_VERSION_PATTERN);
        let pattern = Regex::new(pattern)
            .map_err(|e| Error::version_resolution(name, format!("invalid version pattern: {e}")))?;

        debug!(plugin = name, %url, "Scraping version page");
        let page = self.http.get(url, &[]).await?;

        highest_match(&pattern, &page).ok_or_else(|| {
            Error::version_resolution(
                name,
                format!("no version matching '{}' found at {url}", pattern.as_str()),
            )
        })
    }
}

/// Highest version among all matches of `pattern` in `text`.
///
/// Version pages often list several releases; the newest is not always the
/// first one mentioned.
fn highest_match(pattern: &Regex, text: &str) -> Option<String> {
    pattern
        .captures_iter(text)
        .filter_map(|caps| {
            caps.name("version")
                .or_else(|| caps.get(1))
                .or_else(|| caps.get(0))
                .map(|m| m.as_str().trim().to_string())
        })
        .filter(|v| !v.is_empty())
        .max_by(|a, b| compare(a, b))
}

/// Last path segment of a URL, without query or fragment.
fn asset_name(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/').next().filter(|s| !s.is_empty())
}

#[async_trait]
impl ReleaseSource for DirectUrlSource {
    fn name(&self) -> &'static str {
        "url"
    }

    fn can_handle(&self, source: PluginSource) -> bool {
        source == PluginSource::DirectUrl
    }

    async fn latest(&self, plugin: &PluginPlan) -> Result<RemoteRelease> {
        let name = plugin.name();
        let Some(base_uri) = plugin.spec.base_uri.as_deref() else {
            return Err(Error::version_resolution(name, "direct-url plugins need a base_uri"));
        };

        let version = match plugin.spec.version_probe_url.as_deref() {
            Some(probe_url) => Some(self.scrape_version(plugin, probe_url).await?),
            None => None,
        };

        let download_url = match &version {
            Some(version) => self.expand_template(base_uri, version),
            None => self.expand_template(base_uri, ""),
        };
        let asset = asset_name(&download_url).ok_or_else(|| {
            Error::version_resolution(name, format!("no file name in URL {download_url}"))
        })?;

        if let Some(pattern) = &plugin.pattern
            && !pattern.matches(asset)
        {
            return Err(Error::version_resolution(
                name,
                format!("asset '{asset}' does not match '{}'", pattern.as_str()),
            ));
        }

        // A fixed URL carries its version in the file name
        let version = version.or_else(|| extract_dotted(asset)).ok_or_else(|| {
            Error::version_resolution(name, format!("no version found in '{asset}'"))
        })?;

        debug!(plugin = name, %version, url = %download_url, "Resolved direct URL");
        Ok(RemoteRelease {
            tag: version.clone(),
            version,
            asset_name: asset.to_string(),
            download_url,
            sha256: None,
        })
    }
}
