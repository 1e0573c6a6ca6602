//! Version normalization and comparison.
//!
//! Tools report versions in wildly different shapes (`v2.45.1`,
//! `2.45.1.windows.1`, `7.1`, `24.09`, `N-118000-g1234`). Comparison tries, in
//! order:
//!
//! 1. semantic-version ordering when both sides parse as semver;
//! 2. dotted-numeric ordering (any number of components, missing ones are 0);
//! 3. case-insensitive string ordering.
//!
//! The last step is deterministic but not always meaningful: `rc2` sorts after
//! `rc10`. It ranks candidates only; [`ResolvedVersion::is_up_to_date`] treats
//! such versions as current only when they are equal.

use regex::Regex;
use serde::Serialize;
use std::cmp::Ordering;
use std::sync::LazyLock;

static DOTTED_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"\d+(?:\.\d+)+").unwrap()
});

/// Strip surrounding whitespace, a leading `v`/`V`, and `+build` metadata.
#[must_use]
pub fn normalize(version: &str) -> String {
    let trimmed = version.trim();
    let trimmed = trimmed
        .strip_prefix(['v', 'V'])
        .filter(|rest| rest.starts_with(|c: char| c.is_ascii_digit()))
        .unwrap_or(trimmed);
    let without_build = trimmed.split('+').next().unwrap_or(trimmed);
    without_build.to_string()
}

/// Compare two version strings.
#[must_use]
pub fn compare(a: &str, b: &str) -> Ordering {
    numeric_order(a, b)
        .unwrap_or_else(|| normalize(a).to_lowercase().cmp(&normalize(b).to_lowercase()))
}

/// Semver or dotted-numeric ordering; `None` when either side parses as neither.
fn numeric_order(a: &str, b: &str) -> Option<Ordering> {
    let a = normalize(a);
    let b = normalize(b);

    if let (Ok(va), Ok(vb)) = (semver::Version::parse(&a), semver::Version::parse(&b)) {
        return Some(va.cmp(&vb));
    }

    let (na, nb) = (dotted_components(&a)?, dotted_components(&b)?);
    let len = na.len().max(nb.len());
    for i in 0..len {
        let x = na.get(i).copied().unwrap_or(0);
        let y = nb.get(i).copied().unwrap_or(0);
        match x.cmp(&y) {
            Ordering::Equal => {}
            other => return Some(other),
        }
    }
    Some(Ordering::Equal)
}

/// Parse `1.2.3.4` style strings into their numeric components.
fn dotted_components(version: &str) -> Option<Vec<u64>> {
    if version.is_empty() {
        return None;
    }
    version
        .split('.')
        .map(|part| part.parse::<u64>().ok())
        .collect()
}

/// Find the first dotted-number token (`2.45.1`) inside arbitrary text.
#[must_use]
pub fn extract_dotted(text: &str) -> Option<String> {
    DOTTED_NUMBER.find(text).map(|m| m.as_str().to_string())
}

/// Installed and latest versions of one plugin, computed fresh every run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolvedVersion {
    /// Version found on disk, if any.
    pub installed: Option<String>,
    /// Version offered by the declared source, if it could be determined.
    pub latest: Option<String>,
}

impl ResolvedVersion {
    /// Create a resolved version pair.
    #[must_use]
    pub fn new(installed: Option<String>, latest: Option<String>) -> Self {
        Self { installed, latest }
    }

    /// Installed and at least as new as the latest release.
    ///
    /// Versions that do not parse as numbers only count as current when they
    /// are equal, ignoring case. Always false when nothing is installed or the
    /// latest version is unknown.
    #[must_use]
    pub fn is_up_to_date(&self) -> bool {
        match (&self.installed, &self.latest) {
            (Some(installed), Some(latest)) if !installed.trim().is_empty() => {
                match numeric_order(installed, latest) {
                    Some(order) => order != Ordering::Less,
                    None => normalize(installed).eq_ignore_ascii_case(&normalize(latest)),
                }
            }
            _ => false,
        }
    }
}
