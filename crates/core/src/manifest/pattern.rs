//! Asset-name patterns.
//!
//! A pattern is either a glob (`tool-*-x64.zip`, matched case-insensitively)
//! or, when prefixed with `regex:`, a regular expression. A regex may carry a
//! named `version` capture group, which is preferred over the release tag when
//! deriving a version from the matched asset.

use globset::{GlobBuilder, GlobMatcher};
use regex::Regex;
use std::fmt;

/// Prefix that marks a pattern as a regular expression.
pub const REGEX_PREFIX: &str = "regex:";

/// A compiled asset-name pattern.
#[derive(Clone)]
pub enum AssetPattern {
    /// Shell-style glob.
    Glob {
        /// Pattern as written in the manifest.
        raw: String,
        /// Compiled matcher.
        matcher: GlobMatcher,
    },
    /// Regular expression, anchored by the author if needed.
    Regex(Regex),
}

impl AssetPattern {
    /// Compile a pattern string.
    ///
    /// # Errors
    ///
    /// Returns the compiler's message when the glob or regex is invalid.
    pub fn parse(pattern: &str) -> Result<Self, String> {
        if let Some(expr) = pattern.strip_prefix(REGEX_PREFIX) {
            return Regex::new(expr)
                .map(Self::Regex)
                .map_err(|e| format!("invalid asset regex '{expr}': {e}"));
        }
        let glob = GlobBuilder::new(pattern)
            .case_insensitive(true)
            .literal_separator(true)
            .build()
            .map_err(|e| format!("invalid asset glob '{pattern}': {e}"))?;
        Ok(Self::Glob {
            raw: pattern.to_string(),
            matcher: glob.compile_matcher(),
        })
    }

    /// Whether an asset name matches.
    #[must_use]
    pub fn matches(&self, name: &str) -> bool {
        match self {
            Self::Glob { matcher, .. } => matcher.is_match(name),
            Self::Regex(re) => re.is_match(name),
        }
    }

    /// Version embedded in the asset name via a `version` capture group.
    ///
    /// Globs never carry one.
    #[must_use]
    pub fn version_of(&self, name: &str) -> Option<String> {
        match self {
            Self::Glob { .. } => None,
            Self::Regex(re) => re
                .captures(name)
                .and_then(|caps| caps.name("version"))
                .map(|m| m.as_str().to_string()),
        }
    }

    /// The pattern as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Glob { raw, .. } => raw,
            Self::Regex(re) => re.as_str(),
        }
    }
}

impl fmt::Debug for AssetPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Glob { raw, .. } => f.debug_tuple("Glob").field(raw).finish(),
            Self::Regex(re) => f.debug_tuple("Regex").field(&re.as_str()).finish(),
        }
    }
}

impl fmt::Display for AssetPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Glob { raw, .. } => write!(f, "{raw}"),
            Self::Regex(re) => write!(f, "{REGEX_PREFIX}{}", re.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_matching() {
        let pattern = AssetPattern::parse("tool-*-x64.zip").unwrap();
        assert!(pattern.matches("tool-2.0.0-x64.zip"));
        assert!(pattern.matches("TOOL-2.0.0-X64.ZIP"));
        assert!(!pattern.matches("tool-2.0.0-arm64.zip"));
        assert!(!pattern.matches("tool-2.0.0-x64.zip.sha256"));
        assert_eq!(pattern.version_of("tool-2.0.0-x64.zip"), None);
    }

    #[test]
    fn test_regex_with_version_capture() {
        let pattern =
            AssetPattern::parse(r"regex:^PortableGit-(?<version>[\d.]+)-64-bit\.7z\.exe$").unwrap();
        assert!(pattern.matches("PortableGit-2.45.1-64-bit.7z.exe"));
        assert!(!pattern.matches("Git-2.45.1-64-bit.exe"));
        assert_eq!(
            pattern.version_of("PortableGit-2.45.1-64-bit.7z.exe").as_deref(),
            Some("2.45.1")
        );
    }

    #[test]
    fn test_regex_without_capture() {
        let pattern = AssetPattern::parse(r"regex:ffmpeg-.*-win64-gpl\.zip").unwrap();
        assert!(pattern.matches("ffmpeg-n7.1-latest-win64-gpl.zip"));
        assert_eq!(pattern.version_of("ffmpeg-n7.1-latest-win64-gpl.zip"), None);
    }

    #[test]
    fn test_invalid_patterns() {
        assert!(AssetPattern::parse("regex:(unclosed").is_err());
        assert!(AssetPattern::parse("tool-[x64.zip").is_err());
    }

    #[test]
    fn test_display_round_trips_prefix() {
        let pattern = AssetPattern::parse("regex:^a$").unwrap();
        assert_eq!(pattern.to_string(), "regex:^a$");
        let pattern = AssetPattern::parse("a-*.zip").unwrap();
        assert_eq!(pattern.to_string(), "a-*.zip");
        assert_eq!(pattern.as_str(), "a-*.zip");
    }
}
