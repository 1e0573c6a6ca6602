//! Install-root layout.
//!
//! | Path | Purpose |
//! |------|---------|
//! | `<root>/<Tool...>/` | One directory per installed tool |
//! | `<root>/_Downloads/` | Downloaded release assets |
//! | `<root>/_Temp/` | Reserved scratch space, never probed for installs |
//!
//! Only a plugin's own directory is ever removed, right before it is
//! reinstalled; the tree is the only record of what is installed. Archive
//! extraction stages in a hidden sibling of its destination so the final rename
//! never crosses file systems.

use std::path::{Path, PathBuf};

/// Default name of the downloads directory below the root.
pub const DOWNLOADS_DIR_NAME: &str = "_Downloads";

/// Default name of the scratch directory below the root.
pub const TEMP_DIR_NAME: &str = "_Temp";

/// Directories the engine installs into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallRoot {
    root: PathBuf,
    downloads_dir: PathBuf,
    temp_dir: PathBuf,
}

impl InstallRoot {
    /// Create the default layout below `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            downloads_dir: root.join(DOWNLOADS_DIR_NAME),
            temp_dir: root.join(TEMP_DIR_NAME),
            root,
        }
    }

    /// Override the downloads directory.
    #[must_use]
    pub fn with_downloads_dir(mut self, dir: PathBuf) -> Self {
        self.downloads_dir = dir;
        self
    }

    /// Override the scratch directory.
    #[must_use]
    pub fn with_temp_dir(mut self, dir: PathBuf) -> Self {
        self.temp_dir = dir;
        self
    }

    /// Root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Downloads directory.
    #[must_use]
    pub fn downloads_dir(&self) -> &Path {
        &self.downloads_dir
    }

    /// Scratch directory.
    #[must_use]
    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    /// Whether `path` lies inside the downloads or scratch directory.
    ///
    /// Local probes skip these so a downloaded installer is never mistaken
    /// for an installed command.
    #[must_use]
    pub fn is_bookkeeping_path(&self, path: &Path) -> bool {
        path.starts_with(&self.downloads_dir) || path.starts_with(&self.temp_dir)
    }

    /// Target directory for a plugin installed by a silent installer.
    #[must_use]
    pub fn plugin_dir(&self, plugin: &str) -> PathBuf {
        self.root.join(plugin)
    }
}
