use globset::{GlobBuilder, GlobMatcher};
use plugstrap_core::{Entry, EntryKind, Error, FileSystem, Result};
use std::path::Path;
use walkdir::WalkDir;

use crate::{archive, pe};

/// The local disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileSystem;

impl LocalFileSystem {
    /// Create a new local file system.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

fn name_matcher(glob: &str) -> Result<GlobMatcher> {
    GlobBuilder::new(glob)
        .case_insensitive(true)
        .literal_separator(true)
        .build()
        .map(|g| g.compile_matcher())
        .map_err(|e| Error::configuration(format!("invalid name pattern '{glob}': {e}")))
}

impl FileSystem for LocalFileSystem {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn list_children(
        &self,
        path: &Path,
        name_glob: Option<&str>,
        kind: EntryKind,
        max_depth: usize,
    ) -> Result<Vec<Entry>> {
        if !path.is_dir() {
            return Ok(Vec::new());
        }
        let matcher = name_glob.map(name_matcher).transpose()?;

        let mut entries = Vec::new();
        for entry in WalkDir::new(path).min_depth(1).max_depth(max_depth).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                // Unreadable subtrees are skipped; the caller only looks for commands
                Err(e) if e.depth() > 0 => continue,
                Err(e) => {
                    return Err(Error::io(
                        e.into_io_error()
                            .unwrap_or_else(|| std::io::Error::other("directory walk failed")),
                        Some(path),
                        "list directory",
                    ));
                }
            };
            let is_dir = entry.file_type().is_dir();
            if !kind.accepts(is_dir) {
                continue;
            }
            if let Some(matcher) = &matcher
                && !matcher.is_match(entry.file_name())
            {
                continue;
            }
            entries.push(Entry {
                path: entry.into_path(),
                is_dir,
            });
        }
        Ok(entries)
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        std::fs::create_dir_all(path).map_err(|e| Error::io(e, Some(path), "create directory"))
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        match std::fs::remove_dir_all(path) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
                Err(Error::io(e, Some(path), "remove directory"))
            }
            _ => Ok(()),
        }
    }

    fn extract_archive(&self, archive: &Path, dest: &Path, overwrite: bool) -> Result<()> {
        archive::extract(archive, dest, overwrite)
    }

    fn file_version(&self, path: &Path) -> Option<String> {
        pe::file_version(path)
    }
}
