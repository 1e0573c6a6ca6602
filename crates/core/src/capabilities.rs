//! Capabilities the engine needs from the outside world.
//!
//! The resolver, install pipeline and orchestrator only talk to the file
//! system, child processes, HTTP and the clock through these traits. The
//! production implementations live in `plugstrap-services`; tests substitute
//! in-memory fakes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::Result;

/// Which kinds of directory entries to list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Regular files only
    File,
    /// Directories only
    Directory,
    /// Both
    Any,
}

impl EntryKind {
    /// Whether an entry of kind `is_dir` passes this filter.
    #[must_use]
    pub const fn accepts(self, is_dir: bool) -> bool {
        match self {
            Self::File => !is_dir,
            Self::Directory => is_dir,
            Self::Any => true,
        }
    }
}

/// A directory entry returned by [`FileSystem::list_children`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Full path
    pub path: PathBuf,
    /// Whether the entry is a directory
    pub is_dir: bool,
}

impl Entry {
    /// Final path component, lossily converted.
    #[must_use]
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// File system access.
pub trait FileSystem: Send + Sync {
    /// Whether a file or directory exists.
    fn exists(&self, path: &Path) -> bool;

    /// Entries below `path`, up to `max_depth` levels deep (1 = direct
    /// children), whose file name matches `name_glob` case-insensitively.
    ///
    /// A missing directory yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns an error if `name_glob` is invalid or the tree cannot be read.
    fn list_children(
        &self,
        path: &Path,
        name_glob: Option<&str>,
        kind: EntryKind,
        max_depth: usize,
    ) -> Result<Vec<Entry>>;

    /// Create a directory and its parents; existing directories are fine.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if creation fails.
    fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Remove a directory tree; an absent path is not an error.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if removal fails.
    fn remove_dir_all(&self, path: &Path) -> Result<()>;

    /// Extract a zip or tarball into `dest`.
    ///
    /// With `overwrite`, an existing `dest` is replaced. A failed extraction
    /// never leaves a partial `dest` behind.
    ///
    /// # Errors
    ///
    /// Returns an extraction error for corrupt or unsupported archives.
    fn extract_archive(&self, archive: &Path, dest: &Path, overwrite: bool) -> Result<()>;

    /// Version metadata embedded in a binary, if any.
    fn file_version(&self, path: &Path) -> Option<String>;
}

/// Captured result of a finished child process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code; `None` when terminated by a signal
    pub exit_code: Option<i32>,
    /// Captured stdout
    pub stdout: String,
    /// Captured stderr
    pub stderr: String,
}

impl ProcessOutput {
    /// Successful output with the given stdout.
    #[must_use]
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Whether the process exited with code 0.
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Stdout followed by stderr.
    #[must_use]
    pub fn combined(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// Child process execution.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run `program` to completion within `timeout`.
    ///
    /// A non-zero exit code is returned as data.
    ///
    /// # Errors
    ///
    /// Returns a process launch error when the program cannot be spawned and
    /// a timeout error when it runs too long (the child is killed).
    async fn run(&self, program: &Path, args: &[String], timeout: Duration)
    -> Result<ProcessOutput>;

    /// Whether `program` is an existing executable file.
    fn command_exists(&self, program: &Path) -> bool;
}

/// HTTP access.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Fetch a text body.
    ///
    /// # Errors
    ///
    /// Returns a network error on transport failure or a non-2xx status.
    async fn get(&self, url: &str, headers: &[(String, String)]) -> Result<String>;

    /// Download `url` to `dest`, creating the parent directory.
    ///
    /// # Errors
    ///
    /// Returns a network error on transport failure or a non-2xx status.
    async fn download(&self, url: &str, dest: &Path) -> Result<Download>;
}

/// A completed download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    /// Bytes written
    pub bytes: u64,
    /// Lower-case hex SHA-256 of the content
    pub sha256: String,
}

/// Run identity and wall-clock time, used for log correlation.
pub trait Clock: Send + Sync {
    /// A fresh identifier for a run.
    fn run_id(&self) -> Uuid;

    /// Current time.
    fn now(&self) -> DateTime<Utc>;
}

/// The capability bundle handed to the engine.
#[derive(Clone)]
pub struct Services {
    /// File system
    pub fs: Arc<dyn FileSystem>,
    /// Process runner
    pub process: Arc<dyn ProcessRunner>,
    /// HTTP client
    pub http: Arc<dyn HttpClient>,
    /// Clock
    pub clock: Arc<dyn Clock>,
}

impl Services {
    /// Bundle capability implementations.
    #[must_use]
    pub fn new(
        fs: Arc<dyn FileSystem>,
        process: Arc<dyn ProcessRunner>,
        http: Arc<dyn HttpClient>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            fs,
            process,
            http,
            clock,
        }
    }
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services").finish_non_exhaustive()
    }
}
