//! In-memory capability fakes shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use globset::GlobBuilder;
use plugstrap_core::capabilities::{
    Clock, Download, Entry, EntryKind, FileSystem, HttpClient, ProcessOutput, ProcessRunner,
    Services,
};
use plugstrap_core::manifest::{Manifest, PluginSource};
use plugstrap_core::sink::{LogLevel, LogSink};
use plugstrap_core::source::{ReleaseSource, RemoteRelease, SourceRegistry};
use plugstrap_core::strategy::{Plan, PluginPlan, StrategyTable};
use plugstrap_core::{EngineOptions, Error, InstallRoot, Orchestrator, Result, RetryPolicy};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

pub const ROOT: &str = "/plugins";

// ---------------------------------------------------------------------------
// File system
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Node {
    Dir,
    File(Vec<u8>),
}

/// Tree of paths held in memory. Archives are "extracted" from scripted
/// listings keyed by archive file name.
#[derive(Default)]
pub struct FakeFs {
    nodes: Mutex<BTreeMap<PathBuf, Node>>,
    archives: Mutex<HashMap<String, Vec<String>>>,
    versions: Mutex<HashMap<PathBuf, String>>,
    pub calls: AtomicUsize,
}

impl FakeFs {
    pub fn add_dir(&self, path: impl AsRef<Path>) {
        let mut nodes = self.nodes.lock().unwrap();
        for ancestor in path.as_ref().ancestors() {
            if ancestor.as_os_str().is_empty() {
                continue;
            }
            nodes.entry(ancestor.to_path_buf()).or_insert(Node::Dir);
        }
    }

    pub fn add_file(&self, path: impl AsRef<Path>, content: &[u8]) {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            self.add_dir(parent);
        }
        self.nodes
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), Node::File(content.to_vec()));
    }

    /// Script what extracting an archive with this file name produces.
    pub fn script_archive(&self, archive_name: &str, files: &[&str]) {
        self.archives.lock().unwrap().insert(
            archive_name.to_string(),
            files.iter().map(ToString::to_string).collect(),
        );
    }

    pub fn set_file_version(&self, path: impl AsRef<Path>, version: &str) {
        self.versions
            .lock()
            .unwrap()
            .insert(path.as_ref().to_path_buf(), version.to_string());
    }

    pub fn contains(&self, path: impl AsRef<Path>) -> bool {
        self.nodes.lock().unwrap().contains_key(path.as_ref())
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn touch(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

impl FileSystem for FakeFs {
    fn exists(&self, path: &Path) -> bool {
        self.touch();
        self.contains(path)
    }

    fn list_children(
        &self,
        path: &Path,
        name_glob: Option<&str>,
        kind: EntryKind,
        max_depth: usize,
    ) -> Result<Vec<Entry>> {
        self.touch();
        let matcher = name_glob
            .map(|g| {
                GlobBuilder::new(g)
                    .case_insensitive(true)
                    .build()
                    .map(|glob| glob.compile_matcher())
                    .map_err(|e| Error::configuration(e.to_string()))
            })
            .transpose()?;
        let base_depth = path.components().count();

        let nodes = self.nodes.lock().unwrap();
        Ok(nodes
            .iter()
            .filter(|(p, _)| p.starts_with(path) && p.as_path() != path)
            .filter(|(p, _)| p.components().count() - base_depth <= max_depth)
            .filter(|(_, node)| kind.accepts(matches!(node, Node::Dir)))
            .filter(|(p, _)| {
                matcher.as_ref().is_none_or(|m| {
                    p.file_name().is_some_and(|name| m.is_match(Path::new(name)))
                })
            })
            .map(|(p, node)| Entry {
                path: p.clone(),
                is_dir: matches!(node, Node::Dir),
            })
            .collect())
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        self.touch();
        self.add_dir(path);
        Ok(())
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        self.touch();
        self.nodes
            .lock()
            .unwrap()
            .retain(|p, _| !p.starts_with(path));
        Ok(())
    }

    fn extract_archive(&self, archive: &Path, dest: &Path, overwrite: bool) -> Result<()> {
        self.touch();
        if !self.contains(archive) {
            return Err(Error::extraction(archive, "archive does not exist"));
        }
        let name = archive
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let Some(files) = self.archives.lock().unwrap().get(&name).cloned() else {
            return Err(Error::extraction(archive, "unsupported or corrupt archive"));
        };
        if overwrite {
            self.remove_dir_all(dest)?;
        }
        self.add_dir(dest);
        for file in files {
            self.add_file(dest.join(file), b"binary");
        }
        Ok(())
    }

    fn file_version(&self, path: &Path) -> Option<String> {
        self.touch();
        self.versions.lock().unwrap().get(path).cloned()
    }
}

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

/// Canned HTTP responses. Downloads are written into the fake file system.
pub struct FakeHttp {
    fs: Arc<FakeFs>,
    pages: Mutex<HashMap<String, String>>,
    failures: Mutex<HashMap<String, (usize, Option<u16>)>>,
    pub requests: Mutex<Vec<String>>,
    pub downloads: AtomicUsize,
}

impl FakeHttp {
    pub fn new(fs: Arc<FakeFs>) -> Self {
        Self {
            fs,
            pages: Mutex::default(),
            failures: Mutex::default(),
            requests: Mutex::default(),
            downloads: AtomicUsize::new(0),
        }
    }

    pub fn page(&self, url: &str, body: &str) {
        self.pages
            .lock()
            .unwrap()
            .insert(url.to_string(), body.to_string());
    }

    /// Fail the next `times` requests to `url`; `status` of `None` means a
    /// transport failure.
    pub fn fail(&self, url: &str, times: usize, status: Option<u16>) {
        self.failures
            .lock()
            .unwrap()
            .insert(url.to_string(), (times, status));
    }

    pub fn download_count(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    fn check_failure(&self, url: &str) -> Result<()> {
        self.requests.lock().unwrap().push(url.to_string());
        let mut failures = self.failures.lock().unwrap();
        if let Some((remaining, status)) = failures.get_mut(url)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(match status {
                Some(code) => Error::http_status(url, *code),
                None => Error::network(url, "connection reset"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl HttpClient for FakeHttp {
    async fn get(&self, url: &str, _headers: &[(String, String)]) -> Result<String> {
        self.check_failure(url)?;
        self.pages
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| Error::http_status(url, 404))
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<Download> {
        self.check_failure(url)?;
        self.downloads.fetch_add(1, Ordering::SeqCst);
        let content = url.as_bytes();
        self.fs.add_file(dest, content);
        Ok(Download {
            bytes: content.len() as u64,
            sha256: sha256_hex(content),
        })
    }
}

pub fn sha256_hex(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

// ---------------------------------------------------------------------------
// Processes
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct Script {
    output: ProcessOutput,
    creates: Vec<String>,
}

/// Scripted programs keyed by lower-cased file name.
///
/// A script's `creates` files are added below the destination found in the
/// arguments (`-o<dir>` or `/D=<dir>`), mimicking archivers and installers.
pub struct FakeProcess {
    fs: Arc<FakeFs>,
    scripts: Mutex<HashMap<String, Script>>,
    pub runs: Mutex<Vec<(PathBuf, Vec<String>)>>,
}

impl FakeProcess {
    pub fn new(fs: Arc<FakeFs>) -> Self {
        Self {
            fs,
            scripts: Mutex::default(),
            runs: Mutex::default(),
        }
    }

    pub fn script(&self, program: &str, output: ProcessOutput, creates: &[&str]) {
        self.scripts.lock().unwrap().insert(
            program.to_lowercase(),
            Script {
                output,
                creates: creates.iter().map(ToString::to_string).collect(),
            },
        );
    }

    pub fn run_count(&self, program: &str) -> usize {
        self.runs
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| p.file_name().is_some_and(|n| n.eq_ignore_ascii_case(program)))
            .count()
    }
}

#[async_trait]
impl ProcessRunner for FakeProcess {
    async fn run(
        &self,
        program: &Path,
        args: &[String],
        _timeout: Duration,
    ) -> Result<ProcessOutput> {
        self.runs
            .lock()
            .unwrap()
            .push((program.to_path_buf(), args.to_vec()));
        if !self.fs.contains(program) {
            return Err(Error::process_launch(
                program.display().to_string(),
                "No such file or directory",
            ));
        }
        let name = program
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let Some(script) = self.scripts.lock().unwrap().get(&name).cloned() else {
            return Err(Error::process_launch(name, "not scripted"));
        };

        let dest = args.iter().find_map(|arg| {
            arg.strip_prefix("-o")
                .or_else(|| arg.strip_prefix("/D="))
                .map(PathBuf::from)
        });
        if let Some(dest) = dest {
            for file in &script.creates {
                self.fs.add_file(dest.join(file), b"binary");
            }
        }
        Ok(script.output)
    }

    fn command_exists(&self, program: &Path) -> bool {
        self.fs.contains(program)
    }
}

// ---------------------------------------------------------------------------
// Clock and sink
// ---------------------------------------------------------------------------

pub struct FixedClock;

impl Clock for FixedClock {
    fn run_id(&self) -> Uuid {
        Uuid::from_u128(0x1234)
    }

    fn now(&self) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub entries: Mutex<Vec<(LogLevel, String, String)>>,
}

impl RecordingSink {
    pub fn has(&self, level: LogLevel, context: &str) -> bool {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .any(|(l, c, _)| *l == level && c == context)
    }
}

impl LogSink for RecordingSink {
    fn log(&self, level: LogLevel, context: &str, message: &str, _error: Option<&Error>) {
        self.entries
            .lock()
            .unwrap()
            .push((level, context.to_string(), message.to_string()));
    }
}

// ---------------------------------------------------------------------------
// Release source
// ---------------------------------------------------------------------------

/// Releases scripted per plugin name, serving both source kinds.
#[derive(Default)]
pub struct FakeSource {
    releases: Mutex<HashMap<String, RemoteRelease>>,
    failures: Mutex<HashMap<String, (usize, Option<u16>)>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl FakeSource {
    pub fn release(&self, plugin: &str, version: &str, asset: &str) {
        self.releases.lock().unwrap().insert(
            plugin.to_string(),
            RemoteRelease {
                version: version.to_string(),
                tag: format!("v{version}"),
                asset_name: asset.to_string(),
                download_url: format!("https://example.com/{asset}"),
                sha256: None,
            },
        );
    }

    pub fn release_with_digest(&self, plugin: &str, version: &str, asset: &str, digest: &str) {
        self.release(plugin, version, asset);
        if let Some(release) = self.releases.lock().unwrap().get_mut(plugin) {
            release.sha256 = Some(digest.to_string());
        }
    }

    /// Fail the next `times` lookups for `plugin`.
    pub fn fail(&self, plugin: &str, times: usize, status: Option<u16>) {
        self.failures
            .lock()
            .unwrap()
            .insert(plugin.to_string(), (times, status));
    }

    pub fn calls(&self, plugin: &str) -> usize {
        self.calls.lock().unwrap().get(plugin).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl ReleaseSource for FakeSource {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn can_handle(&self, _source: PluginSource) -> bool {
        true
    }

    async fn latest(&self, plugin: &PluginPlan) -> Result<RemoteRelease> {
        let name = plugin.name().to_string();
        *self.calls.lock().unwrap().entry(name.clone()).or_default() += 1;

        let url = format!("https://example.com/releases/{name}");
        if let Some((remaining, status)) = self.failures.lock().unwrap().get_mut(&name)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(match status {
                Some(code) => Error::http_status(url, *code),
                None => Error::network(url, "connection reset"),
            });
        }
        self.releases
            .lock()
            .unwrap()
            .get(&name)
            .cloned()
            .ok_or_else(|| Error::version_resolution(name, "no matching release"))
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub fs: Arc<FakeFs>,
    pub http: Arc<FakeHttp>,
    pub process: Arc<FakeProcess>,
    pub source: Arc<FakeSource>,
    pub sink: Arc<RecordingSink>,
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

impl Harness {
    pub fn new() -> Self {
        let fs = Arc::new(FakeFs::default());
        Self {
            http: Arc::new(FakeHttp::new(fs.clone())),
            process: Arc::new(FakeProcess::new(fs.clone())),
            source: Arc::new(FakeSource::default()),
            sink: Arc::new(RecordingSink::default()),
            fs,
        }
    }

    pub fn root(&self) -> InstallRoot {
        InstallRoot::new(ROOT)
    }

    pub fn services(&self) -> Services {
        Services::new(
            self.fs.clone(),
            self.process.clone(),
            self.http.clone(),
            Arc::new(FixedClock),
        )
    }

    pub fn sources(&self) -> SourceRegistry {
        let mut registry = SourceRegistry::new();
        registry.register_arc(self.source.clone());
        registry
    }

    pub fn options() -> EngineOptions {
        EngineOptions {
            retry: RetryPolicy::immediate(2),
            ..EngineOptions::default()
        }
    }

    pub fn orchestrator(&self, options: EngineOptions) -> Orchestrator {
        Orchestrator::new(self.root(), self.services(), self.sources())
            .with_options(options)
            .with_sink(self.sink.clone())
    }

    pub fn path(rel: &str) -> PathBuf {
        Path::new(ROOT).join(rel)
    }
}

pub fn plan(toml: &str) -> Plan {
    let manifest = Manifest::from_toml(toml).expect("manifest should be valid");
    StrategyTable::builtin()
        .plan(&manifest)
        .expect("manifest should plan")
}

/// A repository plugin using the default directory-name strategy.
pub fn repo_plugin(name: &str, extra: &str) -> String {
    format!(
        r#"
[[phase.plugin]]
name = "{name}"
source = "repository"
repository_id = "example/{name}"
asset_pattern = "{name}-*-x64.zip"
command_file_name = "{name}"
{extra}
"#
    )
}

pub fn phase(name: &str, plugins: &[String]) -> String {
    format!("[[phase]]\nname = \"{name}\"\n{}", plugins.concat())
}
