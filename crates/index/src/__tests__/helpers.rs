//! Test helpers for pipeline integration tests.
//!
//! Provides a scripted collector driven by file content, a store wrapper
//! that can be told to fail commits, and a temporary project directory with
//! deterministic modification times.

use std::{
  path::{Path, PathBuf},
  sync::{
    Arc,
    atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering},
  },
  time::Duration,
};

use filetime::{FileTime, set_file_mtime};
use parking_lot::{Condvar, Mutex};
use symdex_core::{
  CollectedFacts, CollectorError, Config, FileRecord, FileStatus, ProjectPart, SourceLocation, StorageError, Symbol,
  SymbolId, SymbolKind, SymbolUsage, UsageKind, UsedMacro,
};
use tempfile::TempDir;

use crate::{
  collector::{CollectRequest, Collector, CollectorFactory},
  indexer::SymbolIndexer,
  pool::ProcessorPool,
  scheduler::TaskScheduler,
  storage::{FactStore, MemoryStore, Storage},
  watcher::PathWatcher,
};

// ============================================================================
// Scripted collector
// ============================================================================

/// Shared observations of every collector built by one factory
#[derive(Default)]
pub struct Probe {
  current: AtomicUsize,
  peak: AtomicUsize,
  collected: AtomicUsize,
  resets: AtomicUsize,
  gate_open: Mutex<bool>,
  gate: Condvar,
}

impl Probe {
  pub fn new() -> Arc<Self> {
    Arc::new(Self::default())
  }

  /// Highest number of collectors observed running at once
  pub fn peak(&self) -> usize {
    self.peak.load(Ordering::SeqCst)
  }

  pub fn collected(&self) -> usize {
    self.collected.load(Ordering::SeqCst)
  }

  pub fn resets(&self) -> usize {
    self.resets.load(Ordering::SeqCst)
  }

  /// Release every collector blocked on a `wait` line
  pub fn open_gate(&self) {
    *self.gate_open.lock() = true;
    self.gate.notify_all();
  }

  fn wait_for_gate(&self) {
    let mut open = self.gate_open.lock();
    while !*open {
      self.gate.wait(&mut open);
    }
  }
}

struct Running<'a>(&'a Probe);

impl<'a> Running<'a> {
  fn enter(probe: &'a Probe) -> Self {
    let now = probe.current.fetch_add(1, Ordering::SeqCst) + 1;
    probe.peak.fetch_max(now, Ordering::SeqCst);
    probe.collected.fetch_add(1, Ordering::SeqCst);
    Self(probe)
  }
}

impl Drop for Running<'_> {
  fn drop(&mut self) {
    self.0.current.fetch_sub(1, Ordering::SeqCst);
  }
}

/// Collector whose behaviour is written in the file being indexed.
///
/// One directive per line:
/// - `sym NAME` defines function NAME
/// - `ref NAME` references NAME
/// - `#define NAME` uses macro NAME
/// - `#include PATH` depends on PATH; generated overlays are read through
/// - `sleep MS` blocks the worker for MS milliseconds
/// - `wait` blocks until [`Probe::open_gate`]
/// - `fail` returns a collector error
/// - `panic` panics
pub struct ScriptedCollector {
  probe: Arc<Probe>,
}

impl ScriptedCollector {
  fn read(request: &CollectRequest<'_>, path: &Path) -> Result<String, CollectorError> {
    if let Some(content) = request.generated_content(path) {
      return Ok(content.to_string());
    }
    std::fs::read_to_string(path).map_err(|e| CollectorError::Unreadable {
      path: path.to_path_buf(),
      message: e.to_string(),
    })
  }

  fn apply(&self, request: &CollectRequest<'_>, content: &str, facts: &mut CollectedFacts) -> Result<(), CollectorError> {
    for (index, line) in content.lines().enumerate() {
      let location = SourceLocation::new(index as u32 + 1, 1);
      let mut words = line.split_whitespace();
      match (words.next(), words.next()) {
        (Some("sym"), Some(name)) => {
          facts.symbols.push(function(name));
          facts.usages.push(SymbolUsage {
            symbol: symbol_id(name),
            kind: UsageKind::Definition,
            location,
          });
        }
        (Some("ref"), Some(name)) => facts.usages.push(SymbolUsage {
          symbol: symbol_id(name),
          kind: UsageKind::Reference,
          location,
        }),
        (Some("#define"), Some(name)) => facts.macros.push(UsedMacro {
          name: name.to_string(),
          location,
        }),
        (Some("#include"), Some(path)) => {
          let path = PathBuf::from(path);
          if let Some(included) = request.generated_content(&path) {
            let included = included.to_string();
            self.apply(request, &included, facts)?;
          }
          facts.dependencies.push(path);
        }
        (Some("sleep"), Some(ms)) => std::thread::sleep(Duration::from_millis(ms.parse().unwrap_or(10))),
        (Some("wait"), None) => self.probe.wait_for_gate(),
        (Some("fail"), None) => return Err(CollectorError::parse(request.path, "scripted failure")),
        (Some("panic"), None) => panic!("scripted panic in {}", request.path.display()),
        _ => {}
      }
    }
    Ok(())
  }
}

impl Collector for ScriptedCollector {
  fn collect(&mut self, request: &CollectRequest<'_>) -> Result<CollectedFacts, CollectorError> {
    let _running = Running::enter(&self.probe);
    let content = Self::read(request, request.path)?;
    let mut facts = CollectedFacts::default();
    self.apply(request, &content, &mut facts)?;
    Ok(facts)
  }

  fn reset(&mut self) {
    self.probe.resets.fetch_add(1, Ordering::SeqCst);
  }
}

pub fn factory(probe: &Arc<Probe>) -> Arc<dyn CollectorFactory> {
  let probe = probe.clone();
  Arc::new(move || -> Box<dyn Collector> { Box::new(ScriptedCollector { probe: probe.clone() }) })
}

pub fn symbol_id(name: &str) -> SymbolId {
  SymbolId::new(format!("c:@F@{name}"))
}

fn function(name: &str) -> Symbol {
  Symbol {
    id: symbol_id(name),
    name: name.to_string(),
    kind: SymbolKind::Function,
  }
}

// ============================================================================
// Stores
// ============================================================================

/// Memory store whose commits and purges can be switched to fail, and
/// whose commits can be held on the worker until released
#[derive(Default)]
pub struct FlakyStore {
  inner: MemoryStore,
  fail_commits: AtomicBool,
  fail_purges: AtomicBool,
  held: Mutex<bool>,
  released: Condvar,
  waiting: AtomicUsize,
}

impl FlakyStore {
  pub fn new() -> Arc<Self> {
    Arc::new(Self::default())
  }

  pub fn fail_commits(&self, fail: bool) {
    self.fail_commits.store(fail, Ordering::SeqCst);
  }

  pub fn fail_purges(&self, fail: bool) {
    self.fail_purges.store(fail, Ordering::SeqCst);
  }

  /// Block every commit until [`FlakyStore::release_commits`]
  pub fn hold_commits(&self) {
    *self.held.lock() = true;
  }

  pub fn release_commits(&self) {
    *self.held.lock() = false;
    self.released.notify_all();
  }

  /// Commits currently blocked by [`FlakyStore::hold_commits`]
  pub fn commits_waiting(&self) -> usize {
    self.waiting.load(Ordering::SeqCst)
  }

  fn wait_while_held(&self) {
    let mut held = self.held.lock();
    if !*held {
      return;
    }
    self.waiting.fetch_add(1, Ordering::SeqCst);
    while *held {
      self.released.wait(&mut held);
    }
    self.waiting.fetch_sub(1, Ordering::SeqCst);
  }
}

impl FactStore for FlakyStore {
  fn commit(&self, record: FileRecord) -> Result<(), StorageError> {
    self.wait_while_held();
    if self.fail_commits.load(Ordering::SeqCst) {
      return Err(StorageError::Commit {
        path: record.status.path,
        message: "disk full".to_string(),
      });
    }
    self.inner.commit(record)
  }

  fn purge(&self, path: &Path) -> Result<bool, StorageError> {
    if self.fail_purges.load(Ordering::SeqCst) {
      return Err(StorageError::Purge {
        path: path.to_path_buf(),
        message: "read-only database".to_string(),
      });
    }
    self.inner.purge(path)
  }

  fn read_file_status(&self, path: &Path) -> Result<Option<FileStatus>, StorageError> {
    self.inner.read_file_status(path)
  }

  fn file_record(&self, path: &Path) -> Result<Option<FileRecord>, StorageError> {
    self.inner.file_record(path)
  }

  fn dependents_of(&self, path: &Path) -> Result<Vec<PathBuf>, StorageError> {
    self.inner.dependents_of(path)
  }
}

/// Names of the functions stored for `path`, sorted
pub fn stored_symbols(store: &dyn FactStore, path: &Path) -> Vec<String> {
  store
    .file_record(path)
    .expect("read record")
    .map(|record| record.symbols.into_iter().map(|symbol| symbol.name).collect())
    .unwrap_or_default()
}

// ============================================================================
// Project directory
// ============================================================================

static NEXT_MTIME: AtomicI64 = AtomicI64::new(1_700_000_000);

/// Temporary source tree with strictly increasing modification times
pub struct TestProject {
  pub dir: TempDir,
}

impl TestProject {
  pub fn new() -> Self {
    Self {
      dir: TempDir::new().expect("create project temp dir"),
    }
  }

  pub fn path(&self, name: &str) -> PathBuf {
    self.dir.path().join(name)
  }

  /// Write a file and give it a fresh modification time
  pub fn write(&self, name: &str, content: &str) -> PathBuf {
    let path = self.path(name);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).expect("create parent dir");
    }
    std::fs::write(&path, content).expect("write file");
    self.touch(name);
    path
  }

  /// Move the modification time forward without changing content
  pub fn touch(&self, name: &str) -> PathBuf {
    let path = self.path(name);
    let seconds = NEXT_MTIME.fetch_add(1, Ordering::SeqCst);
    set_file_mtime(&path, FileTime::from_unix_time(seconds, 0)).expect("set mtime");
    path
  }

  pub fn part(&self, id: &str, files: &[&str], arguments: &[&str]) -> ProjectPart {
    ProjectPart::new(
      id,
      files.iter().map(|name| self.path(name)).collect(),
      arguments.iter().map(|arg| arg.to_string()).collect(),
    )
  }
}

// ============================================================================
// Builders
// ============================================================================

pub fn indexer(store: Arc<dyn FactStore>, probe: &Arc<Probe>, limit: usize) -> SymbolIndexer {
  let pool = ProcessorPool::new(factory(probe), limit);
  let scheduler = TaskScheduler::new(pool, limit);
  let watcher = PathWatcher::new(None, Duration::from_millis(50));
  SymbolIndexer::new(Storage::new(store), scheduler, watcher)
}

/// Config with short timings for tests
pub fn test_config(concurrency: usize) -> Config {
  let mut config = Config::default();
  config.indexing.max_concurrency = concurrency;
  config.indexing.watcher_debounce_ms = 20;
  config.indexing.rescan_interval_secs = 0;
  config
}

/// Poll `check` until it holds or `timeout` passes
pub async fn wait_until<F, Fut>(timeout: Duration, mut check: F) -> bool
where
  F: FnMut() -> Fut,
  Fut: std::future::Future<Output = bool>,
{
  let deadline = tokio::time::Instant::now() + timeout;
  loop {
    if check().await {
      return true;
    }
    if tokio::time::Instant::now() >= deadline {
      return false;
    }
    tokio::time::sleep(Duration::from_millis(10)).await;
  }
}
