//! SymbolIndexer - reconciles project parts against committed facts
//!
//! The indexer is owned by the control loop and is the only component that
//! knows about files. It decides which files are stale, turns them into
//! tasks, and reacts to task completions. The queue, scheduler and pool
//! below it only know tasks.
//!
//! # Staleness
//!
//! A tracked file is stale when the store has no committed status for it,
//! when the committed arguments hash differs from its owning part's, or when
//! the committed stat differs from the (cached) on-disk stat. A touch that
//! only moves the mtime therefore triggers re-indexing.
//!
//! # Superseded completions
//!
//! Every enqueue bumps the file's generation in a map shared with the task
//! continuations. A continuation only commits while its generation is still
//! the current one. Together with one-task-per-path dispatch this keeps a
//! result collected from an older version of a file from overwriting a newer
//! one, without the control loop ever waiting on a worker's commit.
//! Work already queued or in flight for the same stat and arguments is not
//! requested again.
//!
//! # Purges
//!
//! A purge that fails is kept in a retry set and attempted again on every
//! reconciliation and drain until it succeeds.

use std::{
  collections::{BTreeSet, HashMap, HashSet},
  path::{Path, PathBuf},
  sync::Arc,
};

use dashmap::DashMap;
use serde::Serialize;
use symdex_core::{
  CollectedFacts, CollectorError, FileStat, FileStatus, GeneratedFile, GeneratedFiles, ProjectPart, ProjectPartId,
  arguments_hash,
};
use tokio::{sync::Notify, time::Instant};
use tracing::{debug, error, info, trace, warn};

use crate::{
  error::TaskFailure,
  queue::TaskQueue,
  scheduler::TaskScheduler,
  status_cache::FileStatusCache,
  storage::Storage,
  task::{IndexingTask, TaskCompletion, TaskId, TaskMeta, TaskOutcome, TaskResult},
  watcher::{FileEvent, PathWatcher},
};

// ============================================================================
// Reports
// ============================================================================

/// Counters and gauges describing the pipeline at one instant
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexingStats {
  pub project_parts: usize,
  pub tracked: usize,
  pub watched: usize,
  pub queued: usize,
  pub in_flight: usize,
  pub processors: usize,
  pub idle_processors: usize,
  pub committed: u64,
  pub failed: u64,
  pub superseded: u64,
  pub purged: u64,
  pub pending_purges: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
  Collector,
  Storage,
  Panicked,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedFile {
  pub path: PathBuf,
  pub kind: FailureKind,
  pub error: String,
}

/// What a blocking drain observed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
  pub committed: Vec<PathBuf>,
  pub superseded: usize,
  pub failed: Vec<FailedFile>,
}

impl SyncReport {
  fn record(&mut self, completion: &TaskCompletion) {
    match &completion.result {
      Ok(TaskOutcome::Committed(_)) => self.committed.push(completion.task.path.clone()),
      Ok(TaskOutcome::Superseded) => self.superseded += 1,
      Err(e) => self.failed.push(FailedFile {
        path: completion.task.path.clone(),
        kind: match e {
          TaskFailure::Collector(_) => FailureKind::Collector,
          TaskFailure::Storage(_) => FailureKind::Storage,
          TaskFailure::Panicked(_) => FailureKind::Panicked,
        },
        error: e.to_string(),
      }),
    }
  }

  /// Storage faults seen during the drain
  pub fn storage_failures(&self) -> impl Iterator<Item = &FailedFile> {
    self.failed.iter().filter(|failed| failed.kind == FailureKind::Storage)
  }

  fn sort(&mut self) {
    self.committed.sort();
    self.failed.sort_by(|a, b| a.path.cmp(&b.path));
  }
}

// ============================================================================
// Internal state
// ============================================================================

struct PartState {
  files: Vec<PathBuf>,
  listed: HashSet<PathBuf>,
  arguments: Arc<[String]>,
  arguments_hash: String,
}

impl PartState {
  fn new(files: Vec<PathBuf>, arguments: Vec<String>) -> Self {
    let mut listed = HashSet::with_capacity(files.len());
    let files: Vec<PathBuf> = files.into_iter().filter(|file| listed.insert(file.clone())).collect();
    let arguments_hash = arguments_hash(&arguments);
    Self {
      files,
      listed,
      arguments: Arc::from(arguments),
      arguments_hash,
    }
  }
}

/// Work already requested for a file, queued or in flight
struct PendingWork {
  stat: FileStat,
  arguments_hash: String,
  generation: u64,
}

enum Judgement {
  Stale(FileStat),
  UpToDate,
  /// Already queued or in flight for this exact stat and arguments
  InProgress,
  /// Transient IO fault or untracked: nothing to do this round
  Skip,
}

#[derive(Debug, Default)]
struct Counters {
  committed: u64,
  failed: u64,
  superseded: u64,
  purged: u64,
}

type Generations = Arc<DashMap<PathBuf, u64>>;

// ============================================================================
// SymbolIndexer
// ============================================================================

pub struct SymbolIndexer {
  queue: TaskQueue,
  scheduler: TaskScheduler,
  watcher: PathWatcher,
  cache: FileStatusCache,
  storage: Storage,
  parts: HashMap<ProjectPartId, PartState>,
  owners: HashMap<PathBuf, ProjectPartId>,
  generations: Generations,
  pending: HashMap<PathBuf, PendingWork>,
  next_task: u64,
  deferred_purges: HashSet<PathBuf>,
  failed_purges: HashSet<PathBuf>,
  purge_failures: Vec<FailedFile>,
  generated: GeneratedFiles,
  counters: Counters,
}

impl SymbolIndexer {
  pub fn new(storage: Storage, scheduler: TaskScheduler, watcher: PathWatcher) -> Self {
    Self {
      queue: TaskQueue::new(),
      scheduler,
      watcher,
      cache: FileStatusCache::new(),
      storage,
      parts: HashMap::new(),
      owners: HashMap::new(),
      generations: Arc::new(DashMap::new()),
      pending: HashMap::new(),
      next_task: 0,
      deferred_purges: HashSet::new(),
      failed_purges: HashSet::new(),
      purge_failures: Vec::new(),
      generated: GeneratedFiles::new(),
      counters: Counters::default(),
    }
  }

  // --------------------------------------------------------------------------
  // Project parts
  // --------------------------------------------------------------------------

  /// Reconcile the given parts against the previous snapshot of each.
  ///
  /// Parts not mentioned keep their previous snapshot. Files no longer listed
  /// by any part are purged and stop being watched.
  pub fn update_project_parts(&mut self, parts: Vec<ProjectPart>) {
    self.retry_purges();
    let mut candidates = Vec::new();
    let mut released = Vec::new();

    for part in parts {
      let ProjectPart { id, files, arguments } = part;
      let state = PartState::new(files, arguments);

      if let Some(previous) = self.parts.get(&id) {
        for file in &previous.files {
          if !state.listed.contains(file) && self.owners.get(file) == Some(&id) {
            released.push(file.clone());
          }
        }
      }

      for file in &state.files {
        match self.owners.get(file) {
          None => {
            self.owners.insert(file.clone(), id.clone());
            self.track(file);
            candidates.push(file.clone());
          }
          Some(owner) if *owner == id => candidates.push(file.clone()),
          Some(owner) => trace!(file = %file.display(), owner = %owner, part = %id, "File owned by another part"),
        }
      }

      debug!(part = %id, files = state.files.len(), "Project part updated");
      self.parts.insert(id, state);
    }

    for file in released {
      self.release(&file, &mut candidates);
    }
    self.refresh_all(&candidates);
    self.dispatch();
  }

  /// Forget whole project parts, purging files no other part lists.
  pub fn remove_project_parts(&mut self, ids: Vec<ProjectPartId>) {
    self.retry_purges();
    let mut candidates = Vec::new();
    for id in ids {
      let Some(state) = self.parts.remove(&id) else {
        continue;
      };
      debug!(part = %id, files = state.files.len(), "Project part removed");
      for file in state.files {
        if self.owners.get(&file) == Some(&id) {
          self.release(&file, &mut candidates);
        }
      }
    }
    self.refresh_all(&candidates);
    self.dispatch();
  }

  /// Hand a file to another listing part, or stop tracking it.
  fn release(&mut self, file: &Path, candidates: &mut Vec<PathBuf>) {
    let successor = self
      .parts
      .iter()
      .filter(|(_, state)| state.listed.contains(file))
      .map(|(id, _)| id)
      .min()
      .cloned();

    match successor {
      Some(owner) => {
        trace!(file = %file.display(), owner = %owner, "File ownership moved");
        self.owners.insert(file.to_path_buf(), owner);
        candidates.push(file.to_path_buf());
      }
      None => self.untrack(file),
    }
  }

  fn track(&mut self, file: &Path) {
    // Re-added before the purge ran: the committed facts are still good
    self.deferred_purges.remove(file);
    self.failed_purges.remove(file);
    self.watcher.add_paths([file]);
  }

  fn untrack(&mut self, file: &Path) {
    self.owners.remove(file);
    self.queue.remove_tasks_for(file);
    self.generations.remove(file);
    self.pending.remove(file);
    self.watcher.remove_paths([file]);
    self.cache.invalidate(file);

    if self.scheduler.is_running(file) {
      debug!(file = %file.display(), "Purge deferred until in-flight task finishes");
      self.deferred_purges.insert(file.to_path_buf());
    } else {
      self.purge(file);
    }
  }

  fn purge(&mut self, file: &Path) {
    match self.storage.purge(file) {
      Ok(removed) => {
        self.failed_purges.remove(file);
        if removed {
          self.counters.purged += 1;
          debug!(file = %file.display(), "Purged facts");
        } else {
          trace!(file = %file.display(), "Nothing to purge");
        }
      }
      Err(e) => {
        // Reported once; later retries only log
        if !self.failed_purges.insert(file.to_path_buf()) {
          warn!(file = %file.display(), error = %e, "Purge retry failed");
          return;
        }
        self.counters.failed += 1;
        error!(file = %file.display(), error = %e, "Purge failed, will retry");
        self.purge_failures.push(FailedFile {
          path: file.to_path_buf(),
          kind: FailureKind::Storage,
          error: e.to_string(),
        });
      }
    }
  }

  /// Purge again every untracked file whose purge failed earlier.
  fn retry_purges(&mut self) {
    if self.failed_purges.is_empty() {
      return;
    }
    let mut files: Vec<PathBuf> = self.failed_purges.iter().cloned().collect();
    files.sort();
    debug!(count = files.len(), "Retrying failed purges");
    for file in files {
      self.purge(&file);
    }
  }

  // --------------------------------------------------------------------------
  // Reconciliation
  // --------------------------------------------------------------------------

  /// Re-judge files reported as changed. Untracked paths are ignored.
  pub fn reconcile_paths(&mut self, paths: Vec<PathBuf>) {
    let mut candidates = Vec::with_capacity(paths.len());
    for path in paths {
      self.cache.invalidate(&path);
      if self.owners.contains_key(&path) {
        candidates.push(path);
      }
    }
    if candidates.is_empty() {
      return;
    }

    debug!(changed = candidates.len(), "Reconciling changed files");
    self.refresh_all(&candidates);
    self.dispatch();
  }

  /// Drop every cached stat and re-judge every tracked file.
  ///
  /// Catches changes the watcher missed.
  pub fn rescan(&mut self) {
    self.retry_purges();
    self.cache.clear();
    let mut files: Vec<PathBuf> = self.owners.keys().cloned().collect();
    files.sort();

    let queued = self.queue.len();
    self.refresh_all(&files);
    debug!(tracked = files.len(), enqueued = self.queue.len().saturating_sub(queued), "Rescan finished");
    self.dispatch();
  }

  fn refresh_all(&mut self, files: &[PathBuf]) {
    let mut seen = HashSet::with_capacity(files.len());
    for file in files {
      if seen.insert(file.as_path()) {
        self.refresh(file);
      }
    }
  }

  fn refresh(&mut self, file: &Path) {
    match self.judge(file) {
      Judgement::Stale(stat) => self.enqueue(file, stat),
      Judgement::UpToDate => self.cancel_pending(file),
      Judgement::InProgress | Judgement::Skip => {}
    }
  }

  fn judge(&mut self, file: &Path) -> Judgement {
    let Some(hash) = self.owner_state(file).map(|state| state.arguments_hash.clone()) else {
      return Judgement::Skip;
    };

    let stat = match self.cache.status(file) {
      Ok(stat) => stat,
      Err(e) => {
        warn!(file = %file.display(), error = %e, "Cannot stat file, keeping previous facts");
        return Judgement::Skip;
      }
    };

    if self
      .pending
      .get(file)
      .is_some_and(|work| work.stat == stat && work.arguments_hash == hash)
    {
      return Judgement::InProgress;
    }

    match self.storage.read_file_status(file) {
      Ok(Some(status)) if status.is_current(&stat, &hash) => Judgement::UpToDate,
      Ok(_) => Judgement::Stale(stat),
      Err(e) => {
        warn!(file = %file.display(), error = %e, "Cannot read committed status, re-indexing");
        Judgement::Stale(stat)
      }
    }
  }

  fn owner_state(&self, file: &Path) -> Option<&PartState> {
    self.owners.get(file).and_then(|owner| self.parts.get(owner))
  }

  /// The file is up to date: anything pending for it is redundant.
  fn cancel_pending(&mut self, file: &Path) {
    self.pending.remove(file);
    let dropped = self.queue.remove_tasks_for(file);
    if dropped > 0 || self.scheduler.is_running(file) {
      self.generations.remove(file);
      trace!(file = %file.display(), dropped, "Cancelled redundant work");
    }
  }

  fn enqueue(&mut self, file: &Path, stat: FileStat) {
    if self.scheduler.is_disabled() {
      return;
    }
    let Some(owner) = self.owners.get(file) else {
      return;
    };
    let Some(part) = self.parts.get(owner) else {
      return;
    };

    self.next_task += 1;
    let generation = self.next_task;
    self.generations.insert(file.to_path_buf(), generation);
    self.pending.insert(
      file.to_path_buf(),
      PendingWork {
        stat,
        arguments_hash: part.arguments_hash.clone(),
        generation,
      },
    );

    let meta = TaskMeta {
      id: TaskId(generation),
      path: file.to_path_buf(),
      project_part: owner.clone(),
      generation,
    };
    let continuation = commit_continuation(
      self.storage.clone(),
      self.generations.clone(),
      file.to_path_buf(),
      stat,
      part.arguments_hash.clone(),
      generation,
    );
    let task = IndexingTask::new(meta, part.arguments.clone(), continuation);

    trace!(file = %file.display(), generation, "File queued");
    if let Some(replaced) = self.queue.enqueue(task) {
      trace!(file = %file.display(), replaced = replaced.generation(), "Pending task replaced");
    }
  }

  fn dispatch(&mut self) -> usize {
    self.queue.process_entries(&mut self.scheduler)
  }

  // --------------------------------------------------------------------------
  // Generated files
  // --------------------------------------------------------------------------

  pub fn update_generated_files(&mut self, files: Vec<GeneratedFile>) {
    let changed = self.generated.update(files);
    self.generated_files_changed(changed);
  }

  pub fn remove_generated_files(&mut self, paths: Vec<PathBuf>) {
    let changed = self.generated.remove(&paths);
    self.generated_files_changed(changed);
  }

  /// Re-index every tracked file that reads one of `changed`.
  fn generated_files_changed(&mut self, changed: Vec<PathBuf>) {
    if changed.is_empty() {
      return;
    }
    self.scheduler.set_generated_files(self.generated.snapshot());

    let mut dependents = BTreeSet::new();
    for path in &changed {
      if self.owners.contains_key(path) {
        dependents.insert(path.clone());
      }
      match self.storage.dependents_of(path) {
        Ok(files) => dependents.extend(files.into_iter().filter(|file| self.owners.contains_key(file))),
        Err(e) => warn!(path = %path.display(), error = %e, "Cannot look up dependents of generated file"),
      }
    }

    debug!(changed = changed.len(), dependents = dependents.len(), "Generated files changed");
    for file in dependents {
      match self.cache.status(&file) {
        Ok(stat) => self.enqueue(&file, stat),
        Err(e) => warn!(file = %file.display(), error = %e, "Cannot stat dependent file"),
      }
    }
    self.dispatch();
  }

  // --------------------------------------------------------------------------
  // Watcher
  // --------------------------------------------------------------------------

  pub fn record_events(&mut self, events: Vec<FileEvent>) {
    self.watcher.record_events(events);
  }

  /// When the debounced watcher changes become due
  pub fn watch_deadline(&self) -> Option<Instant> {
    self.watcher.deadline()
  }

  /// Reconcile the settled watcher changes, if the debounce deadline has passed
  pub fn flush_watcher(&mut self, now: Instant) {
    let changed = self.watcher.take_due(now);
    if !changed.is_empty() {
      self.reconcile_paths(changed);
    }
  }

  // --------------------------------------------------------------------------
  // Completions
  // --------------------------------------------------------------------------

  /// Harvest finished tasks without waiting and dispatch more work.
  pub fn free_slots(&mut self) -> usize {
    let completions = self.scheduler.free_slots();
    let harvested = completions.len();
    for completion in &completions {
      self.handle_completion(completion);
    }
    self.dispatch();
    harvested
  }

  /// Run until the queue is empty and nothing is in flight.
  pub async fn sync_tasks(&mut self) -> SyncReport {
    self.retry_purges();
    let mut report = SyncReport::default();
    loop {
      for completion in self.scheduler.free_slots() {
        self.handle_completion(&completion);
        report.record(&completion);
      }
      self.dispatch();
      if self.scheduler.in_flight() == 0 {
        break;
      }
      for completion in self.scheduler.sync_tasks().await {
        self.handle_completion(&completion);
        report.record(&completion);
      }
    }
    report.failed.append(&mut self.purge_failures);
    report.sort();
    report
  }

  fn handle_completion(&mut self, completion: &TaskCompletion) {
    let file = completion.task.path.as_path();
    if self
      .pending
      .get(file)
      .is_some_and(|work| work.generation == completion.task.generation)
    {
      self.pending.remove(file);
    }

    match &completion.result {
      Ok(TaskOutcome::Committed(summary)) => {
        self.counters.committed += 1;
        debug!(
          file = %file.display(),
          generation = completion.task.generation,
          symbols = summary.symbols,
          usages = summary.usages,
          macros = summary.macros,
          "File indexed"
        );
      }
      Ok(TaskOutcome::Superseded) => {
        self.counters.superseded += 1;
        debug!(file = %file.display(), generation = completion.task.generation, "Discarded superseded result");
      }
      Err(TaskFailure::Storage(e)) => {
        self.counters.failed += 1;
        error!(file = %file.display(), error = %e, "Commit failed, index drifts until the file is re-indexed");
      }
      Err(e) => {
        self.counters.failed += 1;
        warn!(file = %file.display(), error = %e, "Indexing failed, keeping previous facts");
      }
    }

    if self.deferred_purges.remove(file) {
      self.purge(file);
    } else if self.owners.contains_key(file) {
      self.watcher.add_paths([file]);
    }
  }

  // --------------------------------------------------------------------------
  // Lifecycle
  // --------------------------------------------------------------------------

  /// Stop dispatching and discard queued tasks. In-flight tasks finish.
  pub fn disable(&mut self) {
    self.scheduler.disable();
    let dropped = self.queue.drain();
    for task in &dropped {
      self.pending.remove(task.path());
    }
    if !dropped.is_empty() {
      debug!(count = dropped.len(), "Discarded queued tasks");
    }
  }

  pub fn is_disabled(&self) -> bool {
    self.scheduler.is_disabled()
  }

  /// Stop the watcher, disable dispatch, and wait for in-flight tasks.
  pub async fn shutdown(&mut self) -> SyncReport {
    self.watcher.stop();
    self.disable();

    let mut report = SyncReport::default();
    for completion in self.scheduler.sync_tasks().await {
      self.handle_completion(&completion);
      report.record(&completion);
    }
    report.failed.append(&mut self.purge_failures);
    report.sort();

    info!(
      committed = self.counters.committed,
      failed = self.counters.failed,
      purged = self.counters.purged,
      "Symbol indexer stopped"
    );
    report
  }

  // --------------------------------------------------------------------------
  // Introspection
  // --------------------------------------------------------------------------

  pub fn stats(&self) -> IndexingStats {
    let pool = self.scheduler.pool();
    IndexingStats {
      project_parts: self.parts.len(),
      tracked: self.owners.len(),
      watched: self.watcher.len(),
      queued: self.queue.len(),
      in_flight: self.scheduler.in_flight(),
      processors: pool.created(),
      idle_processors: pool.idle_count(),
      committed: self.counters.committed,
      failed: self.counters.failed,
      superseded: self.counters.superseded,
      purged: self.counters.purged,
      pending_purges: self.failed_purges.len(),
    }
  }

  pub fn watched_paths(&self) -> Vec<PathBuf> {
    self.watcher.watched().cloned().collect()
  }

  pub fn tracked_files(&self) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = self.owners.keys().cloned().collect();
    files.sort();
    files
  }

  pub fn owner_of(&self, file: &Path) -> Option<&ProjectPartId> {
    self.owners.get(file)
  }

  pub fn queued(&self) -> usize {
    self.queue.len()
  }

  pub fn in_flight(&self) -> usize {
    self.scheduler.in_flight()
  }

  pub fn scheduler(&self) -> &TaskScheduler {
    &self.scheduler
  }

  pub fn storage(&self) -> &Storage {
    &self.storage
  }

  pub fn completion_signal(&self) -> Arc<Notify> {
    self.scheduler.completion_signal()
  }
}

/// Build the worker-side half of a task: commit if still current.
fn commit_continuation(
  storage: Storage,
  generations: Generations,
  path: PathBuf,
  stat: FileStat,
  arguments_hash: String,
  generation: u64,
) -> impl FnOnce(Result<CollectedFacts, CollectorError>) -> TaskResult + Send + 'static {
  move |collected: Result<CollectedFacts, CollectorError>| {
    let facts = collected?;

    // Copy the generation out: no map guard may be held across the commit.
    // Dispatch runs one task per path and purges wait for harvest, so a newer
    // version can only land after this commit.
    let current = generations.get(&path).map(|entry| *entry.value());
    if current != Some(generation) {
      return Ok(TaskOutcome::Superseded);
    }

    let status = FileStatus::new(path.clone(), stat, arguments_hash, generation);
    let summary = storage.commit(status, facts)?;
    Ok(TaskOutcome::Committed(summary))
  }
}
