//! PathWatcher - debounced filesystem change detection for tracked files
//!
//! The watcher keeps the set of files whose changes should trigger
//! re-indexing. It does not poll: a [`WatchBackend`] subscribes to the
//! parent directories of watched files and raw events are fed back in via
//! [`PathWatcher::record_events`].
//!
//! # Design
//!
//! - notify's sync callback forwards converted events to the control loop
//! - every recorded batch restarts the debounce timer
//! - when the timer fires, the pending paths are intersected with the
//!   watch set and handed to the indexer
//!
//! Directories are reference counted so removing the last watched file in
//! a directory drops the subscription.

use std::{
  collections::{BTreeSet, HashMap, HashSet},
  path::{Path, PathBuf},
  time::Duration,
};

use notify::{
  Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
  event::{ModifyKind, RenameMode},
};
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::error::WatcherError;

// ============================================================================
// Events
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
  Created,
  Modified,
  Removed,
}

/// A raw, undebounced change to one path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
  pub path: PathBuf,
  pub kind: ChangeKind,
}

impl FileEvent {
  pub fn new(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
    Self {
      path: path.into(),
      kind,
    }
  }

  pub fn modified(path: impl Into<PathBuf>) -> Self {
    Self::new(path, ChangeKind::Modified)
  }
}

/// Translate a notify event into per-path changes.
///
/// Renames become a removal of the old path and a creation of the new one.
/// Access events carry no content change and are dropped.
pub fn events_from_notify(event: Event) -> Vec<FileEvent> {
  let kind = match event.kind {
    EventKind::Create(_) => ChangeKind::Created,
    EventKind::Remove(_) => ChangeKind::Removed,
    EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if event.paths.len() == 2 => {
      let mut paths = event.paths.into_iter();
      let (Some(from), Some(to)) = (paths.next(), paths.next()) else {
        return Vec::new();
      };
      return vec![
        FileEvent::new(from, ChangeKind::Removed),
        FileEvent::new(to, ChangeKind::Created),
      ];
    }
    EventKind::Modify(ModifyKind::Name(RenameMode::From)) => ChangeKind::Removed,
    EventKind::Modify(ModifyKind::Name(RenameMode::To)) => ChangeKind::Created,
    EventKind::Modify(_) | EventKind::Any => ChangeKind::Modified,
    EventKind::Access(_) | EventKind::Other => return Vec::new(),
  };

  event.paths.into_iter().map(|path| FileEvent::new(path, kind)).collect()
}

// ============================================================================
// Backends
// ============================================================================

/// Subscribes to change notifications for directories
pub trait WatchBackend: Send {
  fn watch_dir(&mut self, dir: &Path) -> Result<(), WatcherError>;
  fn unwatch_dir(&mut self, dir: &Path) -> Result<(), WatcherError>;
}

/// Native filesystem notifications through `notify`
pub struct NotifyBackend {
  watcher: RecommendedWatcher,
}

impl NotifyBackend {
  /// Create a backend that calls `sink` with every converted event batch.
  ///
  /// `sink` runs on notify's thread and must not block for long.
  pub fn new<F>(sink: F) -> Result<Self, WatcherError>
  where
    F: Fn(Vec<FileEvent>) + Send + 'static,
  {
    let watcher = RecommendedWatcher::new(
      move |res: Result<Event, notify::Error>| match res {
        Ok(event) => {
          let events = events_from_notify(event);
          if !events.is_empty() {
            sink(events);
          }
        }
        Err(e) => warn!(error = %e, "Watch error"),
      },
      Config::default(),
    )
    .map_err(WatcherError::Init)?;

    Ok(Self { watcher })
  }
}

impl WatchBackend for NotifyBackend {
  fn watch_dir(&mut self, dir: &Path) -> Result<(), WatcherError> {
    self
      .watcher
      .watch(dir, RecursiveMode::NonRecursive)
      .map_err(|source| WatcherError::Watch {
        path: dir.to_path_buf(),
        source,
      })
  }

  fn unwatch_dir(&mut self, dir: &Path) -> Result<(), WatcherError> {
    self.watcher.unwatch(dir).map_err(|source| WatcherError::Watch {
      path: dir.to_path_buf(),
      source,
    })
  }
}

// ============================================================================
// PathWatcher
// ============================================================================

pub struct PathWatcher {
  watched: BTreeSet<PathBuf>,
  directories: HashMap<PathBuf, usize>,
  backend: Option<Box<dyn WatchBackend>>,
  debounce: Duration,
  pending: HashSet<PathBuf>,
  deadline: Option<Instant>,
}

impl PathWatcher {
  pub fn new(backend: Option<Box<dyn WatchBackend>>, debounce: Duration) -> Self {
    Self {
      watched: BTreeSet::new(),
      directories: HashMap::new(),
      backend,
      debounce,
      pending: HashSet::new(),
      deadline: None,
    }
  }

  /// Start watching `paths`. Already watched paths are ignored.
  pub fn add_paths<I, P>(&mut self, paths: I)
  where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
  {
    for path in paths {
      let path = path.as_ref();
      if !self.watched.insert(path.to_path_buf()) {
        continue;
      }
      let Some(dir) = path.parent() else {
        continue;
      };
      let count = self.directories.entry(dir.to_path_buf()).or_insert(0);
      *count += 1;
      if *count == 1
        && let Some(backend) = self.backend.as_mut()
      {
        match backend.watch_dir(dir) {
          Ok(()) => debug!(dir = %dir.display(), "Watching directory"),
          Err(e) => warn!(error = %e, "Cannot watch directory, changes there will be missed"),
        }
      }
    }
  }

  /// Stop watching `paths`. Unknown paths are ignored.
  pub fn remove_paths<I, P>(&mut self, paths: I)
  where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
  {
    for path in paths {
      let path = path.as_ref();
      if !self.watched.remove(path) {
        continue;
      }
      self.pending.remove(path);
      let Some(dir) = path.parent() else {
        continue;
      };
      let Some(count) = self.directories.get_mut(dir) else {
        continue;
      };
      *count -= 1;
      if *count == 0 {
        self.directories.remove(dir);
        if let Some(backend) = self.backend.as_mut() {
          match backend.unwatch_dir(dir) {
            Ok(()) => debug!(dir = %dir.display(), "Stopped watching directory"),
            Err(e) => trace!(error = %e, "Unwatch failed"),
          }
        }
      }
    }
  }

  pub fn is_watched(&self, path: &Path) -> bool {
    self.watched.contains(path)
  }

  /// Watched files in path order
  pub fn watched(&self) -> impl Iterator<Item = &PathBuf> {
    self.watched.iter()
  }

  pub fn len(&self) -> usize {
    self.watched.len()
  }

  pub fn is_empty(&self) -> bool {
    self.watched.is_empty()
  }

  pub fn watched_directories(&self) -> usize {
    self.directories.len()
  }

  /// Record raw events and restart the debounce timer.
  ///
  /// Events for unwatched paths are dropped here; events inside a watched
  /// directory arrive for every file in it.
  pub fn record_events(&mut self, events: Vec<FileEvent>) {
    let mut recorded = 0usize;
    for event in events {
      if self.watched.contains(&event.path) {
        trace!(path = %event.path.display(), kind = ?event.kind, "Change recorded");
        self.pending.insert(event.path);
        recorded += 1;
      }
    }
    if recorded > 0 {
      self.deadline = Some(Instant::now() + self.debounce);
    }
  }

  /// When the pending changes settle, if any are pending
  pub fn deadline(&self) -> Option<Instant> {
    self.deadline
  }

  pub fn pending_count(&self) -> usize {
    self.pending.len()
  }

  /// Take the settled change set if the debounce deadline has passed.
  ///
  /// The result is sorted and restricted to paths still being watched.
  pub fn take_due(&mut self, now: Instant) -> Vec<PathBuf> {
    match self.deadline {
      Some(deadline) if now >= deadline => {}
      _ => return Vec::new(),
    }
    self.deadline = None;

    let mut changed: Vec<PathBuf> = self
      .pending
      .drain()
      .filter(|path| self.watched.contains(path))
      .collect();
    changed.sort();
    changed
  }

  /// Release the backend subscription and forget pending changes
  pub fn stop(&mut self) {
    if self.backend.take().is_some() {
      debug!(directories = self.directories.len(), "Watcher stopped");
    }
    self.pending.clear();
    self.deadline = None;
  }
}
