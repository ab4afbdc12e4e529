//! FileStatusCache - memoised filesystem stats
//!
//! Reconciliation asks for the stat of every tracked file, often several
//! times per update. The cache answers from memory until the entry is
//! invalidated, which happens whenever the watcher reports the path or a
//! full rescan runs.

use std::{
  collections::HashMap,
  io,
  path::{Path, PathBuf},
};

use symdex_core::FileStat;
use tracing::trace;

#[derive(Debug, Default)]
pub struct FileStatusCache {
  entries: HashMap<PathBuf, FileStat>,
  hits: u64,
  misses: u64,
}

impl FileStatusCache {
  pub fn new() -> Self {
    Self::default()
  }

  /// Cached stat for `path`, reading the filesystem on a miss.
  ///
  /// Errors are not cached: a missing or unreadable file is asked about again next time.
  pub fn status(&mut self, path: &Path) -> io::Result<FileStat> {
    if let Some(stat) = self.entries.get(path) {
      self.hits += 1;
      return Ok(*stat);
    }

    self.misses += 1;
    let stat = FileStat::read(path)?;
    trace!(path = %path.display(), modified_ms = stat.modified_ms, size = stat.size, "Stat cached");
    self.entries.insert(path.to_path_buf(), stat);
    Ok(stat)
  }

  /// Forget the cached stat so the next lookup hits the filesystem
  pub fn invalidate(&mut self, path: &Path) -> bool {
    self.entries.remove(path).is_some()
  }

  pub fn clear(&mut self) {
    self.entries.clear();
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn hits(&self) -> u64 {
    self.hits
  }

  pub fn misses(&self) -> u64 {
    self.misses
  }
}
