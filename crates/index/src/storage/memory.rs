//! MemoryStore - an in-process fact store for embedding and tests

use std::{
  collections::HashMap,
  path::{Path, PathBuf},
};

use parking_lot::RwLock;
use symdex_core::{FileRecord, FileStatus, StorageError, SymbolId};

/// In-process [`FactStore`](super::FactStore).
///
/// Each commit swaps the whole record under a write lock, which gives the
/// per-file atomicity the pipeline relies on.
#[derive(Debug, Default)]
pub struct MemoryStore {
  records: RwLock<HashMap<PathBuf, FileRecord>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self.records.read().len()
  }

  pub fn is_empty(&self) -> bool {
    self.records.read().is_empty()
  }

  /// Stored files in path order
  pub fn paths(&self) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = self.records.read().keys().cloned().collect();
    paths.sort();
    paths
  }

  /// Files that declare or define `id`
  pub fn files_with_symbol(&self, id: &SymbolId) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = self
      .records
      .read()
      .values()
      .filter(|record| record.symbols.iter().any(|symbol| &symbol.id == id))
      .map(|record| record.status.path.clone())
      .collect();
    paths.sort();
    paths
  }
}

impl super::FactStore for MemoryStore {
  fn commit(&self, record: FileRecord) -> Result<(), StorageError> {
    self.records.write().insert(record.status.path.clone(), record);
    Ok(())
  }

  fn purge(&self, path: &Path) -> Result<bool, StorageError> {
    Ok(self.records.write().remove(path).is_some())
  }

  fn read_file_status(&self, path: &Path) -> Result<Option<FileStatus>, StorageError> {
    Ok(self.records.read().get(path).map(|record| record.status.clone()))
  }

  fn file_record(&self, path: &Path) -> Result<Option<FileRecord>, StorageError> {
    Ok(self.records.read().get(path).cloned())
  }

  fn dependents_of(&self, path: &Path) -> Result<Vec<PathBuf>, StorageError> {
    let mut dependents: Vec<PathBuf> = self
      .records
      .read()
      .values()
      .filter(|record| record.dependencies.iter().any(|dependency| dependency == path))
      .map(|record| record.status.path.clone())
      .collect();
    dependents.sort();
    Ok(dependents)
  }
}
