//! Storage - the commit side of the pipeline
//!
//! [`Storage`] combines the two fact adapters with a transactional
//! [`FactStore`]. Every commit writes one complete [`FileRecord`] for one
//! file: the file's previous facts are replaced in the same transaction, so
//! readers never observe a half-indexed file.

mod macros;
mod memory;
mod symbols;

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use symdex_core::{CollectedFacts, FileRecord, FileStatus, StorageError};
use tracing::trace;

pub use macros::UsedMacroAndSourceStorage;
pub use memory::MemoryStore;
pub use symbols::SymbolStorage;

use crate::task::CommitSummary;

/// A transactional, queryable store of per-file facts.
///
/// Implementations must make `commit` atomic per file and safe to call
/// from several worker threads at once for different files.
pub trait FactStore: Send + Sync {
  /// Replace everything stored for `record.path()` with `record`
  fn commit(&self, record: FileRecord) -> Result<(), StorageError>;

  /// Remove all facts and the status of `path`. Returns whether anything was stored.
  fn purge(&self, path: &Path) -> Result<bool, StorageError>;

  fn read_file_status(&self, path: &Path) -> Result<Option<FileStatus>, StorageError>;

  fn file_record(&self, path: &Path) -> Result<Option<FileRecord>, StorageError>;

  /// Files whose committed record lists `path` as a dependency
  fn dependents_of(&self, path: &Path) -> Result<Vec<PathBuf>, StorageError>;
}

#[derive(Clone)]
pub struct Storage {
  store: Arc<dyn FactStore>,
  symbols: SymbolStorage,
  macros: UsedMacroAndSourceStorage,
}

impl Storage {
  pub fn new(store: Arc<dyn FactStore>) -> Self {
    Self {
      store,
      symbols: SymbolStorage::new(),
      macros: UsedMacroAndSourceStorage::new(),
    }
  }

  /// Normalise `facts` and commit them together with `status` in one transaction.
  pub fn commit(&self, status: FileStatus, facts: CollectedFacts) -> Result<CommitSummary, StorageError> {
    let CollectedFacts {
      symbols,
      usages,
      macros,
      dependencies,
    } = facts;

    let record = FileRecord {
      symbols: self.symbols.normalize_symbols(symbols),
      usages: self.symbols.normalize_usages(usages),
      macros: self.macros.normalize_macros(macros),
      dependencies: self.macros.normalize_dependencies(&status.path, dependencies),
      status,
    };
    let summary = CommitSummary {
      symbols: record.symbols.len(),
      usages: record.usages.len(),
      macros: record.macros.len(),
      dependencies: record.dependencies.len(),
    };

    trace!(
      path = %record.path().display(),
      version = record.status.version,
      symbols = summary.symbols,
      usages = summary.usages,
      macros = summary.macros,
      "Committing file record"
    );
    self.store.commit(record)?;
    Ok(summary)
  }

  pub fn purge(&self, path: &Path) -> Result<bool, StorageError> {
    self.store.purge(path)
  }

  pub fn read_file_status(&self, path: &Path) -> Result<Option<FileStatus>, StorageError> {
    self.store.read_file_status(path)
  }

  pub fn dependents_of(&self, path: &Path) -> Result<Vec<PathBuf>, StorageError> {
    self.store.dependents_of(path)
  }

  pub fn store(&self) -> &Arc<dyn FactStore> {
    &self.store
  }
}

impl std::fmt::Debug for Storage {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Storage").finish_non_exhaustive()
  }
}
