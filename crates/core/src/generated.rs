//! In-memory overlays for generated (not yet written) files.
//!
//! Collectors see the overlay content instead of the on-disk file. The set
//! is owned by the control loop and shared with running tasks as an
//! immutable snapshot.

use std::{
  collections::BTreeMap,
  path::{Path, PathBuf},
  sync::Arc,
};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedFile {
  pub path: PathBuf,
  pub content: String,
}

impl GeneratedFile {
  pub fn new(path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
    Self {
      path: path.into(),
      content: content.into(),
    }
  }
}

#[derive(Debug, Default)]
pub struct GeneratedFiles {
  files: BTreeMap<PathBuf, String>,
  snapshot: Arc<[GeneratedFile]>,
}

impl GeneratedFiles {
  pub fn new() -> Self {
    Self::default()
  }

  /// Insert or replace overlays. Returns the paths whose content actually changed.
  pub fn update(&mut self, files: Vec<GeneratedFile>) -> Vec<PathBuf> {
    let mut changed = Vec::new();
    for file in files {
      if self.files.get(&file.path) != Some(&file.content) {
        changed.push(file.path.clone());
        self.files.insert(file.path, file.content);
      }
    }
    if !changed.is_empty() {
      self.rebuild_snapshot();
    }
    changed
  }

  /// Drop overlays. Returns the paths that were present.
  pub fn remove(&mut self, paths: &[PathBuf]) -> Vec<PathBuf> {
    let removed: Vec<PathBuf> = paths.iter().filter(|p| self.files.remove(*p).is_some()).cloned().collect();
    if !removed.is_empty() {
      self.rebuild_snapshot();
    }
    removed
  }

  pub fn get(&self, path: &Path) -> Option<&str> {
    self.files.get(path).map(String::as_str)
  }

  pub fn len(&self) -> usize {
    self.files.len()
  }

  pub fn is_empty(&self) -> bool {
    self.files.is_empty()
  }

  /// Cheap clone of the current overlay set for handing to a task
  pub fn snapshot(&self) -> Arc<[GeneratedFile]> {
    self.snapshot.clone()
  }

  fn rebuild_snapshot(&mut self) {
    self.snapshot = self
      .files
      .iter()
      .map(|(path, content)| GeneratedFile::new(path.clone(), content.clone()))
      .collect();
  }
}
