//! UsedMacroAndSourceStorage - normalises macro usage and source dependency facts

use std::path::{Path, PathBuf};

use symdex_core::UsedMacro;

#[derive(Debug, Clone, Copy, Default)]
pub struct UsedMacroAndSourceStorage;

impl UsedMacroAndSourceStorage {
  pub fn new() -> Self {
    Self
  }

  /// Sort by name then location, dropping duplicates
  pub fn normalize_macros(&self, mut macros: Vec<UsedMacro>) -> Vec<UsedMacro> {
    macros.sort();
    macros.dedup();
    macros
  }

  /// Sorted, unique dependencies of `file`, excluding the file itself
  pub fn normalize_dependencies(&self, file: &Path, mut dependencies: Vec<PathBuf>) -> Vec<PathBuf> {
    dependencies.retain(|dependency| dependency != file);
    dependencies.sort();
    dependencies.dedup();
    dependencies
  }
}
