//! Symbol, macro and source-usage facts produced by a collector.
//!
//! Facts are always attributed to the file that contributed them. A store
//! keeps exactly one [`FileRecord`] per file, so re-indexing a file is a
//! full replace of its record and never an incremental patch.

use std::{fmt, path::PathBuf};

use serde::{Deserialize, Serialize};

use crate::status::FileStatus;

/// Stable, translation-unit independent symbol identifier (a USR-like key)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SymbolId(String);

impl SymbolId {
  pub fn new(id: impl Into<String>) -> Self {
    Self(id.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for SymbolId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
  Function,
  Variable,
  Type,
  Enumeration,
  Namespace,
  Macro,
  Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceLocation {
  pub line: u32,
  pub column: u32,
}

impl SourceLocation {
  pub fn new(line: u32, column: u32) -> Self {
    Self { line, column }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Symbol {
  pub id: SymbolId,
  pub name: String,
  pub kind: SymbolKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageKind {
  Declaration,
  Definition,
  Reference,
}

/// One occurrence of a symbol inside the contributing file
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SymbolUsage {
  pub symbol: SymbolId,
  pub kind: UsageKind,
  pub location: SourceLocation,
}

/// A macro expanded or tested by the contributing file
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UsedMacro {
  pub name: String,
  pub location: SourceLocation,
}

/// Raw output of one collector run, before normalisation by the storage adapters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectedFacts {
  pub symbols: Vec<Symbol>,
  pub usages: Vec<SymbolUsage>,
  pub macros: Vec<UsedMacro>,
  /// Files read while collecting (includes, generated files)
  pub dependencies: Vec<PathBuf>,
}

impl CollectedFacts {
  pub fn is_empty(&self) -> bool {
    self.symbols.is_empty() && self.usages.is_empty() && self.macros.is_empty() && self.dependencies.is_empty()
  }
}

/// Everything a store keeps for one file; committed and replaced as a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
  pub status: FileStatus,
  pub symbols: Vec<Symbol>,
  pub usages: Vec<SymbolUsage>,
  pub macros: Vec<UsedMacro>,
  pub dependencies: Vec<PathBuf>,
}

impl FileRecord {
  pub fn path(&self) -> &std::path::Path {
    &self.status.path
  }
}
