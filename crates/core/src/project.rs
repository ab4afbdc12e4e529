//! Project parts: groups of source files sharing one compiler argument set.

use std::{fmt, path::PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Identifier of a project part, stable across `update_project_parts` calls.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectPartId(String);

impl ProjectPartId {
  pub fn new(id: impl Into<String>) -> Self {
    Self(id.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for ProjectPartId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl From<&str> for ProjectPartId {
  fn from(value: &str) -> Self {
    Self::new(value)
  }
}

/// Immutable snapshot of a project part as handed over by the project model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectPart {
  pub id: ProjectPartId,
  /// Source files in submission order
  pub files: Vec<PathBuf>,
  /// Compiler arguments shared by every file of the part
  pub arguments: Vec<String>,
}

impl ProjectPart {
  pub fn new(id: impl Into<ProjectPartId>, files: Vec<PathBuf>, arguments: Vec<String>) -> Self {
    Self {
      id: id.into(),
      files,
      arguments,
    }
  }

  /// Hash of the compiler arguments, compared against committed file status
  pub fn arguments_hash(&self) -> String {
    arguments_hash(&self.arguments)
  }
}

/// SHA-256 (hex) over the compiler arguments.
///
/// Each argument is length-prefixed so `["-DA", "B"]` and `["-D", "AB"]`
/// hash differently.
pub fn arguments_hash(arguments: &[String]) -> String {
  let mut hasher = Sha256::new();
  for argument in arguments {
    hasher.update((argument.len() as u64).to_le_bytes());
    hasher.update(argument.as_bytes());
  }
  hex::encode(hasher.finalize())
}
