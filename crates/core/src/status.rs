use std::{
  path::{Path, PathBuf},
  time::{SystemTime, UNIX_EPOCH},
};

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// On-disk observation of a file: modification time and size.
///
/// Content is never hashed. A touch that only moves the mtime counts as a
/// change and triggers re-indexing (conservative staleness).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileStat {
  /// Modification time (Unix timestamp in milliseconds)
  pub modified_ms: i64,
  /// File size in bytes
  pub size: u64,
}

impl FileStat {
  pub fn new(modified_ms: i64, size: u64) -> Self {
    Self { modified_ms, size }
  }

  pub fn from_metadata(metadata: &std::fs::Metadata) -> Self {
    let modified_ms = metadata
      .modified()
      .ok()
      .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
      .map(|d| d.as_millis() as i64)
      .unwrap_or(0);

    Self {
      modified_ms,
      size: metadata.len(),
    }
  }

  pub fn read(path: &Path) -> std::io::Result<Self> {
    std::fs::metadata(path).map(|m| Self::from_metadata(&m))
  }

  pub fn modified(&self) -> SystemTime {
    UNIX_EPOCH + std::time::Duration::from_millis(self.modified_ms.max(0) as u64)
  }
}

/// Status committed together with a file's facts.
///
/// Only ever written by a successful commit; a failed task leaves the
/// previous status untouched so the file stays a retry candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStatus {
  pub path: PathBuf,
  pub stat: FileStat,
  /// Hash of the compiler arguments the facts were collected with
  pub arguments_hash: String,
  /// Generation of the task that produced the committed facts
  pub version: u64,
  /// When the facts were committed (Unix timestamp in milliseconds)
  pub indexed_at_ms: i64,
}

impl FileStatus {
  pub fn new(path: PathBuf, stat: FileStat, arguments_hash: String, version: u64) -> Self {
    Self {
      path,
      stat,
      arguments_hash,
      version,
      indexed_at_ms: Utc::now().timestamp_millis(),
    }
  }

  /// True when the committed facts still describe `stat` collected with `arguments_hash`
  pub fn is_current(&self, stat: &FileStat, arguments_hash: &str) -> bool {
    self.stat == *stat && self.arguments_hash == arguments_hash
  }
}
