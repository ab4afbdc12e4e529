use std::path::PathBuf;

use thiserror::Error;

/// Failure raised by a collector while extracting facts from one file.
///
/// A collector fault never touches previously committed facts: the file
/// degrades to "stale" and is retried on the next reconciliation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollectorError {
  #[error("Cannot read {path}: {message}")]
  Unreadable { path: PathBuf, message: String },

  #[error("Parse failed for {path}: {message}")]
  Parse { path: PathBuf, message: String },

  #[error("Collector fault: {0}")]
  Other(String),
}

impl CollectorError {
  pub fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
    Self::Parse {
      path: path.into(),
      message: message.into(),
    }
  }
}

/// Failure raised by the transactional fact store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
  #[error("Commit failed for {path}: {message}")]
  Commit { path: PathBuf, message: String },

  #[error("Purge failed for {path}: {message}")]
  Purge { path: PathBuf, message: String },

  #[error("Read failed: {0}")]
  Read(String),

  #[error("Store unavailable: {0}")]
  Unavailable(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("IO: {0}")]
  Io(#[from] std::io::Error),

  #[error("Invalid config: {0}")]
  Parse(#[from] toml::de::Error),

  #[error("Cannot serialize config: {0}")]
  Serialize(#[from] toml::ser::Error),
}
