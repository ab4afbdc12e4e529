use symdex_core::{CollectorError, StorageError};
use thiserror::Error;

/// Why an indexing task did not commit.
///
/// None of these touch previously committed facts. The file keeps its old
/// status and is picked up again by the next reconciliation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskFailure {
  #[error(transparent)]
  Collector(#[from] CollectorError),

  #[error(transparent)]
  Storage(#[from] StorageError),

  #[error("Collector panicked: {0}")]
  Panicked(String),
}

#[derive(Error, Debug)]
pub enum WatcherError {
  #[error("Failed to initialize watcher: {0}")]
  Init(#[source] notify::Error),

  #[error("Failed to watch {path}: {source}")]
  Watch {
    path: std::path::PathBuf,
    #[source]
    source: notify::Error,
  },
}

#[derive(Error, Debug)]
pub enum IndexingError {
  #[error("Watcher error: {0}")]
  Watcher(#[from] WatcherError),

  #[error(transparent)]
  Send(#[from] crate::handle::SendError),

  #[error("Indexing control loop failed: {0}")]
  ControlLoop(#[from] tokio::task::JoinError),
}
