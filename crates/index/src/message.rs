//! Commands accepted by the indexing control loop
//!
//! Every state change goes through the control loop, including raw watcher
//! events: notify's callback thread never touches indexer state directly.
//! Requests that need an answer carry a `oneshot` reply channel.

use std::path::PathBuf;

use symdex_core::{GeneratedFile, ProjectPart, ProjectPartId};
use tokio::sync::oneshot;

use crate::{
  indexer::{IndexingStats, SyncReport},
  watcher::FileEvent,
};

#[derive(Debug)]
pub enum IndexingCommand {
  /// Reconcile the given parts (fire-and-forget)
  UpdateProjectParts { parts: Vec<ProjectPart> },
  RemoveProjectParts { ids: Vec<ProjectPartId> },
  UpdateGeneratedFiles { files: Vec<GeneratedFile> },
  RemoveGeneratedFiles { paths: Vec<PathBuf> },
  /// Raw filesystem events, debounced by the watcher
  FileEvents { events: Vec<FileEvent> },
  /// Re-judge every tracked file, bypassing the status cache
  Rescan,
  /// Drain the queue and wait for in-flight tasks
  SyncTasks { reply: oneshot::Sender<SyncReport> },
  Disable { reply: oneshot::Sender<()> },
  Stats { reply: oneshot::Sender<IndexingStats> },
  WatchedPaths { reply: oneshot::Sender<Vec<PathBuf>> },
  Shutdown,
}
