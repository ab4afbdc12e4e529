//! Handle for talking to the indexing control loop
//!
//! The handle is cheap to clone and can be shared across tasks. Fire-and-
//! forget commands return once the command is queued; request/response
//! commands wait for the control loop's answer.

use std::path::PathBuf;

use symdex_core::{GeneratedFile, ProjectPart, ProjectPartId};
use tokio::sync::{mpsc, oneshot};

use crate::{
  indexer::{IndexingStats, SyncReport},
  message::IndexingCommand,
  watcher::FileEvent,
};

#[derive(Clone, Debug)]
pub struct IndexingHandle {
  tx: mpsc::Sender<IndexingCommand>,
}

impl IndexingHandle {
  pub fn new(tx: mpsc::Sender<IndexingCommand>) -> Self {
    Self { tx }
  }

  pub async fn send(&self, command: IndexingCommand) -> Result<(), SendError> {
    self.tx.send(command).await.map_err(|_| SendError::ActorGone)
  }

  async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> IndexingCommand) -> Result<T, SendError> {
    let (reply_tx, reply_rx) = oneshot::channel();
    self.send(command(reply_tx)).await?;
    reply_rx.await.map_err(|_| SendError::ActorGone)
  }

  /// Queue a reconciliation of `parts`; indexing proceeds in the background
  pub async fn update_project_parts(&self, parts: Vec<ProjectPart>) -> Result<(), SendError> {
    self.send(IndexingCommand::UpdateProjectParts { parts }).await
  }

  pub async fn remove_project_parts(&self, ids: Vec<ProjectPartId>) -> Result<(), SendError> {
    self.send(IndexingCommand::RemoveProjectParts { ids }).await
  }

  pub async fn update_generated_files(&self, files: Vec<GeneratedFile>) -> Result<(), SendError> {
    self.send(IndexingCommand::UpdateGeneratedFiles { files }).await
  }

  pub async fn remove_generated_files(&self, paths: Vec<PathBuf>) -> Result<(), SendError> {
    self.send(IndexingCommand::RemoveGeneratedFiles { paths }).await
  }

  /// Feed raw change events from an external source
  pub async fn file_events(&self, events: Vec<FileEvent>) -> Result<(), SendError> {
    self.send(IndexingCommand::FileEvents { events }).await
  }

  pub async fn rescan(&self) -> Result<(), SendError> {
    self.send(IndexingCommand::Rescan).await
  }

  /// Wait until every queued and in-flight task has finished
  pub async fn sync_tasks(&self) -> Result<SyncReport, SendError> {
    self.request(|reply| IndexingCommand::SyncTasks { reply }).await
  }

  /// Stop dispatching new work; returns once queued tasks are discarded
  pub async fn disable(&self) -> Result<(), SendError> {
    self.request(|reply| IndexingCommand::Disable { reply }).await
  }

  pub async fn stats(&self) -> Result<IndexingStats, SendError> {
    self.request(|reply| IndexingCommand::Stats { reply }).await
  }

  pub async fn watched_paths(&self) -> Result<Vec<PathBuf>, SendError> {
    self.request(|reply| IndexingCommand::WatchedPaths { reply }).await
  }

  pub async fn shutdown(&self) -> Result<(), SendError> {
    self.send(IndexingCommand::Shutdown).await
  }
}

/// Error when sending to the control loop
#[derive(Debug, Clone, thiserror::Error)]
pub enum SendError {
  #[error("Indexing control loop has shut down")]
  ActorGone,
}
