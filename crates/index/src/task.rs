//! Indexing tasks
//!
//! A task is one unit of work: parse one file with the arguments of the
//! project part that owns it, then hand the collected facts to a
//! continuation that commits them. The continuation runs on the worker
//! thread right after collection so commits never wait on the control loop.

use std::{
  fmt,
  path::{Path, PathBuf},
  sync::Arc,
};

use serde::Serialize;
use symdex_core::{CollectedFacts, CollectorError, GeneratedFile, ProjectPartId};

use crate::{
  collector::{CollectRequest, Collector},
  error::TaskFailure,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "task-{}", self.0)
  }
}

/// Counts of the normalised facts written by one commit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CommitSummary {
  pub symbols: usize,
  pub usages: usize,
  pub macros: usize,
  pub dependencies: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
  Committed(CommitSummary),
  /// A newer task for the same file was enqueued while this one ran
  Superseded,
}

pub type TaskResult = Result<TaskOutcome, TaskFailure>;

pub type Continuation = Box<dyn FnOnce(Result<CollectedFacts, CollectorError>) -> TaskResult + Send>;

/// Identity of a task, kept by the scheduler while the task itself is on a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskMeta {
  pub id: TaskId,
  pub path: PathBuf,
  pub project_part: ProjectPartId,
  pub generation: u64,
}

pub struct IndexingTask {
  meta: TaskMeta,
  arguments: Arc<[String]>,
  continuation: Continuation,
}

impl IndexingTask {
  pub fn new<F>(meta: TaskMeta, arguments: Arc<[String]>, continuation: F) -> Self
  where
    F: FnOnce(Result<CollectedFacts, CollectorError>) -> TaskResult + Send + 'static,
  {
    Self {
      meta,
      arguments,
      continuation: Box::new(continuation),
    }
  }

  pub fn id(&self) -> TaskId {
    self.meta.id
  }

  pub fn path(&self) -> &Path {
    &self.meta.path
  }

  pub fn generation(&self) -> u64 {
    self.meta.generation
  }

  pub fn meta(&self) -> &TaskMeta {
    &self.meta
  }

  pub fn arguments(&self) -> &[String] {
    &self.arguments
  }

  /// Collect facts and pass them to the continuation. Runs on a worker thread.
  pub(crate) fn run(self, collector: &mut dyn Collector, generated_files: &[GeneratedFile]) -> TaskResult {
    let request = CollectRequest {
      path: &self.meta.path,
      arguments: &self.arguments,
      generated_files,
    };
    let collected = collector.collect(&request);
    (self.continuation)(collected)
  }
}

impl fmt::Debug for IndexingTask {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("IndexingTask")
      .field("meta", &self.meta)
      .field("arguments", &self.arguments)
      .finish_non_exhaustive()
  }
}

/// A finished task as reported back to the control loop
#[derive(Debug, Clone)]
pub struct TaskCompletion {
  pub task: TaskMeta,
  pub result: TaskResult,
}

impl TaskCompletion {
  pub fn is_committed(&self) -> bool {
    matches!(self.result, Ok(TaskOutcome::Committed(_)))
  }
}
