//! TaskScheduler - runs indexing tasks on pooled collectors
//!
//! Each accepted task gets a processor from the [`ProcessorPool`] and runs
//! on a blocking worker thread. Workers report back through a completion
//! channel and ping a shared [`Notify`] so the control loop can harvest
//! without polling.
//!
//! Two invariants hold at all times:
//! - at most `limit` tasks are in flight
//! - at most one task per file is in flight

use std::{
  any::Any,
  collections::HashMap,
  panic::{AssertUnwindSafe, catch_unwind},
  path::Path,
  sync::Arc,
};

use symdex_core::GeneratedFile;
use tokio::sync::{Notify, mpsc};
use tracing::{debug, trace, warn};

use crate::{
  error::TaskFailure,
  pool::{Processor, ProcessorPool},
  task::{IndexingTask, TaskCompletion, TaskId, TaskMeta, TaskResult},
};

/// A task that left its worker, successfully or not
struct FinishedTask {
  id: TaskId,
  processor: Processor,
  result: TaskResult,
}

struct RunningTask {
  meta: TaskMeta,
  processor_id: usize,
}

pub struct TaskScheduler {
  pool: ProcessorPool,
  limit: usize,
  running: HashMap<TaskId, RunningTask>,
  disabled: bool,
  generated_files: Arc<[GeneratedFile]>,
  finished_tx: mpsc::UnboundedSender<FinishedTask>,
  finished_rx: mpsc::UnboundedReceiver<FinishedTask>,
  signal: Arc<Notify>,
}

impl TaskScheduler {
  pub fn new(pool: ProcessorPool, limit: usize) -> Self {
    let (finished_tx, finished_rx) = mpsc::unbounded_channel();
    let limit = limit.clamp(1, pool.capacity());
    Self {
      pool,
      limit,
      running: HashMap::new(),
      disabled: false,
      generated_files: Arc::from(Vec::new()),
      finished_tx,
      finished_rx,
      signal: Arc::new(Notify::new()),
    }
  }

  /// Start as many of `tasks` as there are free slots.
  ///
  /// Returns the tasks that could not be started, in their original order.
  /// A disabled scheduler starts nothing and drops the tasks.
  pub fn schedule(&mut self, tasks: Vec<IndexingTask>) -> Vec<IndexingTask> {
    if self.disabled {
      if !tasks.is_empty() {
        debug!(count = tasks.len(), "Scheduler disabled, discarding tasks");
      }
      return Vec::new();
    }

    let mut rejected = Vec::new();
    for task in tasks {
      if self.running.len() >= self.limit || self.is_running(task.path()) {
        rejected.push(task);
        continue;
      }
      match self.pool.acquire(task.id()) {
        Some(processor) => self.start(task, processor),
        None => rejected.push(task),
      }
    }
    rejected
  }

  fn start(&mut self, task: IndexingTask, processor: Processor) {
    let meta = task.meta().clone();
    let id = meta.id;
    trace!(task = %id, path = %meta.path.display(), generation = meta.generation, "Starting task");

    self.running.insert(
      id,
      RunningTask {
        meta,
        processor_id: processor.id(),
      },
    );

    let generated = self.generated_files.clone();
    let finished = self.finished_tx.clone();
    let signal = self.signal.clone();

    // The JoinHandle is not kept: every outcome, panics included, comes back
    // through the completion channel.
    drop(tokio::task::spawn_blocking(move || {
      let mut processor = processor;
      let result = match catch_unwind(AssertUnwindSafe(|| task.run(processor.collector_mut(), &generated))) {
        Ok(result) => result,
        Err(payload) => Err(TaskFailure::Panicked(panic_message(payload.as_ref()))),
      };
      let _ = finished.send(FinishedTask { id, processor, result });
      signal.notify_one();
    }));
  }

  /// Harvest every task that has already finished, without waiting.
  pub fn free_slots(&mut self) -> Vec<TaskCompletion> {
    let mut completions = Vec::new();
    while let Ok(finished) = self.finished_rx.try_recv() {
      if let Some(completion) = self.finish(finished) {
        completions.push(completion);
      }
    }
    completions
  }

  /// Wait for every in-flight task to finish and harvest them all.
  pub async fn sync_tasks(&mut self) -> Vec<TaskCompletion> {
    let mut completions = self.free_slots();
    while !self.running.is_empty() {
      // The scheduler holds a sender, so the channel never closes under us
      let Some(finished) = self.finished_rx.recv().await else {
        break;
      };
      if let Some(completion) = self.finish(finished) {
        completions.push(completion);
      }
    }
    completions
  }

  fn finish(&mut self, finished: FinishedTask) -> Option<TaskCompletion> {
    let FinishedTask { id, processor, result } = finished;
    self.pool.release(processor);

    let Some(running) = self.running.remove(&id) else {
      warn!(task = %id, "Completion for unknown task");
      return None;
    };
    trace!(task = %id, processor = running.processor_id, "Task finished");
    Some(TaskCompletion {
      task: running.meta,
      result,
    })
  }

  /// Stop accepting tasks. In-flight tasks keep running to completion.
  pub fn disable(&mut self) {
    if !self.disabled {
      debug!(in_flight = self.running.len(), "Scheduler disabled");
    }
    self.disabled = true;
  }

  pub fn is_disabled(&self) -> bool {
    self.disabled
  }

  pub fn is_running(&self, path: &Path) -> bool {
    self.running.values().any(|running| running.meta.path == path)
  }

  pub fn in_flight(&self) -> usize {
    self.running.len()
  }

  pub fn free_slot_count(&self) -> usize {
    if self.disabled {
      return 0;
    }
    self.limit.saturating_sub(self.running.len())
  }

  pub fn limit(&self) -> usize {
    self.limit
  }

  pub fn pool(&self) -> &ProcessorPool {
    &self.pool
  }

  /// Snapshot handed to tasks started from now on
  pub fn set_generated_files(&mut self, files: Arc<[GeneratedFile]>) {
    self.generated_files = files;
  }

  /// Notified every time a worker finishes
  pub fn completion_signal(&self) -> Arc<Notify> {
    self.signal.clone()
  }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
  if let Some(message) = payload.downcast_ref::<&str>() {
    (*message).to_string()
  } else if let Some(message) = payload.downcast_ref::<String>() {
    message.clone()
  } else {
    "unknown panic".to_string()
  }
}
