//! TaskQueue - pending indexing work, one entry per file
//!
//! Enqueueing a file that is already pending replaces the pending task in
//! place: the file keeps its position but the newer arguments and
//! generation win. Dispatch preserves FIFO order and skips files that
//! already have a task in flight.

use std::{collections::VecDeque, path::Path};

use tracing::{debug, trace};

use crate::{scheduler::TaskScheduler, task::IndexingTask};

#[derive(Debug, Default)]
pub struct TaskQueue {
  tasks: VecDeque<IndexingTask>,
}

impl TaskQueue {
  pub fn new() -> Self {
    Self::default()
  }

  /// Add a task, replacing any pending task for the same file.
  ///
  /// Returns the replaced task, if there was one.
  pub fn enqueue(&mut self, task: IndexingTask) -> Option<IndexingTask> {
    if let Some(slot) = self.tasks.iter_mut().find(|pending| pending.path() == task.path()) {
      trace!(path = %task.path().display(), generation = task.generation(), "Replacing pending task");
      return Some(std::mem::replace(slot, task));
    }
    self.tasks.push_back(task);
    None
  }

  /// Drop pending tasks for `path`. Returns how many were removed.
  pub fn remove_tasks_for(&mut self, path: &Path) -> usize {
    let before = self.tasks.len();
    self.tasks.retain(|task| task.path() != path);
    before - self.tasks.len()
  }

  pub fn contains(&self, path: &Path) -> bool {
    self.tasks.iter().any(|task| task.path() == path)
  }

  pub fn drain(&mut self) -> Vec<IndexingTask> {
    self.tasks.drain(..).collect()
  }

  pub fn len(&self) -> usize {
    self.tasks.len()
  }

  pub fn is_empty(&self) -> bool {
    self.tasks.is_empty()
  }

  /// Hand as many tasks as the scheduler has room for to the scheduler.
  ///
  /// Tasks whose file is already in flight stay queued at their position.
  /// Returns the number of tasks started. A disabled scheduler empties the queue.
  pub fn process_entries(&mut self, scheduler: &mut TaskScheduler) -> usize {
    if scheduler.is_disabled() {
      let dropped = self.drain();
      if !dropped.is_empty() {
        debug!(count = dropped.len(), "Discarding queued tasks, scheduler disabled");
      }
      return 0;
    }

    let free = scheduler.free_slot_count();
    if free == 0 || self.tasks.is_empty() {
      return 0;
    }

    let mut batch = Vec::with_capacity(free);
    let mut waiting = VecDeque::with_capacity(self.tasks.len());
    while let Some(task) = self.tasks.pop_front() {
      if batch.len() < free && !scheduler.is_running(task.path()) {
        batch.push(task);
      } else {
        waiting.push_back(task);
      }
    }
    self.tasks = waiting;

    let offered = batch.len();
    let rejected = scheduler.schedule(batch);
    let started = offered - rejected.len();
    for task in rejected.into_iter().rev() {
      self.tasks.push_front(task);
    }

    if started > 0 {
      trace!(started, queued = self.tasks.len(), in_flight = scheduler.in_flight(), "Dispatched tasks");
    }
    started
  }
}
