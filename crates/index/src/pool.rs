//! ProcessorPool - bounded, lazily grown set of collectors
//!
//! Collectors are created on first demand up to the configured capacity and
//! then reused forever. The pool never shrinks. A processor is either idle
//! (in the pool) or busy (owned by exactly one running task), never both.

use std::{collections::HashMap, fmt, sync::Arc};

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::{
  collector::{Collector, CollectorFactory},
  task::TaskId,
};

pub struct Processor {
  id: usize,
  collector: Box<dyn Collector>,
  task: Option<TaskId>,
}

impl Processor {
  pub fn id(&self) -> usize {
    self.id
  }

  /// The task currently bound to this processor
  pub fn task(&self) -> Option<TaskId> {
    self.task
  }

  pub(crate) fn collector_mut(&mut self) -> &mut dyn Collector {
    self.collector.as_mut()
  }
}

impl fmt::Debug for Processor {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Processor")
      .field("id", &self.id)
      .field("task", &self.task)
      .finish_non_exhaustive()
  }
}

#[derive(Default)]
struct PoolState {
  idle: Vec<Processor>,
  busy: HashMap<usize, TaskId>,
  created: usize,
  next_id: usize,
}

enum Slot {
  Idle(Processor),
  /// Capacity reserved under the lock; the collector is built outside it
  Reserved(usize),
}

/// Gives a reserved slot back if the factory unwinds before the collector exists
struct Reservation<'a>(&'a Mutex<PoolState>);

impl Drop for Reservation<'_> {
  fn drop(&mut self) {
    self.0.lock().created -= 1;
  }
}

pub struct ProcessorPool {
  factory: Arc<dyn CollectorFactory>,
  capacity: usize,
  state: Mutex<PoolState>,
}

impl ProcessorPool {
  pub fn new(factory: Arc<dyn CollectorFactory>, capacity: usize) -> Self {
    Self {
      factory,
      capacity: capacity.max(1),
      state: Mutex::new(PoolState::default()),
    }
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  /// Take an idle processor, creating one if below capacity, and bind it to `task`.
  ///
  /// Returns `None` when every processor is busy and the pool is full.
  pub fn acquire(&self, task: TaskId) -> Option<Processor> {
    let slot = {
      let mut state = self.state.lock();
      match state.idle.pop() {
        Some(processor) => Slot::Idle(processor),
        None if state.created < self.capacity => {
          state.created += 1;
          state.next_id += 1;
          Slot::Reserved(state.next_id - 1)
        }
        None => return None,
      }
    };

    let mut processor = match slot {
      Slot::Idle(processor) => processor,
      Slot::Reserved(id) => {
        debug!(processor = id, capacity = self.capacity, "Creating collector");
        let reservation = Reservation(&self.state);
        let collector = self.factory.create();
        std::mem::forget(reservation);
        Processor {
          id,
          collector,
          task: None,
        }
      }
    };

    processor.task = Some(task);
    self.state.lock().busy.insert(processor.id, task);
    trace!(processor = processor.id, task = %task, "Processor acquired");
    Some(processor)
  }

  /// Return a processor to the idle set after clearing its per-file state.
  pub fn release(&self, mut processor: Processor) {
    processor.collector.reset();
    let task = processor.task.take();
    trace!(processor = processor.id, task = ?task, "Processor released");

    let mut state = self.state.lock();
    state.busy.remove(&processor.id);
    state.idle.push(processor);
  }

  pub fn idle_count(&self) -> usize {
    self.state.lock().idle.len()
  }

  pub fn busy_count(&self) -> usize {
    self.state.lock().busy.len()
  }

  /// Number of collectors created so far (never exceeds capacity)
  pub fn created(&self) -> usize {
    self.state.lock().created
  }
}
