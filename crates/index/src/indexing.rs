//! SymbolIndexing - the lifecycle owner of the whole pipeline
//!
//! One `SymbolIndexing` owns one watcher, one status cache, one processor
//! pool, one queue, one scheduler and one indexer. They all live inside a
//! single control task; callers talk to it through an [`IndexingHandle`].
//!
//! # Lifecycle
//!
//! The control loop runs until:
//! - [`SymbolIndexing::shutdown`] (or [`IndexingHandle::shutdown`]) is called
//! - the `SymbolIndexing` value is dropped (cancellation)
//! - every handle is dropped (command channel closed)
//!
//! On the way out it stops the watcher, disables the scheduler, discards
//! queued tasks and waits for in-flight tasks before the pool and the store
//! are released.

use std::{path::PathBuf, sync::Arc, time::Duration};

use symdex_core::{Config, GeneratedFile, ProjectPart, ProjectPartId};
use tokio::{
  sync::mpsc,
  task::JoinHandle,
  time::{Instant, Interval, MissedTickBehavior, sleep_until},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::{
  collector::CollectorFactory,
  error::IndexingError,
  handle::{IndexingHandle, SendError},
  indexer::{IndexingStats, SymbolIndexer, SyncReport},
  message::IndexingCommand,
  pool::ProcessorPool,
  scheduler::TaskScheduler,
  storage::{FactStore, Storage},
  watcher::{NotifyBackend, PathWatcher, WatchBackend},
};

pub struct SymbolIndexing {
  handle: IndexingHandle,
  cancel: CancellationToken,
  task: Option<JoinHandle<()>>,
}

impl SymbolIndexing {
  /// Start indexing with native filesystem notifications.
  pub fn spawn(
    config: &Config,
    factory: Arc<dyn CollectorFactory>,
    store: Arc<dyn FactStore>,
  ) -> Result<Self, IndexingError> {
    let (tx, rx) = mpsc::channel(config.indexing.command_buffer.max(1));

    let events_tx = tx.clone();
    let backend = NotifyBackend::new(move |events| {
      // Runs on notify's thread, so blocking here is fine
      if events_tx.blocking_send(IndexingCommand::FileEvents { events }).is_err() {
        trace!("Control loop gone, dropping file events");
      }
    })?;

    Ok(Self::start(config, factory, store, Some(Box::new(backend)), tx, rx))
  }

  /// Start indexing without a filesystem backend.
  ///
  /// Changes must be reported through [`IndexingHandle::file_events`] or
  /// picked up by the periodic rescan.
  pub fn spawn_unwatched(config: &Config, factory: Arc<dyn CollectorFactory>, store: Arc<dyn FactStore>) -> Self {
    let (tx, rx) = mpsc::channel(config.indexing.command_buffer.max(1));
    Self::start(config, factory, store, None, tx, rx)
  }

  fn start(
    config: &Config,
    factory: Arc<dyn CollectorFactory>,
    store: Arc<dyn FactStore>,
    backend: Option<Box<dyn WatchBackend>>,
    tx: mpsc::Sender<IndexingCommand>,
    rx: mpsc::Receiver<IndexingCommand>,
  ) -> Self {
    let concurrency = config.effective_concurrency(num_cpus::get());
    let pool = ProcessorPool::new(factory, concurrency);
    let scheduler = TaskScheduler::new(pool, concurrency);
    let watcher = PathWatcher::new(backend, Duration::from_millis(config.indexing.watcher_debounce_ms));
    let indexer = SymbolIndexer::new(Storage::new(store), scheduler, watcher);

    let rescan_interval = match config.indexing.rescan_interval_secs {
      0 => None,
      secs => Some(Duration::from_secs(secs)),
    };

    let cancel = CancellationToken::new();
    let control = ControlLoop {
      indexer,
      commands: rx,
      cancel: cancel.clone(),
      rescan_interval,
    };

    info!(
      concurrency,
      debounce_ms = config.indexing.watcher_debounce_ms,
      rescan_secs = config.indexing.rescan_interval_secs,
      "Symbol indexing started"
    );
    let task = tokio::spawn(control.run());

    Self {
      handle: IndexingHandle::new(tx),
      cancel,
      task: Some(task),
    }
  }

  /// A cloneable handle to the control loop
  pub fn handle(&self) -> IndexingHandle {
    self.handle.clone()
  }

  pub async fn update_project_parts(&self, parts: Vec<ProjectPart>) -> Result<(), SendError> {
    self.handle.update_project_parts(parts).await
  }

  pub async fn remove_project_parts(&self, ids: Vec<ProjectPartId>) -> Result<(), SendError> {
    self.handle.remove_project_parts(ids).await
  }

  pub async fn update_generated_files(&self, files: Vec<GeneratedFile>) -> Result<(), SendError> {
    self.handle.update_generated_files(files).await
  }

  pub async fn remove_generated_files(&self, paths: Vec<PathBuf>) -> Result<(), SendError> {
    self.handle.remove_generated_files(paths).await
  }

  pub async fn sync_tasks(&self) -> Result<SyncReport, SendError> {
    self.handle.sync_tasks().await
  }

  pub async fn disable(&self) -> Result<(), SendError> {
    self.handle.disable().await
  }

  pub async fn stats(&self) -> Result<IndexingStats, SendError> {
    self.handle.stats().await
  }

  pub async fn watched_paths(&self) -> Result<Vec<PathBuf>, SendError> {
    self.handle.watched_paths().await
  }

  /// Stop the control loop and wait for in-flight tasks to finish.
  pub async fn shutdown(mut self) -> Result<(), IndexingError> {
    // Already gone is fine: the join below still observes the exit
    let _ = self.handle.shutdown().await;
    if let Some(task) = self.task.take() {
      task.await?;
    }
    Ok(())
  }
}

impl Drop for SymbolIndexing {
  fn drop(&mut self) {
    if self.task.is_some() {
      self.cancel.cancel();
    }
  }
}

// ============================================================================
// Control loop
// ============================================================================

struct ControlLoop {
  indexer: SymbolIndexer,
  commands: mpsc::Receiver<IndexingCommand>,
  cancel: CancellationToken,
  rescan_interval: Option<Duration>,
}

impl ControlLoop {
  async fn run(mut self) {
    let completions = self.indexer.completion_signal();
    let mut rescan = self.rescan_interval.map(|period| {
      let mut interval = tokio::time::interval_at(Instant::now() + period, period);
      interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
      interval
    });

    loop {
      let deadline = self.indexer.watch_deadline();

      tokio::select! {
          // Check cancellation first (biased)
          biased;

          _ = self.cancel.cancelled() => {
              info!("Symbol indexing shutting down (cancelled)");
              break;
          }

          _ = completions.notified() => {
              self.indexer.free_slots();
          }

          command = self.commands.recv() => {
              match command {
                  Some(IndexingCommand::Shutdown) => {
                      info!("Symbol indexing shutting down (requested)");
                      break;
                  }
                  Some(command) => self.handle(command).await,
                  None => {
                      info!("Symbol indexing shutting down (channel closed)");
                      break;
                  }
              }
          }

          _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
              self.indexer.flush_watcher(Instant::now());
          }

          _ = next_tick(&mut rescan) => {
              debug!("Periodic rescan");
              self.indexer.rescan();
          }
      }
    }

    let report = self.indexer.shutdown().await;
    info!(
      committed = report.committed.len(),
      failed = report.failed.len(),
      "Symbol indexing stopped"
    );
  }

  async fn handle(&mut self, command: IndexingCommand) {
    match command {
      IndexingCommand::UpdateProjectParts { parts } => self.indexer.update_project_parts(parts),
      IndexingCommand::RemoveProjectParts { ids } => self.indexer.remove_project_parts(ids),
      IndexingCommand::UpdateGeneratedFiles { files } => self.indexer.update_generated_files(files),
      IndexingCommand::RemoveGeneratedFiles { paths } => self.indexer.remove_generated_files(paths),
      IndexingCommand::FileEvents { events } => self.indexer.record_events(events),
      IndexingCommand::Rescan => self.indexer.rescan(),
      IndexingCommand::SyncTasks { reply } => {
        let report = self.indexer.sync_tasks().await;
        let _ = reply.send(report);
      }
      IndexingCommand::Disable { reply } => {
        self.indexer.disable();
        let _ = reply.send(());
      }
      IndexingCommand::Stats { reply } => {
        let _ = reply.send(self.indexer.stats());
      }
      IndexingCommand::WatchedPaths { reply } => {
        let _ = reply.send(self.indexer.watched_paths());
      }
      // Intercepted by the run loop
      IndexingCommand::Shutdown => {}
    }
  }
}

async fn next_tick(interval: &mut Option<Interval>) {
  match interval {
    Some(interval) => {
      interval.tick().await;
    }
    None => std::future::pending().await,
  }
}
