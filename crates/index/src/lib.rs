//! Concurrent, incremental symbol indexing
//!
//! The pipeline keeps a symbol store in sync with a set of project parts:
//!
//! ```text
//! update_project_parts / watcher events
//!         │
//!   SymbolIndexer ── FileStatusCache
//!         │
//!     TaskQueue ──► TaskScheduler ──► ProcessorPool (collectors)
//!                        │
//!                     Storage (SymbolStorage + UsedMacroAndSourceStorage)
//! ```
//!
//! Everything above the scheduler runs on one control task owned by
//! [`SymbolIndexing`]. Collectors run on blocking worker threads and commit
//! their own results; the control loop only harvests completions.

pub mod collector;
pub mod error;
pub mod handle;
pub mod indexer;
pub mod indexing;
pub mod logging;
pub mod message;
pub mod pool;
pub mod queue;
pub mod scheduler;
pub mod status_cache;
pub mod storage;
pub mod task;
pub mod watcher;

#[cfg(test)]
mod __tests__;

pub use collector::{CollectRequest, Collector, CollectorFactory};
pub use error::{IndexingError, TaskFailure, WatcherError};
pub use handle::{IndexingHandle, SendError};
pub use indexer::{FailedFile, FailureKind, IndexingStats, SymbolIndexer, SyncReport};
pub use indexing::SymbolIndexing;
pub use pool::ProcessorPool;
pub use queue::TaskQueue;
pub use scheduler::TaskScheduler;
pub use status_cache::FileStatusCache;
pub use storage::{FactStore, MemoryStore, Storage, SymbolStorage, UsedMacroAndSourceStorage};
pub use task::{CommitSummary, IndexingTask, TaskCompletion, TaskId, TaskOutcome};
pub use watcher::{ChangeKind, FileEvent, NotifyBackend, PathWatcher, WatchBackend};
