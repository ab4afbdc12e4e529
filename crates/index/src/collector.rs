//! Collector - the external parsing capability
//!
//! A collector turns one source file plus its compile arguments into the
//! facts the storage layer persists. Collectors are stateful and expensive to
//! build, so the pipeline owns a bounded set of them through the
//! [`ProcessorPool`](crate::pool::ProcessorPool) and never runs one on two
//! files at the same time.

use std::path::Path;

use symdex_core::{CollectedFacts, CollectorError, GeneratedFile};

/// Everything a collector needs to parse one file.
#[derive(Debug, Clone, Copy)]
pub struct CollectRequest<'a> {
  pub path: &'a Path,
  pub arguments: &'a [String],
  /// Unsaved or generated content that overrides what is on disk
  pub generated_files: &'a [GeneratedFile],
}

impl CollectRequest<'_> {
  /// Look up overlay content for a path, if any was registered
  pub fn generated_content(&self, path: &Path) -> Option<&str> {
    self
      .generated_files
      .iter()
      .find(|file| file.path == path)
      .map(|file| file.content.as_str())
  }
}

/// A parser instance that can be reused across files.
///
/// `collect` is called on a blocking worker thread. Implementations may keep
/// per-file state between calls; the pool calls [`Collector::reset`] before
/// handing the collector to the next task.
pub trait Collector: Send {
  fn collect(&mut self, request: &CollectRequest<'_>) -> Result<CollectedFacts, CollectorError>;

  /// Clear any state left from the previous file
  fn reset(&mut self) {}
}

/// Builds collectors on demand.
pub trait CollectorFactory: Send + Sync {
  fn create(&self) -> Box<dyn Collector>;
}

impl<F> CollectorFactory for F
where
  F: Fn() -> Box<dyn Collector> + Send + Sync,
{
  fn create(&self) -> Box<dyn Collector> {
    self()
  }
}
