//! Tests against real filesystem notifications.

use std::{sync::Arc, time::Duration};

use parking_lot::Mutex;

use super::helpers::{Probe, TestProject, factory, stored_symbols, test_config, wait_until};
use crate::{
  indexing::SymbolIndexing,
  storage::MemoryStore,
  watcher::{FileEvent, NotifyBackend, WatchBackend},
};

#[tokio::test]
async fn test_notify_backend_reports_file_changes() {
  let project = TestProject::new();
  let a = project.write("a.cc", "sym alpha");
  let seen: Arc<Mutex<Vec<FileEvent>>> = Arc::default();

  let mut backend = {
    let seen = seen.clone();
    NotifyBackend::new(move |events| seen.lock().extend(events)).expect("create backend")
  };
  backend.watch_dir(project.dir.path()).expect("watch dir");

  // Give the backend a moment to register before writing
  tokio::time::sleep(Duration::from_millis(100)).await;
  std::fs::write(&a, "sym alpha_edited").unwrap();

  let reported = wait_until(Duration::from_secs(10), || {
    let seen = seen.clone();
    let a = a.clone();
    async move { seen.lock().iter().any(|event| event.path.ends_with("a.cc") || event.path == a) }
  })
  .await;
  assert!(reported, "no event reported for a.cc");

  backend.unwatch_dir(project.dir.path()).expect("unwatch dir");
}

#[tokio::test]
async fn test_edit_on_disk_is_reindexed() {
  let project = TestProject::new();
  let a = project.write("a.cc", "sym alpha");
  let store = Arc::new(MemoryStore::new());
  let probe = Probe::new();
  let indexing = SymbolIndexing::spawn(&test_config(1), factory(&probe), store.clone()).expect("spawn indexing");

  indexing
    .update_project_parts(vec![project.part("p1", &["a.cc"], &[])])
    .await
    .unwrap();
  indexing.sync_tasks().await.unwrap();
  assert_eq!(stored_symbols(store.as_ref(), &a), vec!["alpha".to_string()]);

  tokio::time::sleep(Duration::from_millis(100)).await;
  project.write("a.cc", "sym alpha_on_disk");

  let indexed = wait_until(Duration::from_secs(10), || {
    let store = store.clone();
    let a = a.clone();
    async move { stored_symbols(store.as_ref(), &a) == vec!["alpha_on_disk".to_string()] }
  })
  .await;
  assert!(indexed, "on-disk edit was never indexed");

  indexing.shutdown().await.unwrap();
}
