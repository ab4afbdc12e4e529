mod helpers;
mod watcher;
