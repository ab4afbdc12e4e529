//! Configuration system for symdex with per-project overrides.
//!
//! Config priority: project-relative (.symdex/config.toml) > user (~/.config/symdex/config.toml)

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// ============================================================================
// Indexing Configuration
// ============================================================================

/// Symbol indexing pipeline configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexingConfig {
  /// Maximum number of concurrently running collectors (default: 0 = hardware threads)
  pub max_concurrency: usize,

  /// Watcher debounce in milliseconds (default: 200)
  pub watcher_debounce_ms: u64,

  /// Periodic status sweep interval in seconds, 0 disables it (default: 300)
  pub rescan_interval_secs: u64,

  /// Control loop command buffer (default: 256)
  pub command_buffer: usize,
}

impl Default for IndexingConfig {
  fn default() -> Self {
    Self {
      max_concurrency: 0,
      watcher_debounce_ms: 200,
      rescan_interval_secs: 300,
      command_buffer: 256,
    }
  }
}

// ============================================================================
// Logging Configuration
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
  Hourly,
  #[default]
  Daily,
  Never,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
  /// off, error, warn, info, debug, trace (default: info)
  pub level: String,

  /// Log file rotation when logging to a file (default: daily)
  pub rotation: LogRotation,

  /// Directory for log files; falls back to the data directory
  #[serde(skip_serializing_if = "Option::is_none")]
  pub directory: Option<PathBuf>,
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      level: "info".to_string(),
      rotation: LogRotation::Daily,
      directory: None,
    }
  }
}

impl LogConfig {
  /// Directory log files are written to
  pub fn log_dir(&self) -> PathBuf {
    self.directory.clone().unwrap_or_else(default_data_dir)
  }
}

// ============================================================================
// Main Configuration
// ============================================================================

/// symdex configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Indexing pipeline settings
  #[serde(default)]
  pub indexing: IndexingConfig,

  /// Logging settings
  #[serde(default)]
  pub logging: LogConfig,
}

impl Config {
  /// Load config for a project, with fallback to user config
  pub fn load_for_project(project_path: &Path) -> Self {
    // Try project-relative first
    let project_config = Self::project_config_path(project_path);
    if project_config.exists()
      && let Ok(config) = Self::load_from(&project_config)
    {
      return config;
    }

    // Fall back to user config
    if let Some(user_config_path) = Self::user_config_path()
      && user_config_path.exists()
      && let Ok(config) = Self::load_from(&user_config_path)
    {
      return config;
    }

    Self::default()
  }

  /// Load a config file, reporting IO and parse errors
  pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
  }

  /// Write the config as TOML
  pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, toml::to_string_pretty(self)?)?;
    Ok(())
  }

  /// Get the user-level config path
  pub fn user_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("SYMDEX_CONFIG_DIR") {
      return Some(PathBuf::from(path).join("config.toml"));
    }

    if let Ok(path) = std::env::var("XDG_CONFIG_HOME") {
      return Some(PathBuf::from(path).join("symdex").join("config.toml"));
    }

    dirs::config_dir().map(|p: PathBuf| p.join("symdex").join("config.toml"))
  }

  /// Get the project-relative config path
  pub fn project_config_path(project_path: &Path) -> PathBuf {
    project_path.join(".symdex").join("config.toml")
  }

  /// Concurrency limit with the hardware default applied
  pub fn effective_concurrency(&self, hardware_threads: usize) -> usize {
    match self.indexing.max_concurrency {
      0 => hardware_threads.max(1),
      n => n,
    }
  }

  /// Generate a default config file as a string
  pub fn generate_template() -> String {
    r#"# symdex Configuration
# Place in .symdex/config.toml (project) or ~/.config/symdex/config.toml (user)

# ============================================================================
# Indexing
# ============================================================================

[indexing]
# Concurrently running collectors (0 = one per hardware thread)
max_concurrency = 0

# Quiet period after the last filesystem event before reconciling (milliseconds)
watcher_debounce_ms = 200

# Re-stat every tracked file this often to catch missed events (seconds, 0 = off)
rescan_interval_secs = 300

# Pending commands accepted by the control loop
command_buffer = 256

# ============================================================================
# Logging
# ============================================================================

[logging]
# off, error, warn, info, debug, trace (RUST_LOG overrides)
level = "info"

# Log file rotation: hourly, daily, never
rotation = "daily"

# directory = "/var/log/symdex"
"#
    .to_string()
  }
}

/// Default data directory (respects SYMDEX_DATA_DIR)
pub fn default_data_dir() -> PathBuf {
  if let Ok(path) = std::env::var("SYMDEX_DATA_DIR") {
    return PathBuf::from(path);
  }

  dirs::data_local_dir()
    .unwrap_or_else(std::env::temp_dir)
    .join("symdex")
}
