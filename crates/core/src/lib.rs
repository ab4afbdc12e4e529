pub mod config;
pub mod error;
pub mod facts;
pub mod generated;
pub mod project;
pub mod status;

pub use config::{Config, IndexingConfig, LogConfig, LogRotation, default_data_dir};
pub use error::{CollectorError, ConfigError, StorageError};
pub use facts::{CollectedFacts, FileRecord, SourceLocation, Symbol, SymbolId, SymbolKind, SymbolUsage, UsageKind, UsedMacro};
pub use generated::{GeneratedFile, GeneratedFiles};
pub use project::{ProjectPart, ProjectPartId, arguments_hash};
pub use status::{FileStat, FileStatus};
