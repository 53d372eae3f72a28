//! WeatherSG Core Library
//!
//! Shared pieces of the historical archive service:
//! - Configuration loading (XDG-compliant)
//! - File system utilities
//! - Yearly shard layout on disk

mod config;
pub mod fs;

pub use config::{find_config_file, load_config, ConfigSource};
pub use fs::{
    is_directory, path_exists, shard_alias, shard_file_name, shard_path,
    SHARD_EXTENSION, SHARD_PREFIX,
};

/// Application name used for XDG paths
pub const APP_NAME: &str = "weathersg";

/// Default archive API port
pub const DEFAULT_ARCHIVE_PORT: u16 = 9900;

/// Default upper bound on a single request's query fan-out, in seconds
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 120;
