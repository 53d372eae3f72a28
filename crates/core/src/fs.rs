//! Filesystem utilities and the on-disk layout of yearly shards
//!
//! Every calendar year of readings lives in its own DuckDB file,
//! `weather_{year}.duckdb`, inside the archive directory.

use std::path::{Path, PathBuf};

pub const SHARD_PREFIX: &str = "weather_";
pub const SHARD_EXTENSION: &str = "duckdb";

/// Check if a path exists
pub fn path_exists(path: &str) -> bool {
    Path::new(path).exists()
}

/// Check if a path is a directory
pub fn is_directory(path: &str) -> bool {
    Path::new(path).is_dir()
}

/// File name of the shard holding `year`
pub fn shard_file_name(year: i32) -> String {
    format!("{}{}.{}", SHARD_PREFIX, year, SHARD_EXTENSION)
}

/// Catalog alias a shard is attached under
pub fn shard_alias(year: i32) -> String {
    format!("{}{}", SHARD_PREFIX, year)
}

pub fn shard_path(archive_dir: &str, year: i32) -> PathBuf {
    Path::new(archive_dir).join(shard_file_name(year))
}
