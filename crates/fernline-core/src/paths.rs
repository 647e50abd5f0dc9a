use directories::BaseDirs;
use std::path::{Path, PathBuf};

use crate::error::StoreError;

/// Overrides the data directory (used by tests and packaged installs).
pub const DATA_DIR_ENV: &str = "FERNLINE_DIR";

pub const DATA_DIR_NAME: &str = ".fernline";
pub const DB_FILENAME: &str = "fernline.duckdb";
pub const DEMO_DB_FILENAME: &str = "demo.duckdb";
pub const ENCRYPTION_METADATA_FILE: &str = "encryption.json";

/// Resolve the fernline data directory: `$FERNLINE_DIR` if set,
/// otherwise `~/.fernline`.
pub fn data_dir() -> Result<PathBuf, StoreError> {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        return Ok(PathBuf::from(dir));
    }
    let dirs = BaseDirs::new().ok_or(StoreError::HomeDirUnavailable)?;
    Ok(dirs.home_dir().join(DATA_DIR_NAME))
}

/// Database file inside the data directory. The demo store is a separate
/// file and is never encrypted.
pub fn db_path(data_dir: &Path, demo: bool) -> PathBuf {
    data_dir.join(if demo { DEMO_DB_FILENAME } else { DB_FILENAME })
}

pub fn encryption_metadata_path(data_dir: &Path) -> PathBuf {
    data_dir.join(ENCRYPTION_METADATA_FILE)
}
