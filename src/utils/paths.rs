//! Cross-Platform Path Utilities
//!
//! Resolves the Incito data directory (`~/.incito/`) and the files in it.

use std::path::{Path, PathBuf};

use crate::utils::error::{AppError, AppResult};

/// Get the user's home directory
pub fn home_dir() -> AppResult<PathBuf> {
    dirs::home_dir().ok_or_else(|| AppError::config("Could not determine home directory"))
}

/// Get the Incito directory (~/.incito/)
pub fn incito_dir() -> AppResult<PathBuf> {
    Ok(home_dir()?.join(".incito"))
}

/// Get the config file path (~/.incito/config.json)
pub fn config_path() -> AppResult<PathBuf> {
    Ok(incito_dir()?.join("config.json"))
}

/// Get the database file path (~/.incito/data.db)
pub fn database_path() -> AppResult<PathBuf> {
    Ok(incito_dir()?.join("data.db"))
}

/// Ensure a directory exists, creating it if necessary
pub fn ensure_dir(path: &Path) -> AppResult<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

/// Get the Incito directory, creating if it doesn't exist
pub fn ensure_incito_dir() -> AppResult<PathBuf> {
    let path = incito_dir()?;
    ensure_dir(&path)?;
    Ok(path)
}
