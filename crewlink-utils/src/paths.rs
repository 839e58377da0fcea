//! Path utilities for crewlink
//!
//! Handles XDG Base Directory specification compliance for config,
//! data, and log directories.

use directories::ProjectDirs;
use std::path::PathBuf;

/// Application identifier for XDG directories
const APP_NAME: &str = "crewlink";

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", APP_NAME)
}

/// Get the configuration directory
///
/// Location: `$XDG_CONFIG_HOME/crewlink` or `~/.config/crewlink`
pub fn config_dir() -> PathBuf {
    project_dirs()
        .map(|p| p.config_dir().to_path_buf())
        .unwrap_or_else(|| home_fallback(".config"))
}

/// Get the main configuration file path
///
/// Location: `$XDG_CONFIG_HOME/crewlink/config.toml`
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

/// Get the data directory (persistent stores)
///
/// Location: `$XDG_DATA_HOME/crewlink` or `~/.local/share/crewlink`
pub fn data_dir() -> PathBuf {
    project_dirs()
        .map(|p| p.data_local_dir().to_path_buf())
        .unwrap_or_else(|| home_fallback(".local/share"))
}

/// Backing file for the synchronized storage namespace (small settings)
pub fn sync_store_file() -> PathBuf {
    data_dir().join("sync.json")
}

/// Backing file for the local storage namespace (caches, ledgers, queues)
pub fn local_store_file() -> PathBuf {
    data_dir().join("local.json")
}

/// Get the log directory
///
/// Location: `$XDG_STATE_HOME/crewlink/log` or `~/.local/state/crewlink/log`
pub fn log_dir() -> PathBuf {
    project_dirs()
        .and_then(|p| p.state_dir().map(|d| d.to_path_buf()))
        .unwrap_or_else(|| home_fallback(".local/state"))
        .join("log")
}

fn home_fallback(suffix: &str) -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(suffix)
        .join(APP_NAME)
}

/// Ensure a directory exists, creating it if necessary
pub fn ensure_dir(path: &PathBuf) -> std::io::Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}
