//! Platform path utilities for bluecast.
//!
//! Single source of truth for where the daemon keeps its configuration and
//! its daily message/system logs.
//!
//! # Platform Behavior
//!
//! | Platform | Data Directory | Config Directory |
//! |----------|----------------|------------------|
//! | Linux    | `~/.local/share/bluecast` | `~/.config/bluecast` |
//! | macOS    | `~/Library/Application Support/bluecast` | Same as data dir |

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use thiserror::Error;

/// Errors specific to path operations.
#[derive(Error, Debug)]
pub enum PathError {
    #[error("Could not determine home directory")]
    NoHomeDirectory,

    #[error("Could not determine data directory")]
    NoDataDirectory,

    #[error("Could not determine config directory")]
    NoConfigDirectory,
}

/// Application identifier used in path construction.
const APP_NAME: &str = "bluecast";

/// Configuration file name inside the config directory.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Create `dir` (and parents) if missing, owner-only on Unix.
pub fn ensure_private_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        return Ok(());
    }

    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = fs::Permissions::from_mode(0o700);
        fs::set_permissions(dir, perms)
            .with_context(|| format!("Failed to set permissions on {}", dir.display()))?;
    }

    Ok(())
}

/// Get the application data directory, creating it if needed.
///
/// # Platform Behavior
/// - **Linux**: `~/.local/share/bluecast`
/// - **macOS**: `~/Library/Application Support/bluecast`
pub fn get_data_dir() -> Result<PathBuf> {
    let base_dir = dirs::data_dir().ok_or(PathError::NoDataDirectory)?;
    let data_dir = base_dir.join(APP_NAME);
    ensure_private_dir(&data_dir)?;
    Ok(data_dir)
}

/// Get the configuration directory, creating it if needed.
pub fn get_config_dir() -> Result<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        let config_base = dirs::config_dir().ok_or(PathError::NoConfigDirectory)?;
        let config_dir = config_base.join(APP_NAME);
        ensure_private_dir(&config_dir)?;
        Ok(config_dir)
    }

    #[cfg(not(target_os = "linux"))]
    {
        get_data_dir()
    }
}

/// Default location of `config.toml`.
///
/// Does not create the file, only its parent directory.
pub fn get_config_file_path() -> Result<PathBuf> {
    Ok(get_config_dir()?.join(CONFIG_FILE_NAME))
}

/// Get the logs directory holding `messages_*.log` and `system_*.log`.
///
/// # Platform Behavior
/// - **Linux**: `~/.local/share/bluecast/logs`
/// - **macOS**: `~/Library/Logs/bluecast`
pub fn get_logs_dir() -> Result<PathBuf> {
    #[cfg(target_os = "macos")]
    {
        let home = dirs::home_dir().ok_or(PathError::NoHomeDirectory)?;
        let logs_dir = home.join("Library").join("Logs").join(APP_NAME);
        ensure_private_dir(&logs_dir)?;
        Ok(logs_dir)
    }

    #[cfg(not(target_os = "macos"))]
    {
        let logs_dir = get_data_dir()?.join("logs");
        ensure_private_dir(&logs_dir)?;
        Ok(logs_dir)
    }
}
