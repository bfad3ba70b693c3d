use crate::core::error::{RewindError, RewindResult};
use std::path::{Path, PathBuf};

/// Environment variable that relocates every Rewind directory.
pub const REWIND_HOME_ENV: &str = "REWIND_HOME";

/// Get the Rewind home directory
///
/// `REWIND_HOME` wins when set. Otherwise platform-specific locations:
/// - Windows: %APPDATA%\rewind
/// - Linux: ~/.config/rewind
/// - macOS: ~/Library/Application Support/rewind
pub fn rewind_home() -> RewindResult<PathBuf> {
    if let Some(home) = std::env::var_os(REWIND_HOME_ENV) {
        return Ok(PathBuf::from(home));
    }
    let config_dir = dirs::config_dir()
        .ok_or_else(|| RewindError::Path("Could not determine config directory".to_string()))?;
    Ok(config_dir.join("rewind"))
}

/// Get the cache directory
///
/// Under `REWIND_HOME` this is `$REWIND_HOME/cache`. Otherwise:
/// - Windows: %LOCALAPPDATA%\rewind\cache
/// - Linux: ~/.cache/rewind
/// - macOS: ~/Library/Caches/rewind
pub fn cache_dir() -> RewindResult<PathBuf> {
    if let Some(home) = std::env::var_os(REWIND_HOME_ENV) {
        return Ok(PathBuf::from(home).join("cache"));
    }
    let cache_dir = dirs::cache_dir()
        .ok_or_else(|| RewindError::Path("Could not determine cache directory".to_string()))?;
    Ok(cache_dir.join("rewind"))
}

/// Get the config file path
pub fn config_file() -> RewindResult<PathBuf> {
    Ok(rewind_home()?.join("config.yaml"))
}

/// Default scratch area for downloaded packages and built archives
pub fn default_work_dir() -> RewindResult<PathBuf> {
    Ok(cache_dir()?.join("work"))
}

/// Ensure a directory exists, creating it if necessary
pub fn ensure_dir(path: &Path) -> RewindResult<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}
