//! Platform-specific locations for modsort's own files.
//!
//! # Platform Behavior
//! Uses the `dirs` crate:
//! - **Linux**: `~/.config/modsort`, `~/.cache/modsort`
//! - **Windows**: `%APPDATA%\modsort`, `%LOCALAPPDATA%\modsort`
//! - **macOS**: `~/Library/Application Support/modsort`, `~/Library/Caches/modsort`

use crate::config::PathsConfig;
use crate::error::{Result, SortError};
use std::path::PathBuf;

/// Directory for user configuration (API key file).
pub fn app_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir().ok_or_else(|| SortError::Config {
        message: "Could not determine platform config directory".to_string(),
    })?;
    Ok(config_dir.join(PathsConfig::APP_DIR_NAME))
}

/// Directory for the classification cache log.
pub fn app_cache_dir() -> Result<PathBuf> {
    let cache_dir = dirs::cache_dir().ok_or_else(|| SortError::Config {
        message: "Could not determine platform cache directory".to_string(),
    })?;
    Ok(cache_dir.join(PathsConfig::APP_DIR_NAME))
}

/// Returns `{app_cache_dir}/classifications.log`.
pub fn default_cache_log_path() -> Result<PathBuf> {
    Ok(app_cache_dir()?.join(PathsConfig::CACHE_LOG_FILENAME))
}

/// Returns `{app_config_dir}/api_key`.
pub fn api_key_path() -> Result<PathBuf> {
    Ok(app_config_dir()?.join(PathsConfig::API_KEY_FILENAME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_are_app_scoped() {
        if let Ok(path) = default_cache_log_path() {
            assert!(path.ends_with("modsort/classifications.log"));
        }
        if let Ok(path) = api_key_path() {
            assert!(path.ends_with("modsort/api_key"));
        }
    }
}
