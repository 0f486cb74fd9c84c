//! Configuration for modsort.
//!
//! Constant groups hold defaults; `SortConfig` is the runtime configuration a
//! caller builds directly or loads from a JSON file.

use crate::cache::CachePersistence;
use crate::error::{Result, SortError};
use crate::network::RetryConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application-level configuration.
pub struct AppConfig;

impl AppConfig {
    pub const APP_NAME: &'static str = "modsort";
    pub const USER_AGENT: &'static str = "modsort/0.1";
    pub const API_KEY_ENV_VAR: &'static str = "CIVITAI_API_KEY";
}

/// Network-related configuration.
pub struct NetworkConfig;

impl NetworkConfig {
    pub const API_BASE_URL: &'static str = "https://civitai.com/api/v1";
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
    pub const THROTTLE_DELAY: Duration = Duration::from_millis(500);
    pub const HASH_TYPE_POINTER: &'static str = "/model/type";
    pub const NAME_TYPE_POINTER: &'static str = "/items/0/type";
}

/// Shared directory and file names.
pub struct PathsConfig;

impl PathsConfig {
    pub const APP_DIR_NAME: &'static str = "modsort";
    pub const CACHE_LOG_FILENAME: &'static str = "classifications.log";
    pub const API_KEY_FILENAME: &'static str = "api_key";
}

/// Extensions treated as model files, compared case-insensitively.
pub const DEFAULT_EXTENSIONS: [&str; 6] = ["pt", "bin", "ckpt", "safetensors", "pickle", "pkl"];

/// How the remote service is queried.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupMode {
    /// `GET /model-versions/by-hash/{digest}`
    #[default]
    ByHash,
    /// `GET /models?name={name}`
    ByName,
}

/// Retry settings in serializable form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            jitter: true,
        }
    }
}

impl RetrySettings {
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig::new()
            .with_max_attempts(self.max_attempts.max(1))
            .with_base_delay(Duration::from_millis(self.base_delay_ms))
            .with_max_delay(Duration::from_millis(self.max_delay_ms))
            .with_jitter(self.jitter)
    }
}

/// Runtime configuration for a sort run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SortConfig {
    /// Base URL of the classification API
    pub api_base_url: String,
    /// Bearer token; resolved from the environment or config dir when absent
    pub api_key: Option<String>,
    pub lookup_mode: LookupMode,
    /// JSON pointer to the type label in a by-hash response
    pub hash_type_pointer: String,
    /// JSON pointer to the type label in a by-name response
    pub name_type_pointer: String,
    /// Extensions (without dot) that are considered model files
    pub allowed_extensions: Vec<String>,
    /// Root for type folders; defaults to the source directory
    pub destination_root: Option<PathBuf>,
    /// Cache log location; defaults to the platform cache directory
    pub cache_path: Option<PathBuf>,
    pub cache_persistence: CachePersistence,
    pub retry: RetrySettings,
    /// Minimum spacing between remote requests, 0 disables pacing
    pub request_interval_ms: u64,
    pub request_timeout_secs: u64,
    /// Create every type folder before moving anything
    pub precreate_folders: bool,
    /// Check the API key against the remote before the first lookup
    pub verify_credentials: bool,
}

impl Default for SortConfig {
    fn default() -> Self {
        Self {
            api_base_url: NetworkConfig::API_BASE_URL.to_string(),
            api_key: None,
            lookup_mode: LookupMode::default(),
            hash_type_pointer: NetworkConfig::HASH_TYPE_POINTER.to_string(),
            name_type_pointer: NetworkConfig::NAME_TYPE_POINTER.to_string(),
            allowed_extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            destination_root: None,
            cache_path: None,
            cache_persistence: CachePersistence::default(),
            retry: RetrySettings::default(),
            request_interval_ms: 0,
            request_timeout_secs: NetworkConfig::REQUEST_TIMEOUT.as_secs(),
            precreate_folders: false,
            verify_credentials: true,
        }
    }
}

impl SortConfig {
    /// Load a configuration file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents =
            std::fs::read_to_string(path).map_err(|e| SortError::io_with_path(e, path))?;
        let config: SortConfig = serde_json::from_str(&contents).map_err(|e| SortError::Json {
            message: format!("Failed to parse {}: {}", path.display(), e),
            source: Some(e),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that cannot produce a working run.
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.api_base_url).map_err(|e| SortError::Config {
            message: format!("Invalid api_base_url {:?}: {}", self.api_base_url, e),
        })?;
        if self.allowed_extensions.is_empty() {
            return Err(SortError::Config {
                message: "allowed_extensions must not be empty".to_string(),
            });
        }
        for pointer in [&self.hash_type_pointer, &self.name_type_pointer] {
            if !pointer.is_empty() && !pointer.starts_with('/') {
                return Err(SortError::Config {
                    message: format!("JSON pointer {:?} must start with '/'", pointer),
                });
            }
        }
        Ok(())
    }

    /// Whether `path` has one of the allowed extensions.
    pub fn is_allowed(&self, path: &Path) -> bool {
        path.extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .map(|ext| {
                self.allowed_extensions
                    .iter()
                    .any(|allowed| allowed.trim_start_matches('.').eq_ignore_ascii_case(&ext))
            })
            .unwrap_or(false)
    }

    pub fn request_interval(&self) -> Duration {
        Duration::from_millis(self.request_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn type_pointer(&self) -> &str {
        match self.lookup_mode {
            LookupMode::ByHash => &self.hash_type_pointer,
            LookupMode::ByName => &self.name_type_pointer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        let config = SortConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.lookup_mode, LookupMode::ByHash);
        assert_eq!(config.retry.max_attempts, 1);
        assert_eq!(config.type_pointer(), "/model/type");
    }

    #[test]
    fn test_extension_filter() {
        let config = SortConfig::default();
        assert!(config.is_allowed(Path::new("/m/a.safetensors")));
        assert!(config.is_allowed(Path::new("/m/B.CKPT")));
        assert!(!config.is_allowed(Path::new("/m/readme.txt")));
        assert!(!config.is_allowed(Path::new("/m/noext")));

        let config = SortConfig {
            allowed_extensions: vec![".gguf".to_string()],
            ..SortConfig::default()
        };
        assert!(config.is_allowed(Path::new("model.gguf")));
    }

    #[test]
    fn test_load_partial_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("modsort.json");
        std::fs::write(
            &path,
            r#"{"lookup_mode": "by_name", "request_interval_ms": 5000, "retry": {"max_attempts": 3}}"#,
        )
        .unwrap();

        let config = SortConfig::load(&path).unwrap();
        assert_eq!(config.lookup_mode, LookupMode::ByName);
        assert_eq!(config.request_interval(), Duration::from_secs(5));
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.base_delay_ms, 1_000);
        assert_eq!(config.type_pointer(), "/items/0/type");
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = SortConfig {
            api_base_url: "not a url".to_string(),
            ..SortConfig::default()
        };
        assert!(matches!(config.validate(), Err(SortError::Config { .. })));

        let config = SortConfig {
            hash_type_pointer: "model.type".to_string(),
            ..SortConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
