//! API key resolution.

use crate::config::AppConfig;
use crate::platform::api_key_path;

/// Where an API key was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    Explicit,
    EnvVar,
    ConfigFile,
}

impl KeySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeySource::Explicit => "explicit",
            KeySource::EnvVar => "env_var",
            KeySource::ConfigFile => "config_file",
        }
    }
}

/// Resolve an API key.
///
/// Checks in order:
/// 1. The explicitly supplied value
/// 2. `CIVITAI_API_KEY` environment variable
/// 3. `{config dir}/modsort/api_key`
///
/// Blank values are skipped. Running without a key is allowed; the remote
/// decides whether anonymous lookups are accepted.
pub fn resolve_api_key(explicit: Option<&str>) -> Option<(String, KeySource)> {
    if let Some(key) = non_blank(explicit) {
        return Some((key, KeySource::Explicit));
    }

    if let Some(key) = non_blank(std::env::var(AppConfig::API_KEY_ENV_VAR).ok().as_deref()) {
        return Some((key, KeySource::EnvVar));
    }

    let path = api_key_path().ok()?;
    let contents = std::fs::read_to_string(path).ok()?;
    non_blank(Some(&contents)).map(|key| (key, KeySource::ConfigFile))
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
