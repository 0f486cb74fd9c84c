//! Remote type lookup.
//!
//! A resolver answers "what kind of model is this file" and nothing else: it
//! never reads or writes the classification cache.

use super::client::{HttpClient, StatusClass};
use super::retry::{retry_async_with_hint, RetryConfig, RetryStats};
use crate::config::{LookupMode, SortConfig};
use crate::error::{Result, SortError};
use crate::types::{Digest, ModelType};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

/// Looks up the type of a model file.
///
/// Errors:
/// - `NotFound`: the remote has no record; the file stays unknown.
/// - `Transient` / `Timeout` / `RateLimited`: retried per policy, then the
///   file stays unknown.
/// - `Auth`: credentials rejected; the run must stop.
#[async_trait]
pub trait TypeResolver: Send + Sync {
    async fn resolve(&self, name: &str, digest: &Digest) -> Result<ModelType>;

    /// Pre-flight credential check. Resolvers without credentials accept.
    async fn verify_credentials(&self) -> Result<()> {
        Ok(())
    }
}

/// Resolver for the Civitai REST API.
#[derive(Debug)]
pub struct CivitaiResolver {
    http: HttpClient,
    base_url: String,
    mode: LookupMode,
    type_pointer: String,
    retry: RetryConfig,
}

impl CivitaiResolver {
    pub fn new(
        http: HttpClient,
        base_url: impl Into<String>,
        mode: LookupMode,
        type_pointer: impl Into<String>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            mode,
            type_pointer: type_pointer.into(),
            retry,
        }
    }

    /// Build a resolver from run configuration and an already resolved key.
    pub fn from_config(config: &SortConfig, api_key: Option<String>) -> Result<Self> {
        config.validate()?;
        let http = HttpClient::new(
            config.request_timeout(),
            api_key,
            config.request_interval(),
        )?;
        Ok(Self::new(
            http,
            config.api_base_url.clone(),
            config.lookup_mode,
            config.type_pointer(),
            config.retry.to_retry_config(),
        ))
    }

    pub fn mode(&self) -> LookupMode {
        self.mode
    }

    fn lookup_url(&self, name: &str, digest: &Digest) -> String {
        match self.mode {
            LookupMode::ByHash => {
                format!("{}/model-versions/by-hash/{}", self.base_url, digest)
            }
            LookupMode::ByName => {
                format!("{}/models?name={}", self.base_url, urlencoding::encode(name))
            }
        }
    }

    async fn lookup_once(&self, name: &str, url: &str) -> Result<ModelType> {
        let response = self.http.get(url).await?;
        let status = response.status();

        match StatusClass::of(status) {
            StatusClass::Success => {}
            StatusClass::Auth => {
                return Err(SortError::Auth {
                    status: status.as_u16(),
                })
            }
            StatusClass::NotFound => {
                return Err(SortError::NotFound {
                    name: name.to_string(),
                })
            }
            StatusClass::Transient if status.as_u16() == 429 => {
                return Err(SortError::RateLimited {
                    retry_after_secs: HttpClient::retry_after(&response),
                })
            }
            StatusClass::Transient => {
                return Err(SortError::Transient {
                    message: format!("{} returned {}", url, status),
                    status: Some(status.as_u16()),
                })
            }
        }

        let body = response.text().await.map_err(|e| SortError::Transient {
            message: format!("Failed to read response body from {}: {}", url, e),
            status: Some(status.as_u16()),
        })?;

        let json: Value = serde_json::from_str(&body).map_err(|e| SortError::Transient {
            message: format!("Malformed response body from {}: {}", url, e),
            status: Some(status.as_u16()),
        })?;

        extract_type(&json, &self.type_pointer).ok_or_else(|| SortError::NotFound {
            name: name.to_string(),
        })
    }

    /// Resolve with retries, returning what the retries cost.
    ///
    /// A 429 with `Retry-After` waits at least that long before the next
    /// attempt, still capped by the retry policy's `max_delay`.
    pub async fn resolve_with_stats(
        &self,
        name: &str,
        digest: &Digest,
    ) -> (Result<ModelType>, RetryStats) {
        let url = self.lookup_url(name, digest);
        retry_async_with_hint(
            &self.retry,
            || self.lookup_once(name, &url),
            SortError::is_retryable,
            retry_after_hint,
        )
        .await
    }
}

fn retry_after_hint(error: &SortError) -> Option<Duration> {
    match error {
        SortError::RateLimited {
            retry_after_secs: Some(secs),
        } => Some(Duration::from_secs(*secs)),
        _ => None,
    }
}

#[async_trait]
impl TypeResolver for CivitaiResolver {
    async fn resolve(&self, name: &str, digest: &Digest) -> Result<ModelType> {
        let (result, stats) = self.resolve_with_stats(name, digest).await;

        if stats.attempts > 1 {
            debug!("{}: {} attempts, waited {:?}", name, stats.attempts, stats.total_delay);
        }
        result
    }

    async fn verify_credentials(&self) -> Result<()> {
        if !self.http.has_api_key() {
            debug!("No API key configured, skipping credential check");
            return Ok(());
        }

        let url = format!("{}/models?limit=1", self.base_url);
        let response = self.http.get(&url).await?;
        let status = response.status();
        match StatusClass::of(status) {
            StatusClass::Success => {
                info!("API key accepted by {}", self.base_url);
                Ok(())
            }
            StatusClass::Auth => Err(SortError::Auth {
                status: status.as_u16(),
            }),
            _ => Err(SortError::Transient {
                message: format!("Credential check returned {}", status),
                status: Some(status.as_u16()),
            }),
        }
    }
}

/// Pull the type label out of a response body.
///
/// Returns `None` when the pointer does not resolve to a string.
fn extract_type(json: &Value, pointer: &str) -> Option<ModelType> {
    let label = json.pointer(pointer)?.as_str()?;
    let model_type = ModelType::from_remote_label(label);
    if !model_type.is_known() {
        debug!("Remote type {:?} has no destination folder", label);
    }
    Some(model_type)
}
