//! Mock model registry and fixtures shared by the integration tests.

#![allow(dead_code)]

use modsort_core::hashing;
use modsort_core::{RetrySettings, SortConfig};
use serde_json::json;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Mock of the registry's REST API.
pub struct MockRegistry {
    server: MockServer,
}

impl MockRegistry {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn base_url(&self) -> String {
        self.server.uri()
    }

    pub fn server(&self) -> &MockServer {
        &self.server
    }

    /// Answer a by-hash lookup for the file at `file` with `model_type`,
    /// expecting exactly `calls` requests.
    pub async fn by_hash(&self, file: &Path, model_type: &str, calls: u64) {
        let digest = hashing::digest(file).unwrap();
        Mock::given(method("GET"))
            .and(path(format!("/model-versions/by-hash/{}", digest)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": 1,
                "model": {"name": "fixture", "type": model_type},
            })))
            .expect(calls)
            .mount(&self.server)
            .await;
    }

    /// Answer a by-hash lookup for `file` with a bare status code.
    pub async fn by_hash_status(&self, file: &Path, status: u16, calls: u64) {
        let digest = hashing::digest(file).unwrap();
        Mock::given(method("GET"))
            .and(path(format!("/model-versions/by-hash/{}", digest)))
            .respond_with(ResponseTemplate::new(status))
            .expect(calls)
            .mount(&self.server)
            .await;
    }

    /// Answer the credential check with `status`.
    pub async fn credential_check(&self, status: u16, calls: u64) {
        Mock::given(method("GET"))
            .and(path("/models"))
            .and(query_param("limit", "1"))
            .respond_with(ResponseTemplate::new(status).set_body_json(json!({"items": []})))
            .expect(calls)
            .mount(&self.server)
            .await;
    }

    /// Number of requests received so far.
    pub async fn request_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map(|requests| requests.len())
            .unwrap_or(0)
    }
}

/// A source directory and a separate directory for the cache log.
pub struct Workspace {
    pub source: TempDir,
    pub cache_dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            source: TempDir::new().expect("Failed to create temp dir"),
            cache_dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    pub fn source(&self) -> &Path {
        self.source.path()
    }

    pub fn cache_path(&self) -> PathBuf {
        self.cache_dir.path().join("classifications.log")
    }

    /// Write a model file with distinct content so every file has its own digest.
    pub fn model(&self, name: &str) -> PathBuf {
        let path = self.source().join(name);
        std::fs::write(&path, format!("weights for {}", name)).unwrap();
        path
    }

    /// Config pointed at `registry` with zero-delay retries and no pacing.
    pub fn config(&self, registry: &MockRegistry) -> SortConfig {
        SortConfig {
            api_base_url: registry.base_url(),
            cache_path: Some(self.cache_path()),
            request_timeout_secs: 5,
            retry: RetrySettings {
                max_attempts: 1,
                base_delay_ms: 0,
                max_delay_ms: 0,
                jitter: false,
            },
            ..SortConfig::default()
        }
    }

    pub fn cache_contents(&self) -> String {
        std::fs::read_to_string(self.cache_path()).unwrap_or_default()
    }
}
