//! HTTP client for the classification API.
//!
//! Wraps reqwest with:
//! - Optional bearer authorization
//! - Fixed request pacing through a `governor` rate limiter
//! - Throttling when `X-RateLimit-*` headers report a nearly spent budget
//! - Mapping of HTTP statuses onto lookup failure classes

use crate::config::{AppConfig, NetworkConfig};
use crate::error::{Result, SortError};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::{header, Client, Response, StatusCode};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Rate limit state extracted from response headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimitState {
    pub remaining: Option<u64>,
    pub limit: Option<u64>,
}

impl RateLimitState {
    /// Throttle when fewer than 10% of the requests in the window remain.
    pub fn should_throttle(&self) -> bool {
        match (self.remaining, self.limit) {
            (Some(remaining), Some(limit)) if limit > 0 => {
                let threshold = (limit as f64 * 0.1) as u64;
                remaining < threshold.max(1)
            }
            _ => false,
        }
    }
}

/// How a response status should be treated by a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Success,
    /// Credentials rejected
    Auth,
    /// Remote has no record
    NotFound,
    /// Worth retrying
    Transient,
}

impl StatusClass {
    pub fn of(status: StatusCode) -> Self {
        match status.as_u16() {
            200..=299 => StatusClass::Success,
            401 | 403 => StatusClass::Auth,
            408 | 429 => StatusClass::Transient,
            400..=499 => StatusClass::NotFound,
            _ => StatusClass::Transient,
        }
    }
}

/// HTTP client shared by every lookup in a run.
pub struct HttpClient {
    client: Client,
    api_key: Option<String>,
    pacer: Option<DefaultDirectRateLimiter>,
    rate_limit_remaining: AtomicI64,
    rate_limit_limit: AtomicU64,
    timeout: Duration,
    throttle_delay: Duration,
}

impl HttpClient {
    /// Create a client.
    ///
    /// `request_interval` of zero disables pacing.
    pub fn new(
        timeout: Duration,
        api_key: Option<String>,
        request_interval: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(AppConfig::USER_AGENT)
            .build()
            .map_err(|e| SortError::Config {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        let pacer = Quota::with_period(request_interval).map(RateLimiter::direct);

        Ok(Self {
            client,
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            pacer,
            rate_limit_remaining: AtomicI64::new(-1),
            rate_limit_limit: AtomicU64::new(0),
            timeout,
            throttle_delay: NetworkConfig::THROTTLE_DELAY,
        })
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn rate_limit_state(&self) -> RateLimitState {
        let remaining = self.rate_limit_remaining.load(Ordering::SeqCst);
        let limit = self.rate_limit_limit.load(Ordering::SeqCst);
        RateLimitState {
            remaining: (remaining >= 0).then_some(remaining as u64),
            limit: (limit > 0).then_some(limit),
        }
    }

    /// Send a GET request. Transport failures become `Transient` or `Timeout`;
    /// the status is left for the caller to classify.
    pub async fn get(&self, url: &str) -> Result<Response> {
        self.wait_turn().await;

        let mut request = self.client.get(url);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                SortError::Timeout(self.timeout)
            } else {
                SortError::Transient {
                    message: format!("GET {} failed: {}", url, e),
                    status: None,
                }
            }
        })?;

        self.update_rate_limits(&response);
        debug!("GET {} -> {}", url, response.status());
        Ok(response)
    }

    /// Seconds from a `Retry-After` header, if present.
    pub fn retry_after(response: &Response) -> Option<u64> {
        response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok())
    }

    async fn wait_turn(&self) {
        if let Some(ref pacer) = self.pacer {
            pacer.until_ready().await;
        }

        let state = self.rate_limit_state();
        if state.should_throttle() {
            warn!(
                "Rate limit approaching (remaining: {:?}/{:?}), throttling for {:?}",
                state.remaining, state.limit, self.throttle_delay
            );
            tokio::time::sleep(self.throttle_delay).await;
        }
    }

    fn update_rate_limits(&self, response: &Response) {
        let headers = response.headers();
        let parse = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
        };

        if let Some(remaining) = parse("X-RateLimit-Remaining") {
            self.rate_limit_remaining
                .store(remaining.min(i64::MAX as u64) as i64, Ordering::SeqCst);
        }
        if let Some(limit) = parse("X-RateLimit-Limit") {
            self.rate_limit_limit.store(limit, Ordering::SeqCst);
        }
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("has_api_key", &self.api_key.is_some())
            .field("paced", &self.pacer.is_some())
            .field("rate_limit", &self.rate_limit_state())
            .finish()
    }
}
