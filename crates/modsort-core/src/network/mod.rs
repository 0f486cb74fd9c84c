//! Remote lookup plumbing.
//!
//! This module provides:
//! - API key resolution
//! - HTTP client with pacing and rate limit awareness
//! - Retry logic with exponential backoff and jitter
//! - The `TypeResolver` seam and its Civitai implementation

mod auth;
mod client;
mod resolver;
mod retry;

pub use auth::{resolve_api_key, KeySource};
pub use client::{HttpClient, RateLimitState, StatusClass};
pub use resolver::{CivitaiResolver, TypeResolver};
pub use retry::{retry_async, retry_async_with_hint, RetryConfig, RetryStats};
