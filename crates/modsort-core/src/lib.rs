//! modsort core - headless library for sorting model files by type.
//!
//! A run hashes each model file in a directory, looks up its type in a
//! persistent name-keyed cache or a remote model registry, and moves it into
//! a per-type folder. Nothing here depends on a UI: progress goes to a
//! `ProgressSink` and a run can be cancelled between files.
//!
//! # Example
//!
//! ```rust,ignore
//! use modsort_core::{Orchestrator, ProgressEvent, SortConfig};
//!
//! #[tokio::main]
//! async fn main() -> modsort_core::Result<()> {
//!     let orchestrator = Orchestrator::from_config(SortConfig::default())?;
//!     let mut handle = orchestrator.start("/path/to/models");
//!
//!     let mut events = handle.events().expect("events taken once");
//!     tokio::spawn(async move {
//!         while let Some(event) = events.recv().await {
//!             if let ProgressEvent::Scan { done, total } = event {
//!                 println!("classified {}/{}", done, total);
//!             }
//!         }
//!     });
//!
//!     let report = handle.wait().await?;
//!     println!("Moved {} files", report.summary.moved);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod cancel;
pub mod config;
pub mod error;
pub mod hashing;
pub mod network;
pub mod orchestrator;
pub mod pipeline;
pub mod platform;
pub mod progress;
pub mod relocate;
pub mod types;

// Re-export commonly used types
pub use cache::{CachePersistence, ClassificationCache, ClassificationStore};
pub use cancel::{CancellationToken, CancelledError};
pub use config::{LookupMode, RetrySettings, SortConfig};
pub use error::{Result, SortError};
pub use network::{CivitaiResolver, RetryConfig, TypeResolver};
pub use orchestrator::{Orchestrator, RunHandle, RunReport};
pub use pipeline::Classification;
pub use progress::{ChannelSink, NoopSink, ProgressEvent, ProgressSink, ProgressTracker, RunProgress};
pub use relocate::{RelocationReport, Relocator};
pub use types::{Digest, FileOutcome, FileRecord, FileResult, ModelType, RunSummary};
