//! Run orchestration: enumerate, classify, relocate.
//!
//! `Orchestrator::execute` runs the three phases inline for callers that
//! already live in an async task. `Orchestrator::start` spawns the run and
//! returns a `RunHandle` for cancelling it, reading its progress events and
//! awaiting its report.

use crate::cache::ClassificationCache;
use crate::cancel::CancellationToken;
use crate::config::SortConfig;
use crate::error::{Result, SortError};
use crate::network::{resolve_api_key, CivitaiResolver, TypeResolver};
use crate::pipeline;
use crate::platform::default_cache_log_path;
use crate::progress::{ChannelSink, ProgressEvent, ProgressTracker};
use crate::relocate::Relocator;
use crate::types::{FileRecord, FileResult, RunSummary};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;
use walkdir::WalkDir;

/// Outcome of a finished (or cancelled) run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    /// Classification results followed by relocation results
    pub files: Vec<FileResult>,
    pub summary: RunSummary,
    pub cancelled: bool,
}

impl RunReport {
    /// Every outcome recorded for `name`, in order.
    pub fn outcomes_for<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a FileResult> {
        self.files.iter().filter(move |r| r.name == name)
    }
}

/// Sequences a run against one configuration and resolver.
#[derive(Clone)]
pub struct Orchestrator {
    config: SortConfig,
    resolver: Arc<dyn TypeResolver>,
}

impl Orchestrator {
    pub fn new(config: SortConfig, resolver: Arc<dyn TypeResolver>) -> Self {
        Self { config, resolver }
    }

    /// Build an orchestrator with a Civitai resolver.
    ///
    /// The API key comes from the configuration, then the environment, then
    /// the config directory.
    pub fn from_config(config: SortConfig) -> Result<Self> {
        let api_key = match resolve_api_key(config.api_key.as_deref()) {
            Some((key, source)) => {
                info!("Using API key from {}", source.as_str());
                Some(key)
            }
            None => {
                info!("No API key configured, using anonymous lookups");
                None
            }
        };
        let resolver = CivitaiResolver::from_config(&config, api_key)?;
        Ok(Self::new(config, Arc::new(resolver)))
    }

    pub fn config(&self) -> &SortConfig {
        &self.config
    }

    /// List model files directly inside `source`, sorted by name.
    pub fn enumerate(&self, source: &Path) -> Result<Vec<FileRecord>> {
        if !source.is_dir() {
            return Err(SortError::NotADirectory(source.to_path_buf()));
        }

        let mut records = Vec::new();
        for entry in WalkDir::new(source).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| SortError::Io {
                message: e.to_string(),
                path: e.path().map(Path::to_path_buf),
                source: e.into_io_error(),
            })?;
            // Follows symlinks; a dangling link is not a file.
            if entry.path().is_file() && self.config.is_allowed(entry.path()) {
                records.push(FileRecord::new(entry.into_path()));
            }
        }
        records.sort_by(|a, b| a.name.cmp(&b.name));

        info!("Found {} model files in {}", records.len(), source.display());
        Ok(records)
    }

    fn open_cache(&self) -> Result<ClassificationCache> {
        let path = match &self.config.cache_path {
            Some(path) => path.clone(),
            None => default_cache_log_path()?,
        };
        ClassificationCache::open(path, self.config.cache_persistence)
    }

    /// Run every phase against `source`.
    ///
    /// Fatal errors (rejected credentials, an unusable cache log) are emitted
    /// as `ProgressEvent::Fatal` and returned; nothing is moved after one.
    pub async fn execute(
        &self,
        source: &Path,
        tracker: &ProgressTracker,
        cancel: &CancellationToken,
    ) -> Result<RunReport> {
        let run_id = Uuid::new_v4().to_string();
        let span = info_span!("run", run_id = %run_id);
        let result = self
            .run_phases(&run_id, source, tracker, cancel)
            .instrument(span)
            .await;

        if let Err(ref e) = result {
            error!(run_id = %run_id, "Run failed: {}", e);
            tracker.fatal(e.to_string());
        }
        result
    }

    async fn run_phases(
        &self,
        run_id: &str,
        source: &Path,
        tracker: &ProgressTracker,
        cancel: &CancellationToken,
    ) -> Result<RunReport> {
        let mut records = self.enumerate(source)?;
        let destination = self
            .config
            .destination_root
            .clone()
            .unwrap_or_else(|| source.to_path_buf());

        let mut cache = self.open_cache()?;

        if self.config.verify_credentials {
            match self.resolver.verify_credentials().await {
                Ok(()) => {}
                Err(e @ SortError::Auth { .. }) => {
                    release(cache);
                    return Err(e);
                }
                Err(e) => warn!("Credential check inconclusive: {}", e),
            }
        }

        if self.config.precreate_folders {
            if let Err(e) = Relocator::prepare_folders(&destination) {
                release(cache);
                return Err(e);
            }
        }

        let classification = match pipeline::classify(
            &mut records,
            &mut cache,
            self.resolver.as_ref(),
            tracker,
            cancel,
        )
        .await
        {
            Ok(classification) => classification,
            Err(e) => {
                release(cache);
                return Err(e);
            }
        };

        let mut summary = RunSummary {
            classified: classification.known(),
            unknown: classification.unknown,
            moved: 0,
            failed: classification.failed,
        };
        let mut files = classification.results;

        let cancelled = if classification.cancelled {
            true
        } else {
            let relocation = Relocator::new().relocate(&records, &destination, tracker, cancel);
            summary.moved = relocation.moved;
            summary.failed += relocation.failed;
            files.extend(relocation.results);
            relocation.cancelled
        };

        release(cache);

        info!(
            "Run finished: {} classified, {} unknown, {} moved, {} failed{}",
            summary.classified,
            summary.unknown,
            summary.moved,
            summary.failed,
            if cancelled { " (cancelled)" } else { "" }
        );

        Ok(RunReport {
            run_id: run_id.to_string(),
            files,
            summary,
            cancelled,
        })
    }

    /// Spawn a run on the current tokio runtime.
    pub fn start(&self, source: impl Into<PathBuf>) -> RunHandle {
        let source = source.into();
        let (sink, events) = ChannelSink::new();
        let cancel = CancellationToken::new();
        let orchestrator = self.clone();
        let task_cancel = cancel.clone();

        let task = tokio::spawn(async move {
            let tracker = ProgressTracker::new(Arc::new(sink));
            orchestrator.execute(&source, &tracker, &task_cancel).await
        });

        RunHandle {
            cancel,
            events: Some(events),
            task,
        }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Close the cache, logging instead of failing: every record was already
/// synced when it was stored.
fn release(cache: ClassificationCache) {
    if let Err(e) = cache.close() {
        warn!("Failed to close classification cache: {}", e);
    }
}

/// Handle to a spawned run.
#[derive(Debug)]
pub struct RunHandle {
    cancel: CancellationToken,
    events: Option<mpsc::UnboundedReceiver<ProgressEvent>>,
    task: JoinHandle<Result<RunReport>>,
}

impl RunHandle {
    /// Ask the run to stop after the current file.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Take the progress event receiver. Returns `None` after the first call.
    pub fn events(&mut self) -> Option<mpsc::UnboundedReceiver<ProgressEvent>> {
        self.events.take()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the run to end.
    pub async fn wait(self) -> Result<RunReport> {
        self.task
            .await
            .map_err(|e| SortError::Other(format!("Run task failed: {}", e)))?
    }
}
