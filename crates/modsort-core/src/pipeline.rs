//! Classification of a batch of files.
//!
//! For each file: cache lookup by name, then digest and remote lookup on a
//! miss. New known types are written back to the cache before the next file
//! is touched.

use crate::cache::ClassificationStore;
use crate::cancel::CancellationToken;
use crate::error::{Result, SortError};
use crate::hashing;
use crate::network::TypeResolver;
use crate::progress::ProgressTracker;
use crate::types::{FileOutcome, FileRecord, FileResult, ModelType};
use tracing::{debug, info, warn};

/// What the classification pass learned.
#[derive(Debug, Clone, Default)]
pub struct Classification {
    /// One result per processed file, in processing order
    pub results: Vec<FileResult>,
    /// Types served from the cache
    pub cache_hits: usize,
    /// Known types resolved remotely
    pub classified: usize,
    /// Remote had no usable type
    pub unknown: usize,
    /// Hashing or lookup failed
    pub failed: usize,
    /// Stopped early by the cancellation token
    pub cancelled: bool,
}

impl Classification {
    /// Files that ended with a known type.
    pub fn known(&self) -> usize {
        self.cache_hits + self.classified
    }
}

/// Classify `records` in lexical name order.
///
/// Sets `model_type` (and `digest`, when computed) on each record. Per-file
/// failures are reported and the batch continues. Returns an error only for
/// rejected credentials or a cache write failure, both of which stop the
/// batch at the current file.
pub async fn classify(
    records: &mut [FileRecord],
    cache: &mut dyn ClassificationStore,
    resolver: &dyn TypeResolver,
    tracker: &ProgressTracker,
    cancel: &CancellationToken,
) -> Result<Classification> {
    records.sort_by(|a, b| a.name.cmp(&b.name));
    tracker.begin_scan(records.len());

    let mut classification = Classification::default();

    for record in records.iter_mut() {
        if cancel.is_cancelled() {
            info!("Classification cancelled");
            classification.cancelled = true;
            break;
        }

        let outcome = classify_one(record, cache, resolver).await?;
        match &outcome {
            FileOutcome::CacheHit { .. } => {
                classification.cache_hits += 1;
                tracker.record_resolved();
            }
            FileOutcome::Classified { .. } => {
                classification.classified += 1;
                tracker.record_resolved();
            }
            FileOutcome::Unknown => classification.unknown += 1,
            _ => classification.failed += 1,
        }

        let result = FileResult {
            name: record.name.clone(),
            outcome,
        };
        tracker.record_scan(result.clone());
        classification.results.push(result);
    }

    info!(
        "Classified {} files: {} cached, {} resolved, {} unknown, {} failed",
        classification.results.len(),
        classification.cache_hits,
        classification.classified,
        classification.unknown,
        classification.failed
    );
    Ok(classification)
}

async fn classify_one(
    record: &mut FileRecord,
    cache: &mut dyn ClassificationStore,
    resolver: &dyn TypeResolver,
) -> Result<FileOutcome> {
    let cacheable = record.has_exact_name();
    if !cacheable {
        debug!("{}: name is not valid UTF-8, bypassing cache", record.name);
    }

    if let Some(model_type) = cacheable.then(|| cache.lookup(&record.name)).flatten() {
        debug!("{}: cached as {}", record.name, model_type);
        record.model_type = Some(model_type);
        return Ok(FileOutcome::CacheHit { model_type });
    }

    let digest = match record.digest.clone() {
        Some(digest) => digest,
        None => match hashing::digest_async(&record.path).await {
            Ok(digest) => {
                record.digest = Some(digest.clone());
                digest
            }
            Err(e) => {
                warn!("{}: hashing failed: {}", record.name, e);
                return Ok(FileOutcome::Failed {
                    error: e.to_string(),
                });
            }
        },
    };

    match resolver.resolve(&record.name, &digest).await {
        Ok(model_type) if model_type.is_known() => {
            if cacheable {
                cache.store(&record.name, model_type)?;
            }
            record.model_type = Some(model_type);
            info!("{}: {}", record.name, model_type);
            Ok(FileOutcome::Classified { model_type })
        }
        Ok(_) | Err(SortError::NotFound { .. }) => {
            record.model_type = Some(ModelType::Unknown);
            info!("{}: unknown type", record.name);
            Ok(FileOutcome::Unknown)
        }
        Err(e @ SortError::Auth { .. }) => Err(e),
        Err(e) => {
            warn!("{}: lookup failed: {}", record.name, e);
            record.model_type = Some(ModelType::Unknown);
            Ok(FileOutcome::Failed {
                error: e.to_string(),
            })
        }
    }
}
