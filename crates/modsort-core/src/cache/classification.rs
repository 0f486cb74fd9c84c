//! Two-tier classification cache.

use super::log::CacheLog;
use super::traits::{CachePersistence, ClassificationStore};
use crate::error::{Result, SortError};
use crate::types::ModelType;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Name-keyed cache of resolved model types.
///
/// The first type recorded for a name wins for the lifetime of the cache;
/// later stores for the same name are ignored.
#[derive(Debug)]
pub struct ClassificationCache {
    /// Entries touched during this run
    memory: HashMap<String, ModelType>,
    /// Everything in the log, loaded on open
    persisted: HashMap<String, ModelType>,
    log: Option<CacheLog>,
    path: Option<PathBuf>,
    persistence: CachePersistence,
    writes: usize,
}

impl ClassificationCache {
    /// Open the persisted log at `path` and load it.
    ///
    /// Holds an exclusive lock on the log until `close()` or drop.
    pub fn open(path: impl AsRef<Path>, persistence: CachePersistence) -> Result<Self> {
        let mut log = CacheLog::open(path.as_ref())?;
        let records = log.read_all()?;

        let mut persisted = HashMap::with_capacity(records.len());
        for (name, model_type) in records {
            persisted.entry(name).or_insert(model_type);
        }

        info!(
            "Loaded {} cached classifications from {}",
            persisted.len(),
            log.path().display()
        );

        Ok(Self {
            memory: HashMap::new(),
            persisted,
            path: Some(log.path().to_path_buf()),
            log: Some(log),
            persistence,
            writes: 0,
        })
    }

    /// A cache with no persisted tier; nothing survives the run.
    pub fn in_memory() -> Self {
        Self {
            memory: HashMap::new(),
            persisted: HashMap::new(),
            log: None,
            path: None,
            persistence: CachePersistence::Ephemeral,
            writes: 0,
        }
    }

    /// Check the in-memory tier, then the persisted tier.
    ///
    /// A persisted hit is promoted into the in-memory tier.
    pub fn lookup(&mut self, name: &str) -> Option<ModelType> {
        if let Some(model_type) = self.memory.get(name) {
            return Some(*model_type);
        }

        let model_type = *self.persisted.get(name)?;
        self.memory.insert(name.to_string(), model_type);
        Some(model_type)
    }

    /// Record a resolution in both tiers.
    ///
    /// The log append is synced to disk before this returns.
    pub fn store(&mut self, name: &str, model_type: ModelType) -> Result<bool> {
        if !model_type.is_known() {
            debug!("Not caching unknown type for {}", name);
            return Ok(false);
        }
        if self.memory.contains_key(name) || self.persisted.contains_key(name) {
            debug!("{} already cached, keeping first resolution", name);
            return Ok(false);
        }

        if let Some(log) = self.log.as_mut() {
            log.append(name, model_type)?;
        }
        self.persisted.insert(name.to_string(), model_type);
        self.memory.insert(name.to_string(), model_type);
        self.writes += 1;
        Ok(true)
    }

    /// Number of distinct names known to the cache.
    pub fn len(&self) -> usize {
        self.persisted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.persisted.is_empty()
    }

    /// Number of records written since open.
    pub fn writes(&self) -> usize {
        self.writes
    }

    /// Path of the persisted log, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Flush and release the log. Ephemeral logs are deleted.
    pub fn close(mut self) -> Result<()> {
        self.release()
    }

    fn release(&mut self) -> Result<()> {
        let Some(log) = self.log.take() else {
            return Ok(());
        };
        let path = log.path().to_path_buf();
        log.release()?;

        if self.persistence == CachePersistence::Ephemeral {
            std::fs::remove_file(&path).map_err(|e| SortError::cache_log(e, &path))?;
            debug!("Removed ephemeral cache log {}", path.display());
        }
        Ok(())
    }
}

impl Drop for ClassificationCache {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!("Failed to release classification cache: {}", e);
        }
    }
}

impl ClassificationStore for ClassificationCache {
    fn lookup(&mut self, name: &str) -> Option<ModelType> {
        ClassificationCache::lookup(self, name)
    }

    fn store(&mut self, name: &str, model_type: ModelType) -> Result<bool> {
        ClassificationCache::store(self, name, model_type)
    }
}
