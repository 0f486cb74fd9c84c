//! Cache store trait and configuration types.

use crate::error::Result;
use crate::types::ModelType;
use serde::{Deserialize, Serialize};

/// What happens to the cache log when the cache is closed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CachePersistence {
    /// Keep the log so later runs skip already-classified files.
    #[default]
    Persistent,
    /// Delete the log on close, scoping the cache to a single run.
    Ephemeral,
}

/// Name-keyed store of resolved model types.
///
/// The pipeline talks to the cache through this trait so tests can observe
/// or fail writes without touching the filesystem.
pub trait ClassificationStore: Send {
    /// Look up the type recorded for `name`.
    fn lookup(&mut self, name: &str) -> Option<ModelType>;

    /// Record `model_type` for `name`.
    ///
    /// Returns `Ok(false)` without writing when the name is already recorded
    /// or the type is `Unknown`. An error means the record could not be made
    /// durable and the run must stop.
    fn store(&mut self, name: &str, model_type: ModelType) -> Result<bool>;
}
