//! Classification cache for modsort.
//!
//! Two tiers: an in-memory map owned by the run and an append-only log on
//! disk that survives interrupted runs. The cache is the only writer of the
//! log and holds an exclusive lock on it while open.

mod classification;
mod log;
mod traits;

pub use classification::ClassificationCache;
pub use log::CacheLog;
pub use traits::{CachePersistence, ClassificationStore};
