//! Core data types shared by the pipeline, relocator and orchestrator.

use serde::{Deserialize, Serialize};
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

/// Destination category assigned to a model file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelType {
    /// Full model checkpoint
    Checkpoint,
    /// Textual inversion embedding
    TextualInversion,
    /// LoRA adapter
    #[serde(rename = "LORA")]
    Lora,
    /// VAE encoder/decoder
    #[serde(rename = "VAE")]
    Vae,
    /// LyCORIS / LoCon adapter
    LoCon,
    /// Queried but not one of the sortable categories
    Unknown,
}

impl ModelType {
    /// Every category that has a destination folder.
    pub const KNOWN: [ModelType; 5] = [
        ModelType::Checkpoint,
        ModelType::TextualInversion,
        ModelType::Lora,
        ModelType::Vae,
        ModelType::LoCon,
    ];

    /// Canonical label, as used by the remote service and the cache log.
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelType::Checkpoint => "Checkpoint",
            ModelType::TextualInversion => "TextualInversion",
            ModelType::Lora => "LORA",
            ModelType::Vae => "VAE",
            ModelType::LoCon => "LoCon",
            ModelType::Unknown => "Unknown",
        }
    }

    /// Subfolder name for this category. `None` for `Unknown`.
    pub fn folder_name(&self) -> Option<&'static str> {
        match self {
            ModelType::Unknown => None,
            known => Some(known.as_str()),
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, ModelType::Unknown)
    }

    /// Map a label returned by the remote service to a category.
    ///
    /// Matching is case-insensitive and accepts the short names some API
    /// versions return (`embedding`, `lycoris`). Anything else is `Unknown`.
    pub fn from_remote_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "checkpoint" => ModelType::Checkpoint,
            "textualinversion" | "embedding" => ModelType::TextualInversion,
            "lora" => ModelType::Lora,
            "vae" => ModelType::Vae,
            "locon" | "lycoris" => ModelType::LoCon,
            _ => ModelType::Unknown,
        }
    }
}

impl std::str::FromStr for ModelType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(ModelType::from_remote_label(s))
    }
}

impl std::fmt::Display for ModelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lowercase hex SHA-256 of a file's content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Digest(String);

impl Digest {
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A model file discovered in the source directory for one run.
#[derive(Debug, Clone)]
pub struct FileRecord {
    /// Absolute path of the file at enumeration time
    pub path: PathBuf,
    /// File name as stored on disk, used for the destination path
    pub file_name: OsString,
    /// Display form of `file_name`, the cache and report key
    pub name: String,
    /// Content digest, computed at most once per run
    pub digest: Option<Digest>,
    /// Resolved category, set by the pipeline
    pub model_type: Option<ModelType>,
}

impl FileRecord {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let file_name = path.file_name().map(OsStr::to_os_string).unwrap_or_default();
        let name = file_name.to_string_lossy().into_owned();
        Self {
            path,
            file_name,
            name,
            digest: None,
            model_type: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether `name` is the exact on-disk name. Names that are not valid
    /// UTF-8 are lossy and may collide, so they never key the cache.
    pub fn has_exact_name(&self) -> bool {
        self.file_name.to_str().is_some()
    }

    /// Whether the relocator should move this file.
    pub fn is_movable(&self) -> bool {
        self.model_type.map(|t| t.is_known()).unwrap_or(false)
    }
}

/// Result for a single file, as reported to progress sinks and in the run report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FileOutcome {
    /// Type served from the cache without hashing or a network call
    CacheHit { model_type: ModelType },
    /// Type resolved by the remote service
    Classified { model_type: ModelType },
    /// Remote has no usable type for this file
    Unknown,
    /// Hashing, lookup or move failed
    Failed { error: String },
    /// File was moved into its type folder
    Moved { to: PathBuf, renamed: bool },
    /// File was left in place
    Skipped,
}

/// One file's outcome, keyed by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileResult {
    pub name: String,
    pub outcome: FileOutcome,
}

/// Final counts for a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub classified: usize,
    pub unknown: usize,
    pub moved: usize,
    pub failed: usize,
}
