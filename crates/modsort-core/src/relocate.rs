//! Moves classified files into per-type folders.
//!
//! A file is never overwritten: when the destination name is taken the file
//! is renamed `<token>_<name>`, where the token is a Unix timestamp that only
//! ever increases within one relocator.

use crate::cancel::CancellationToken;
use crate::error::{Result, SortError};
use crate::platform::is_cross_device;
use crate::progress::ProgressTracker;
use crate::types::{FileOutcome, FileRecord, FileResult, ModelType};
use chrono::Utc;
use std::ffi::{OsStr, OsString};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// What the relocation pass did.
#[derive(Debug, Clone, Default)]
pub struct RelocationReport {
    pub results: Vec<FileResult>,
    pub moved: usize,
    /// Moves that needed a collision rename
    pub renamed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub cancelled: bool,
}

/// Moves files and hands out collision tokens.
#[derive(Debug, Default)]
pub struct Relocator {
    last_token: i64,
}

impl Relocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create every type folder under `root`.
    pub fn prepare_folders(root: &Path) -> Result<()> {
        for model_type in ModelType::KNOWN {
            if let Some(folder) = model_type.folder_name() {
                let dir = root.join(folder);
                std::fs::create_dir_all(&dir).map_err(|e| SortError::io_with_path(e, &dir))?;
            }
        }
        debug!("Prepared type folders under {}", root.display());
        Ok(())
    }

    /// Move every record with a known type into `root/<folder>`.
    ///
    /// Records without a known type stay where they are and are reported as
    /// skipped. A failed move is recorded and the batch continues.
    pub fn relocate(
        &mut self,
        records: &[FileRecord],
        root: &Path,
        tracker: &ProgressTracker,
        cancel: &CancellationToken,
    ) -> RelocationReport {
        let mut report = RelocationReport::default();
        tracker.begin_move(records.iter().filter(|r| r.is_movable()).count());

        for record in records {
            if cancel.is_cancelled() {
                info!("Relocation cancelled");
                report.cancelled = true;
                break;
            }

            let model_type = match record.model_type {
                Some(model_type) if model_type.is_known() => model_type,
                _ => {
                    let result = FileResult {
                        name: record.name.clone(),
                        outcome: FileOutcome::Skipped,
                    };
                    tracker.report(result.clone());
                    report.results.push(result);
                    report.skipped += 1;
                    continue;
                }
            };

            let outcome = match self.move_one(record, model_type, root) {
                Ok((to, renamed)) => {
                    report.moved += 1;
                    if renamed {
                        report.renamed += 1;
                    }
                    FileOutcome::Moved { to, renamed }
                }
                Err(e) => {
                    warn!("{}: move failed: {}", record.name, e);
                    report.failed += 1;
                    FileOutcome::Failed {
                        error: e.to_string(),
                    }
                }
            };

            let result = FileResult {
                name: record.name.clone(),
                outcome,
            };
            tracker.record_move(result.clone());
            report.results.push(result);
        }

        info!(
            "Moved {} files ({} renamed), skipped {}, {} failed",
            report.moved, report.renamed, report.skipped, report.failed
        );
        report
    }

    fn move_one(
        &mut self,
        record: &FileRecord,
        model_type: ModelType,
        root: &Path,
    ) -> Result<(PathBuf, bool)> {
        let folder = model_type
            .folder_name()
            .ok_or_else(|| SortError::Other(format!("{} has no folder", model_type)))?;
        let dir = root.join(folder);
        std::fs::create_dir_all(&dir).map_err(|e| SortError::io_with_path(e, &dir))?;

        let mut target = dir.join(&record.file_name);
        let mut renamed = false;
        loop {
            match place(&record.path, &target) {
                Ok(()) => break,
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    debug!("{} is taken", target.display());
                    target = dir.join(self.token_name(&record.file_name));
                    renamed = true;
                }
                Err(e) => return Err(move_error(record, &target, e)),
            }
        }

        if renamed {
            info!("{} -> {} (renamed)", record.name, target.display());
        } else {
            info!("{} -> {}", record.name, target.display());
        }
        Ok((target, renamed))
    }

    /// `<token>_<file name>` with a fresh token.
    fn token_name(&mut self, file_name: &OsStr) -> OsString {
        let mut name = OsString::from(format!("{}_", self.next_token()));
        name.push(file_name);
        name
    }

    fn next_token(&mut self) -> i64 {
        self.last_token = Utc::now().timestamp().max(self.last_token + 1);
        self.last_token
    }
}

/// Move `from` to `to`, failing with `AlreadyExists` if anything is at `to`.
///
/// A hard link refuses to replace an existing entry, including a dangling
/// symlink, so the check and the move are one step. Filesystems without
/// hard links fall back to a no-follow probe and a rename.
fn place(from: &Path, to: &Path) -> io::Result<()> {
    match std::fs::hard_link(from, to) {
        Ok(()) => {
            if let Err(e) = std::fs::remove_file(from) {
                let _ = std::fs::remove_file(to);
                return Err(e);
            }
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists || is_cross_device(&e) => Err(e),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(e),
        Err(e) => {
            debug!("Hard link to {} failed ({}), renaming", to.display(), e);
            match std::fs::symlink_metadata(to) {
                Ok(_) => Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("{} already exists", to.display()),
                )),
                Err(e) if e.kind() == io::ErrorKind::NotFound => std::fs::rename(from, to),
                Err(e) => Err(e),
            }
        }
    }
}

fn move_error(record: &FileRecord, target: &Path, e: io::Error) -> SortError {
    let message = if is_cross_device(&e) {
        format!(
            "cannot move {} to {}: destination is on another device",
            record.path.display(),
            target.display()
        )
    } else {
        format!(
            "cannot move {} to {}: {}",
            record.path.display(),
            target.display(),
            e
        )
    };
    SortError::Io {
        message,
        path: Some(record.path.clone()),
        source: Some(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{ChannelSink, ProgressEvent};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn record(dir: &Path, name: &str, model_type: Option<ModelType>) -> FileRecord {
        let path = dir.join(name);
        std::fs::write(&path, format!("new {}", name)).unwrap();
        let mut record = FileRecord::new(path);
        record.model_type = model_type;
        record
    }

    #[test]
    fn test_moves_known_and_skips_unknown() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let records = vec![
            record(root, "a.safetensors", Some(ModelType::Lora)),
            record(root, "b.ckpt", Some(ModelType::Checkpoint)),
            record(root, "c.bin", Some(ModelType::Unknown)),
            record(root, "d.pt", None),
        ];

        let report = Relocator::new().relocate(
            &records,
            root,
            &ProgressTracker::silent(),
            &CancellationToken::new(),
        );

        assert_eq!(report.moved, 2);
        assert_eq!(report.skipped, 2);
        assert!(root.join("LORA/a.safetensors").exists());
        assert!(root.join("Checkpoint/b.ckpt").exists());
        assert!(root.join("c.bin").exists());
        assert!(root.join("d.pt").exists());
        assert!(!root.join("a.safetensors").exists());
    }

    #[test]
    fn test_collision_never_overwrites() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        std::fs::create_dir_all(root.join("LORA")).unwrap();
        std::fs::write(root.join("LORA/a.safetensors"), "original").unwrap();
        let records = vec![record(root, "a.safetensors", Some(ModelType::Lora))];

        let report = Relocator::new().relocate(
            &records,
            root,
            &ProgressTracker::silent(),
            &CancellationToken::new(),
        );

        assert_eq!(report.renamed, 1);
        assert_eq!(
            std::fs::read_to_string(root.join("LORA/a.safetensors")).unwrap(),
            "original"
        );
        let FileOutcome::Moved { to, renamed } = &report.results[0].outcome else {
            panic!("expected a move, got {:?}", report.results[0].outcome);
        };
        assert!(renamed);
        let file_name = to.file_name().unwrap().to_string_lossy().into_owned();
        let (token, rest) = file_name.split_once('_').unwrap();
        assert!(token.parse::<i64>().is_ok());
        assert_eq!(rest, "a.safetensors");
        assert_eq!(std::fs::read_to_string(to).unwrap(), "new a.safetensors");
    }

    #[test]
    fn test_tokens_strictly_increase() {
        let mut relocator = Relocator::new();
        let first = relocator.next_token();
        let second = relocator.next_token();
        let third = relocator.next_token();
        assert!(first < second && second < third);
    }

    #[test]
    fn test_taken_token_is_bumped() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let dir = root.join("VAE");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("a.pt"), "x").unwrap();

        let mut relocator = Relocator::new();
        let predicted = Utc::now().timestamp() + 1;
        for token in predicted - 1..predicted + 5 {
            std::fs::write(dir.join(format!("{}_a.pt", token)), "taken").unwrap();
        }
        relocator.last_token = predicted - 2;

        let records = vec![record(root, "a.pt", Some(ModelType::Vae))];
        let report = relocator.relocate(
            &records,
            root,
            &ProgressTracker::silent(),
            &CancellationToken::new(),
        );

        assert_eq!(report.renamed, 1);
        let FileOutcome::Moved { to, .. } = &report.results[0].outcome else {
            panic!("expected a move, got {:?}", report.results[0].outcome);
        };
        assert_eq!(std::fs::read_to_string(to).unwrap(), "new a.pt");
        for token in predicted - 1..predicted + 5 {
            assert_eq!(
                std::fs::read_to_string(dir.join(format!("{}_a.pt", token))).unwrap(),
                "taken"
            );
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_dangling_symlink_at_destination_is_kept() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        std::fs::create_dir_all(root.join("LORA")).unwrap();
        let link = root.join("LORA/a.pt");
        std::os::unix::fs::symlink("/nonexistent/target", &link).unwrap();
        let records = vec![record(root, "a.pt", Some(ModelType::Lora))];

        let report = Relocator::new().relocate(
            &records,
            root,
            &ProgressTracker::silent(),
            &CancellationToken::new(),
        );

        assert_eq!(report.moved, 1);
        assert_eq!(report.renamed, 1);
        let metadata = std::fs::symlink_metadata(&link).unwrap();
        assert!(metadata.file_type().is_symlink());
        assert_eq!(
            std::fs::read_link(&link).unwrap(),
            Path::new("/nonexistent/target")
        );
        assert!(!root.join("a.pt").exists());
    }

    #[test]
    fn test_place_refuses_existing_target() {
        let temp_dir = TempDir::new().unwrap();
        let from = temp_dir.path().join("from.pt");
        let to = temp_dir.path().join("to.pt");
        std::fs::write(&from, "new").unwrap();
        std::fs::write(&to, "old").unwrap();

        let err = place(&from, &to).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert_eq!(std::fs::read_to_string(&to).unwrap(), "old");
        assert_eq!(std::fs::read_to_string(&from).unwrap(), "new");
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_name_is_preserved() {
        use std::os::unix::ffi::OsStrExt;

        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let raw = OsStr::from_bytes(b"model\xff.pt");
        let path = root.join(raw);
        std::fs::write(&path, "weights").unwrap();
        let mut odd = FileRecord::new(path);
        odd.model_type = Some(ModelType::Lora);

        std::fs::create_dir_all(root.join("LORA")).unwrap();
        let relocator_report = Relocator::new().relocate(
            &[odd.clone()],
            root,
            &ProgressTracker::silent(),
            &CancellationToken::new(),
        );
        assert_eq!(relocator_report.moved, 1);
        assert!(root.join("LORA").join(raw).exists());

        // A second file with the same raw name collides and keeps its bytes.
        std::fs::write(root.join(raw), "again").unwrap();
        let report = Relocator::new().relocate(
            &[odd],
            root,
            &ProgressTracker::silent(),
            &CancellationToken::new(),
        );
        let FileOutcome::Moved { to, renamed: true } = &report.results[0].outcome else {
            panic!("expected a renamed move, got {:?}", report.results[0].outcome);
        };
        assert!(to.file_name().unwrap().as_bytes().ends_with(b"_model\xff.pt"));
    }

    #[test]
    fn test_missing_source_is_per_file_failure() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let mut gone = FileRecord::new(root.join("gone.pt"));
        gone.model_type = Some(ModelType::Vae);
        let records = vec![gone, record(root, "here.pt", Some(ModelType::Vae))];

        let report = Relocator::new().relocate(
            &records,
            root,
            &ProgressTracker::silent(),
            &CancellationToken::new(),
        );

        assert_eq!(report.failed, 1);
        assert_eq!(report.moved, 1);
        assert!(root.join("VAE/here.pt").exists());
    }

    #[test]
    fn test_prepare_folders() {
        let temp_dir = TempDir::new().unwrap();
        Relocator::prepare_folders(temp_dir.path()).unwrap();
        for folder in ["Checkpoint", "TextualInversion", "LORA", "VAE", "LoCon"] {
            assert!(temp_dir.path().join(folder).is_dir());
        }
        Relocator::prepare_folders(temp_dir.path()).unwrap();
    }

    #[test]
    fn test_move_progress_counts_movable_only() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let records = vec![
            record(root, "a.pt", Some(ModelType::Lora)),
            record(root, "b.pt", Some(ModelType::Unknown)),
        ];
        let (sink, mut rx) = ChannelSink::new();

        Relocator::new().relocate(
            &records,
            root,
            &ProgressTracker::new(Arc::new(sink)),
            &CancellationToken::new(),
        );

        let mut moves = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let ProgressEvent::Move { done, total } = event {
                moves.push((done, total));
            }
        }
        assert_eq!(moves, vec![(1, 1)]);
    }

    #[test]
    fn test_cancelled_relocation_moves_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let records = vec![record(root, "a.pt", Some(ModelType::Lora))];
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report =
            Relocator::new().relocate(&records, root, &ProgressTracker::silent(), &cancel);

        assert!(report.cancelled);
        assert_eq!(report.moved, 0);
        assert!(root.join("a.pt").exists());
    }

    #[test]
    fn test_cancel_stops_skipped_reports_too() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let records = vec![
            record(root, "a.pt", Some(ModelType::Lora)),
            record(root, "b.pt", Some(ModelType::Unknown)),
            record(root, "c.pt", None),
            record(root, "d.pt", Some(ModelType::Vae)),
        ];
        let cancel = CancellationToken::new();
        let sink_cancel = cancel.clone();
        let events = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen = events.clone();
        let tracker = ProgressTracker::new(Arc::new(move |event: ProgressEvent| {
            if matches!(event, ProgressEvent::Move { .. }) {
                sink_cancel.cancel();
            }
            seen.lock().unwrap().push(event);
        }));

        let report = Relocator::new().relocate(&records, root, &tracker, &cancel);

        assert!(report.cancelled);
        assert_eq!(report.moved, 1);
        assert_eq!(report.skipped, 0);
        assert_eq!(report.results.len(), 1);
        assert_eq!(events.lock().unwrap().len(), 2);
        assert!(root.join("LORA/a.pt").exists());
        assert!(root.join("d.pt").exists());
    }
}
