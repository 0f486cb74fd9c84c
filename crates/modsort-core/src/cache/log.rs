//! Append-only `name:type` log backing the persisted cache tier.
//!
//! One UTF-8 record per line. Names are backslash-escaped so a `:` or a line
//! break inside a file name cannot corrupt the record boundary; logs written
//! without escapes parse the same as long as the name has no `:`.

use crate::error::{Result, SortError};
use crate::types::ModelType;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const DELIMITER: char = ':';

/// Exclusive handle on the cache log file.
#[derive(Debug)]
pub struct CacheLog {
    path: PathBuf,
    file: File,
}

impl CacheLog {
    /// Open (or create) the log and take an exclusive lock on it.
    ///
    /// Fails with `CacheLocked` if another handle already holds the lock.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| SortError::cache_log(e, &path))?;
            }
        }

        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)
            .map_err(|e| SortError::cache_log(e, &path))?;

        if let Err(e) = file.try_lock_exclusive() {
            let contended = e.kind() == std::io::ErrorKind::WouldBlock
                || e.raw_os_error() == fs2::lock_contended_error().raw_os_error();
            return Err(if contended {
                SortError::CacheLocked(path)
            } else {
                SortError::cache_log(e, &path)
            });
        }

        debug!("Opened cache log {}", path.display());
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every valid record in file order.
    ///
    /// Malformed lines and lines whose type is not sortable are skipped.
    pub fn read_all(&mut self) -> Result<Vec<(String, ModelType)>> {
        self.file
            .seek(SeekFrom::Start(0))
            .map_err(|e| SortError::cache_log(e, &self.path))?;

        let mut records = Vec::new();
        let reader = BufReader::new(&self.file);
        for (index, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| SortError::cache_log(e, &self.path))?;
            if line.trim().is_empty() {
                continue;
            }
            match parse_record(&line) {
                Some((name, model_type)) if model_type.is_known() => {
                    records.push((name, model_type));
                }
                Some((name, _)) => {
                    debug!("Ignoring unsortable cache record for {}", name);
                }
                None => {
                    warn!(
                        "Skipping malformed line {} in cache log {}",
                        index + 1,
                        self.path.display()
                    );
                }
            }
        }

        Ok(records)
    }

    /// Append one record and make it durable before returning.
    pub fn append(&mut self, name: &str, model_type: ModelType) -> Result<()> {
        let line = format_record(name, model_type);
        self.file
            .write_all(line.as_bytes())
            .and_then(|_| self.file.flush())
            .and_then(|_| self.file.sync_data())
            .map_err(|e| SortError::cache_log(e, &self.path))
    }

    /// Flush, sync and unlock.
    pub fn release(self) -> Result<()> {
        self.file
            .sync_all()
            .map_err(|e| SortError::cache_log(e, &self.path))?;
        FileExt::unlock(&self.file).map_err(|e| SortError::cache_log(e, &self.path))?;
        debug!("Released cache log {}", self.path.display());
        Ok(())
    }
}

fn format_record(name: &str, model_type: ModelType) -> String {
    format!("{}{}{}\n", escape_name(name), DELIMITER, model_type.as_str())
}

fn escape_name(name: &str) -> String {
    let mut escaped = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            ':' => escaped.push_str("\\:"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Split a line at its first unescaped delimiter and unescape the name.
fn parse_record(line: &str) -> Option<(String, ModelType)> {
    let mut name = String::new();
    let mut chars = line.char_indices();

    while let Some((index, c)) = chars.next() {
        match c {
            '\\' => match chars.next()?.1 {
                '\\' => name.push('\\'),
                ':' => name.push(':'),
                'n' => name.push('\n'),
                'r' => name.push('\r'),
                _ => return None,
            },
            DELIMITER => {
                let label = line[index + DELIMITER.len_utf8()..].trim();
                if name.is_empty() || label.is_empty() {
                    return None;
                }
                return Some((name, ModelType::from_remote_label(label)));
            }
            other => name.push(other),
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_escape_round_trip() {
        let names = [
            "a.safetensors",
            "weird:name.ckpt",
            "back\\slash.pt",
            "line\nbreak.bin",
        ];
        for name in names {
            let line = format_record(name, ModelType::Lora);
            let parsed = parse_record(line.trim_end_matches('\n')).unwrap();
            assert_eq!(parsed, (name.to_string(), ModelType::Lora));
        }
    }

    #[test]
    fn test_parse_plain_record() {
        assert_eq!(
            parse_record("b.ckpt:Checkpoint"),
            Some(("b.ckpt".to_string(), ModelType::Checkpoint))
        );
        assert_eq!(
            parse_record("v.pt:None"),
            Some(("v.pt".to_string(), ModelType::Unknown))
        );
    }

    #[test]
    fn test_parse_malformed_record() {
        assert_eq!(parse_record("no delimiter"), None);
        assert_eq!(parse_record(":LORA"), None);
        assert_eq!(parse_record("a.pt:"), None);
        assert_eq!(parse_record("bad\\escape:LORA"), None);
    }

    #[test]
    fn test_append_then_read() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("classifications.log");

        let mut log = CacheLog::open(&path).unwrap();
        log.append("a.safetensors", ModelType::Lora).unwrap();
        log.append("x:y.ckpt", ModelType::Checkpoint).unwrap();

        let records = log.read_all().unwrap();
        assert_eq!(
            records,
            vec![
                ("a.safetensors".to_string(), ModelType::Lora),
                ("x:y.ckpt".to_string(), ModelType::Checkpoint),
            ]
        );

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "a.safetensors:LORA\nx\\:y.ckpt:Checkpoint\n");
    }

    #[test]
    fn test_read_skips_garbage_lines() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("classifications.log");
        std::fs::write(&path, "a.pt:VAE\n\ngarbage\nb.pt:None\nc.pt:LoCon\n").unwrap();

        let mut log = CacheLog::open(&path).unwrap();
        let records = log.read_all().unwrap();
        assert_eq!(
            records,
            vec![
                ("a.pt".to_string(), ModelType::Vae),
                ("c.pt".to_string(), ModelType::LoCon),
            ]
        );
    }

    #[test]
    fn test_second_open_is_locked() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("classifications.log");

        let log = CacheLog::open(&path).unwrap();
        let second = CacheLog::open(&path);
        assert!(matches!(second, Err(SortError::CacheLocked(_))));

        log.release().unwrap();
        assert!(CacheLog::open(&path).is_ok());
    }
}
