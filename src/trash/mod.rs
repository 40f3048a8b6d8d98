use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::TrashConfig;

pub struct TrashManager {
    config: TrashConfig,
}

#[derive(Debug, Clone)]
pub struct TrashEntry {
    pub trash_path: PathBuf,
    pub trashed_at: DateTime<Utc>,
    pub size: u64,
}

/// A file moved into the trash, remembered so the move can be undone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrashedFile {
    pub original_path: PathBuf,
    pub trash_path: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PurgeResult {
    pub files_deleted: usize,
    pub bytes_freed: u64,
}

impl TrashManager {
    pub fn new(config: TrashConfig) -> Self {
        Self { config }
    }

    fn ensure_trash_dir(&self) -> Result<()> {
        if !self.config.path.exists() {
            fs::create_dir_all(&self.config.path)
                .context("Failed to create trash directory")?;
        }
        Ok(())
    }

    /// Unique name inside the trash; the counter keeps names distinct
    /// within the same second.
    fn generate_trash_name(&self, original: &Path) -> PathBuf {
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let timestamp = Utc::now().timestamp();
        let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
        let original_name = original.file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let extension = original.extension()
            .map(|s| format!(".{}", s.to_string_lossy()))
            .unwrap_or_default();

        let trash_name = format!("{}_{}_{}{}", original_name, timestamp, seq, extension);
        self.config.path.join(trash_name)
    }

    /// Move file to trash, returns new path
    pub fn move_to_trash(&self, path: &Path) -> Result<PathBuf> {
        self.ensure_trash_dir()?;

        let trash_path = self.generate_trash_name(path);
        move_file(path, &trash_path)
            .with_context(|| format!("Failed to move {} to trash", path.display()))?;
        tracing::debug!(from = %path.display(), to = %trash_path.display(), "Moved to trash");
        Ok(trash_path)
    }

    /// Move every path to the trash, or none of them.
    ///
    /// On the first failure, files already moved are put back and the error
    /// is returned.
    pub fn move_all_to_trash(&self, paths: &[PathBuf]) -> Result<Vec<TrashedFile>> {
        let mut moved: Vec<TrashedFile> = Vec::with_capacity(paths.len());

        for path in paths {
            match self.move_to_trash(path) {
                Ok(trash_path) => moved.push(TrashedFile {
                    original_path: path.clone(),
                    trash_path,
                }),
                Err(e) => {
                    for file in moved.iter().rev() {
                        if let Err(restore_err) = self.restore(&file.trash_path, &file.original_path) {
                            tracing::error!(
                                path = %file.original_path.display(),
                                error = %restore_err,
                                "Failed to roll back trash move"
                            );
                        }
                    }
                    return Err(e);
                }
            }
        }

        Ok(moved)
    }

    /// Restore file from trash to original location
    pub fn restore(&self, trash_path: &Path, original_path: &Path) -> Result<()> {
        if let Some(parent) = original_path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)
                    .context("Failed to create parent directory for restore")?;
            }
        }

        if original_path.exists() {
            anyhow::bail!("Cannot restore: file already exists at {}", original_path.display());
        }

        move_file(trash_path, original_path).context("Failed to restore file from trash")
    }

    /// Files currently in the trash, oldest first.
    pub fn list(&self) -> Result<Vec<TrashEntry>> {
        if !self.config.path.exists() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        for entry in fs::read_dir(&self.config.path)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let metadata = entry.metadata()?;
            // Renames keep the photo's own mtime, so prefer the name stamp.
            let trashed_at = trashed_at_from_name(&entry.path())
                .or_else(|| metadata.modified().ok().map(DateTime::<Utc>::from))
                .unwrap_or_else(Utc::now);
            entries.push(TrashEntry {
                trash_path: entry.path(),
                trashed_at,
                size: metadata.len(),
            });
        }

        entries.sort_by_key(|e| e.trashed_at);
        Ok(entries)
    }

    pub fn total_size(&self) -> Result<u64> {
        Ok(self.list()?.iter().map(|e| e.size).sum())
    }

    /// Delete entries older than `max_age_days`, then the oldest remaining
    /// ones until the trash fits in `max_size_bytes`.
    pub fn purge(&self, now: DateTime<Utc>) -> Result<PurgeResult> {
        let cutoff = now - Duration::days(i64::from(self.config.max_age_days));
        let mut entries = self.list()?;
        let mut total: u64 = entries.iter().map(|e| e.size).sum();
        let mut result = PurgeResult::default();

        entries.retain(|entry| {
            if entry.trashed_at >= cutoff {
                return true;
            }
            match fs::remove_file(&entry.trash_path) {
                Ok(()) => {
                    result.files_deleted += 1;
                    result.bytes_freed += entry.size;
                    total -= entry.size;
                    false
                }
                Err(e) => {
                    tracing::warn!(path = %entry.trash_path.display(), error = %e, "Failed to purge trash entry");
                    true
                }
            }
        });

        for entry in &entries {
            if total <= self.config.max_size_bytes {
                break;
            }
            fs::remove_file(&entry.trash_path)
                .with_context(|| format!("Failed to purge {}", entry.trash_path.display()))?;
            result.files_deleted += 1;
            result.bytes_freed += entry.size;
            total -= entry.size;
        }

        if result.files_deleted > 0 {
            tracing::info!(files = result.files_deleted, bytes = result.bytes_freed, "Purged trash");
        }
        Ok(result)
    }

    pub fn trash_path(&self) -> &Path {
        &self.config.path
    }
}

/// Timestamp embedded by `generate_trash_name`.
fn trashed_at_from_name(path: &Path) -> Option<DateTime<Utc>> {
    let stem = path.file_stem()?.to_str()?;
    let mut parts = stem.rsplitn(3, '_');
    let _seq = parts.next()?;
    let timestamp = parts.next()?.parse::<i64>().ok()?;
    DateTime::from_timestamp(timestamp, 0)
}

/// Rename, falling back to copy and delete across filesystems.
fn move_file(from: &Path, to: &Path) -> Result<()> {
    match fs::rename(from, to) {
        Ok(_) => Ok(()),
        Err(_) => {
            fs::copy(from, to).context("Failed to copy file")?;
            fs::remove_file(from).context("Failed to remove original after copying")?;
            Ok(())
        }
    }
}
