pub mod discovery;
pub mod markdown;

use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::{Error, Result};
use crate::model::TaskRecord;
use crate::sync::conflict::Conflict;

pub use markdown::{FieldUpdates, TaskDocument};

/// Read and write access to task files.
pub trait TaskStore: Send + Sync {
    fn read_document(&self, path: &Path) -> Result<TaskDocument>;

    fn read(&self, path: &Path) -> Result<TaskRecord> {
        Ok(self.read_document(path)?.record)
    }

    /// Apply field updates, optionally keeping a `.backup` copy first.
    fn write(&self, path: &Path, updates: &FieldUpdates, backup: bool) -> Result<()>;

    /// Add a conflict marker. Returns `false` if one was already present.
    fn mark_for_review(&self, path: &Path, conflict: &Conflict) -> Result<bool>;

    fn link_issue(&self, path: &Path, number: u64, url: &str) -> Result<()>;
}

/// Task files stored as markdown on the local file system.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownTaskStore;

impl MarkdownTaskStore {
    pub fn new() -> Self {
        Self
    }

    fn read_content(path: &Path) -> Result<String> {
        fs::read_to_string(path).map_err(|e| Error::task_file(path, format!("cannot read: {e}")))
    }

    /// Replace `path` with `updated`, restoring from `backup` if that fails.
    fn replace(path: &Path, updated: &str, backup: Option<&Path>) -> Result<()> {
        Self::replace_with(path, updated, backup, atomic_write)
    }

    fn replace_with(
        path: &Path,
        updated: &str,
        backup: Option<&Path>,
        write: impl FnOnce(&Path, &[u8]) -> std::io::Result<()>,
    ) -> Result<()> {
        let Err(e) = write(path, updated.as_bytes()) else {
            return Ok(());
        };
        if let Some(backup) = backup {
            match fs::copy(backup, path) {
                Ok(_) => log::warn!("Restored {} from backup", path.display()),
                Err(re) => log::error!("Could not restore {} from backup: {re}", path.display()),
            }
        }
        Err(Error::task_file(path, format!("write failed: {e}")))
    }
}

pub fn backup_path(path: &Path) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(".backup");
    PathBuf::from(name)
}

/// Write through a tempfile in the same directory so readers never see a
/// half-written task file.
pub fn atomic_write(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

impl TaskStore for MarkdownTaskStore {
    fn read_document(&self, path: &Path) -> Result<TaskDocument> {
        let content = Self::read_content(path)?;
        markdown::parse_document(path, &content)
    }

    fn write(&self, path: &Path, updates: &FieldUpdates, backup: bool) -> Result<()> {
        let content = Self::read_content(path)?;
        let updated = markdown::apply_updates(&content, updates);
        if updated == content {
            return Ok(());
        }

        let backup_file = if backup {
            let backup_file = backup_path(path);
            fs::copy(path, &backup_file)
                .map_err(|e| Error::task_file(path, format!("cannot create backup: {e}")))?;
            log::debug!("Backed up {} to {}", path.display(), backup_file.display());
            Some(backup_file)
        } else {
            None
        };

        Self::replace(path, &updated, backup_file.as_deref())
    }

    fn mark_for_review(&self, path: &Path, conflict: &Conflict) -> Result<bool> {
        let content = Self::read_content(path)?;
        let Some(marked) = markdown::insert_conflict_marker(&content, conflict) else {
            log::debug!("{} already carries a conflict marker", path.display());
            return Ok(false);
        };
        Self::replace(path, &marked, None)?;
        Ok(true)
    }

    fn link_issue(&self, path: &Path, number: u64, url: &str) -> Result<()> {
        let content = Self::read_content(path)?;
        let linked = markdown::set_issue_link(&content, number, url);
        if linked == content {
            return Ok(());
        }
        Self::replace(path, &linked, None)
    }
}
