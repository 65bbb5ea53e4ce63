//! Crash-safe replacement of Steam's files.
//!
//! Every write follows the same sequence: copy the live file to
//! `<name>.backup_<unixtime>`, write the new content to a temporary file in
//! the same directory, then rename the temporary file over the original.
//! Until the rename the live file is untouched.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::SteamError;

const BACKUP_MARKER: &str = ".backup_";

/// New content written next to its target but not yet visible under the
/// target's name.
#[derive(Debug)]
pub struct StagedWrite {
    target: PathBuf,
    temp: NamedTempFile,
    backup: Option<PathBuf>,
}

impl StagedWrite {
    /// Path of the backup taken while staging, if the target existed.
    pub fn backup_path(&self) -> Option<&Path> {
        self.backup.as_deref()
    }

    /// Path of the staged temporary file.
    pub fn temp_path(&self) -> &Path {
        self.temp.path()
    }

    /// Atomically renames the staged file over the target.
    pub fn commit(self) -> Result<Option<PathBuf>, SteamError> {
        let target = self.target;
        self.temp.persist(&target).map_err(|e| {
            tracing::error!(path = %target.display(), "atomic rename failed: {}", e.error);
            SteamError::Io(format!("failed to replace {}: {}", target.display(), e.error))
        })?;
        tracing::debug!(path = %target.display(), "replaced file");
        Ok(self.backup)
    }
}

/// Backs up `path` (if present) and writes `contents` to a temporary file
/// beside it. Dropping the returned value discards the temporary file.
pub fn stage(path: &Path, contents: &[u8]) -> Result<StagedWrite, SteamError> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    fs::create_dir_all(parent).map_err(|e| {
        SteamError::Io(format!("failed to create directory {}: {e}", parent.display()))
    })?;

    let backup = backup_file(path)?;

    let mut temp = NamedTempFile::new_in(parent).map_err(|e| {
        SteamError::Io(format!("failed to create temp file in {}: {e}", parent.display()))
    })?;
    temp.write_all(contents)
        .and_then(|()| temp.as_file().sync_all())
        .map_err(|e| {
            tracing::error!(path = %temp.path().display(), "failed to write temp file: {e}");
            SteamError::Io(format!("failed to write {}: {e}", temp.path().display()))
        })?;

    Ok(StagedWrite {
        target: path.to_path_buf(),
        temp,
        backup,
    })
}

/// Backs up `path` then atomically replaces it with `contents`. Returns the
/// backup path, or `None` when there was no previous file.
pub fn backup_then_replace(path: &Path, contents: &[u8]) -> Result<Option<PathBuf>, SteamError> {
    stage(path, contents)?.commit()
}

/// Copies `path` to a timestamped sibling. Returns `None` if `path` does not
/// exist.
pub fn backup_file(path: &Path) -> Result<Option<PathBuf>, SteamError> {
    if !path.exists() {
        return Ok(None);
    }

    let file_name = file_name_of(path)?;
    let stamp = chrono::Utc::now().timestamp();
    let base = format!("{file_name}{BACKUP_MARKER}{stamp}");

    let mut backup = path.with_file_name(&base);
    let mut n = 1;
    while backup.exists() {
        backup = path.with_file_name(format!("{base}_{n}"));
        n += 1;
    }

    fs::copy(path, &backup).map_err(|e| {
        tracing::error!(path = %path.display(), "failed to create backup: {e}");
        SteamError::Io(format!("failed to back up {}: {e}", path.display()))
    })?;
    tracing::info!(path = %path.display(), backup = %backup.display(), "created backup");
    Ok(Some(backup))
}

/// Returns the most recent backup of `path`, if any exist.
pub fn latest_backup(path: &Path) -> Option<PathBuf> {
    let file_name = path.file_name()?.to_str()?;
    let prefix = format!("{file_name}{BACKUP_MARKER}");
    let dir = path.parent()?;

    fs::read_dir(dir)
        .ok()?
        .flatten()
        .filter_map(|entry| {
            let name = entry.file_name().into_string().ok()?;
            let rest = name.strip_prefix(&prefix)?;
            let (stamp, seq) = match rest.split_once('_') {
                Some((s, n)) => (s.parse::<i64>().ok()?, n.parse::<u32>().ok()?),
                None => (rest.parse::<i64>().ok()?, 0),
            };
            Some(((stamp, seq), entry.path()))
        })
        .max_by_key(|(key, _)| *key)
        .map(|(_, p)| p)
}

fn file_name_of(path: &Path) -> Result<&str, SteamError> {
    path.file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| SteamError::Io(format!("invalid file name: {}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backups_of(dir: &Path) -> Vec<PathBuf> {
        let mut found: Vec<_> = fs::read_dir(dir)
            .unwrap()
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.to_string_lossy().contains(BACKUP_MARKER))
            .collect();
        found.sort();
        found
    }

    #[test]
    fn replace_creates_backup_of_previous_content() {
        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("shortcuts.vdf");
        fs::write(&target, b"old").unwrap();

        let backup = backup_then_replace(&target, b"new").unwrap().unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"new");
        assert_eq!(fs::read(&backup).unwrap(), b"old");
        assert!(backup
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("shortcuts.vdf.backup_"));
    }

    #[test]
    fn replace_without_previous_file() {
        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("nested").join("config.vdf");

        assert!(backup_then_replace(&target, b"fresh").unwrap().is_none());
        assert_eq!(fs::read(&target).unwrap(), b"fresh");
    }

    #[test]
    fn same_second_backups_do_not_collide() {
        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("config.vdf");
        fs::write(&target, b"v1").unwrap();

        backup_then_replace(&target, b"v2").unwrap();
        backup_then_replace(&target, b"v3").unwrap();
        backup_then_replace(&target, b"v4").unwrap();

        let backups = backups_of(tmp.path());
        assert_eq!(backups.len(), 3);
        assert_eq!(fs::read(latest_backup(&target).unwrap()).unwrap(), b"v3");
    }

    #[test]
    fn dropped_stage_leaves_original_intact() {
        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("shortcuts.vdf");
        fs::write(&target, b"original bytes").unwrap();

        let staged = stage(&target, b"half-written").unwrap();
        let temp_path = staged.temp_path().to_path_buf();
        assert!(temp_path.exists());
        drop(staged);

        assert_eq!(fs::read(&target).unwrap(), b"original bytes");
        assert!(!temp_path.exists());
    }

    #[test]
    fn crash_before_rename_never_exposes_partial_file() {
        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("shortcuts.vdf");
        fs::write(&target, b"original bytes").unwrap();

        // A killed process runs no destructors; the temp file is orphaned.
        let staged = stage(&target, b"new content").unwrap();
        let temp_path = staged.temp_path().to_path_buf();
        std::mem::forget(staged);

        assert_eq!(fs::read(&target).unwrap(), b"original bytes");
        assert_eq!(fs::read(&temp_path).unwrap(), b"new content");
        assert_ne!(temp_path, target);
    }

    #[test]
    fn latest_backup_none_when_absent() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(latest_backup(&tmp.path().join("shortcuts.vdf")).is_none());
    }
}
