//! Uninstall cleanup: remove an addon and its cached download artifacts.
//!
//! The primary install directory is removed recursively. Each cache
//! directory is emptied entry by entry, skipping the reserved working entry,
//! which holds in-progress fragment state for other installs. Entries are
//! removed with `remove_file`, never recursively; the reserved entry is not
//! opened at all.
//!
//! Callers must not run an install and an uninstall against the same paths
//! at the same time; nothing here guards against it.

use std::path::{Path, PathBuf};

use tokio::fs;

use crate::errors::CleanupError;
use crate::models::CleanupReport;

/// Remove `primary_dir` and every cache entry except `reserved_entry`.
///
/// Missing directories are treated as already clean. The first deletion
/// failure aborts the cleanup and is returned, leaving later entries in
/// place.
pub async fn uninstall(
    primary_dir: &Path,
    cache_dirs: &[PathBuf],
    reserved_entry: &str,
) -> Result<CleanupReport, CleanupError> {
    let mut report = CleanupReport::default();

    if exists(primary_dir).await? {
        fs::remove_dir_all(primary_dir)
            .await
            .map_err(|e| CleanupError::io(primary_dir, e))?;
        log::info!("removed install directory {}", primary_dir.display());
        report.primary_removed = true;
    }

    for cache_dir in cache_dirs {
        if !exists(cache_dir).await? {
            continue;
        }
        clear_cache_dir(cache_dir, reserved_entry, &mut report.removed_entries).await?;
    }

    Ok(report)
}

async fn clear_cache_dir(
    cache_dir: &Path,
    reserved_entry: &str,
    removed: &mut Vec<PathBuf>,
) -> Result<(), CleanupError> {
    let mut entries = fs::read_dir(cache_dir)
        .await
        .map_err(|e| CleanupError::io(cache_dir, e))?;

    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| CleanupError::io(cache_dir, e))?
    {
        if entry.file_name() == reserved_entry {
            continue;
        }
        let path = entry.path();
        fs::remove_file(&path)
            .await
            .map_err(|e| CleanupError::io(&path, e))?;
        log::debug!("removed cache entry {}", path.display());
        removed.push(path);
    }

    Ok(())
}

async fn exists(path: &Path) -> Result<bool, CleanupError> {
    fs::try_exists(path)
        .await
        .map_err(|e| CleanupError::io(path, e))
}
