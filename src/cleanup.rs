//! Best-effort removal of intermediate files
//!
//! Nothing in here fails: every removal problem is logged and returned as a
//! [`CleanupWarning`] so callers can report it without aborting.

use crate::error::CleanupWarning;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// Delete each file in `paths`; a file that is already gone is not a problem
pub(crate) async fn remove_files<'a, I>(paths: I) -> Vec<CleanupWarning>
where
    I: IntoIterator<Item = &'a Path>,
{
    let mut warnings = Vec::new();
    let mut deleted = 0;

    for path in paths {
        match fs::remove_file(path).await {
            Ok(()) => {
                debug!(path = %path.display(), "deleted intermediate file");
                deleted += 1;
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to delete file");
                warnings.push(CleanupWarning::new(path, e));
            }
        }
    }

    debug!(deleted, failed = warnings.len(), "file cleanup finished");
    warnings
}

/// Remove a run workspace
///
/// With `keep_files` set the workspace is only removed when it holds no
/// files; otherwise it is removed with everything inside it.
pub(crate) async fn remove_workspace(workspace: &Path, keep_files: bool) -> Vec<CleanupWarning> {
    if fs::metadata(workspace).await.is_err() {
        debug!(workspace = %workspace.display(), "workspace does not exist, skipping cleanup");
        return Vec::new();
    }

    if keep_files {
        return match is_empty_dir(workspace).await {
            Ok(true) => remove_dir(workspace).await,
            Ok(false) => {
                debug!(workspace = %workspace.display(), "keeping workspace with fetched files");
                Vec::new()
            }
            Err(e) => {
                warn!(workspace = %workspace.display(), error = %e, "failed to inspect workspace");
                vec![CleanupWarning::new(workspace, e)]
            }
        };
    }

    match fs::remove_dir_all(workspace).await {
        Ok(()) => {
            debug!(workspace = %workspace.display(), "removed workspace");
            Vec::new()
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Vec::new(),
        Err(e) => {
            warn!(workspace = %workspace.display(), error = %e, "failed to remove workspace");
            let mut warnings = vec![CleanupWarning::new(workspace, &e)];
            // Report the individual leftovers so the caller knows what to delete by hand
            warnings.extend(
                leftover_files(workspace)
                    .await
                    .into_iter()
                    .map(|path| CleanupWarning::new(path, "left in workspace")),
            );
            warnings
        }
    }
}

async fn remove_dir(dir: &Path) -> Vec<CleanupWarning> {
    match fs::remove_dir(dir).await {
        Ok(()) => {
            debug!(workspace = %dir.display(), "removed empty workspace");
            Vec::new()
        }
        Err(e) => {
            warn!(workspace = %dir.display(), error = %e, "failed to remove workspace");
            vec![CleanupWarning::new(dir, e)]
        }
    }
}

async fn is_empty_dir(dir: &Path) -> std::io::Result<bool> {
    let mut entries = fs::read_dir(dir).await?;
    Ok(entries.next_entry().await?.is_none())
}

async fn leftover_files(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    if let Ok(mut entries) = fs::read_dir(dir).await {
        while let Ok(Some(entry)) = entries.next_entry().await {
            files.push(entry.path());
        }
    }
    files.sort();
    files
}
