//! Staging root management and two-phase promotion into the canonical
//! build directory.

use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, warn};

use labbuild_shared::{LabBuildError, Result};

/// Remove any stale staging root and create a fresh, empty one.
pub fn prepare_staging(staging: &Path) -> Result<()> {
    if staging.exists() {
        std::fs::remove_dir_all(staging).map_err(|e| LabBuildError::io(staging, e))?;
        debug!(path = %staging.display(), "removed stale staging root");
    }
    std::fs::create_dir_all(staging).map_err(|e| LabBuildError::io(staging, e))?;
    Ok(())
}

/// Recursively copy the contents of `from` into `to`, creating `to`.
///
/// Existing files in `to` with the same relative path are overwritten.
pub fn copy_dir_all(from: &Path, to: &Path) -> Result<u64> {
    std::fs::create_dir_all(to).map_err(|e| LabBuildError::io(to, e))?;

    let entries = std::fs::read_dir(from).map_err(|e| LabBuildError::io(from, e))?;
    let mut copied = 0;
    for entry in entries {
        let entry = entry.map_err(|e| LabBuildError::io(from, e))?;
        let src = entry.path();
        let dst = to.join(entry.file_name());
        let file_type = entry.file_type().map_err(|e| LabBuildError::io(&src, e))?;

        if file_type.is_dir() {
            copied += copy_dir_all(&src, &dst)?;
        } else {
            std::fs::copy(&src, &dst).map_err(|e| LabBuildError::io(&src, e))?;
            copied += 1;
        }
    }
    Ok(copied)
}

/// Copy one file, creating the destination's parent directories.
pub fn copy_file(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        std::fs::create_dir_all(parent).map_err(|e| LabBuildError::io(parent, e))?;
    }
    std::fs::copy(from, to).map_err(|e| LabBuildError::io(from, e))?;
    Ok(())
}

/// Swap a finished staging root into the canonical location.
///
/// 1. Rename the current canonical directory (if any) to a unique backup.
/// 2. Rename staging to canonical; on failure restore the backup.
/// 3. Remove the backup.
///
/// After a successful return `staging` no longer exists.
#[instrument(skip_all, fields(staging = %staging.display(), canonical = %canonical.display()))]
pub fn promote(staging: &Path, canonical: &Path) -> Result<()> {
    if !staging.is_dir() {
        return Err(LabBuildError::io(
            staging,
            std::io::Error::new(std::io::ErrorKind::NotFound, "staging root missing"),
        ));
    }

    let backup = if canonical.exists() {
        let backup = backup_path(canonical);
        std::fs::rename(canonical, &backup).map_err(|e| LabBuildError::io(canonical, e))?;
        debug!(backup = %backup.display(), "moved previous build aside");
        Some(backup)
    } else {
        None
    };

    if let Err(e) = std::fs::rename(staging, canonical) {
        if let Some(backup) = &backup {
            if let Err(restore) = std::fs::rename(backup, canonical) {
                warn!(
                    backup = %backup.display(),
                    error = %restore,
                    "failed to restore previous build"
                );
            }
        }
        return Err(LabBuildError::io(staging, e));
    }

    if let Some(backup) = backup {
        // The new build is already in place; a leftover backup is only litter.
        if let Err(e) = std::fs::remove_dir_all(&backup) {
            warn!(backup = %backup.display(), error = %e, "failed to remove previous build");
        }
    }

    info!("build promoted");
    Ok(())
}

fn backup_path(canonical: &Path) -> PathBuf {
    let name = canonical
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "build".to_string());
    canonical.with_file_name(format!(".{name}-old-{}", uuid::Uuid::now_v7()))
}
