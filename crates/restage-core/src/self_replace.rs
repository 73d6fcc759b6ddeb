//! Staged double-launch replacement of a running executable.
//!
//! A running image usually cannot be overwritten or deleted. The launcher
//! copies the new build next to itself under a reserved prefix and starts it.
//! That staged copy then deletes the original once the launcher has exited,
//! copies itself over the original path and starts it.

use std::io;
use std::path::{Path, PathBuf};

use log::{debug, error, info, warn};
use restage_platform::{ExecutableIdentity, ProcessHost};

use crate::config::RetryPolicy;
use crate::error::ReplaceError;

pub const DEFAULT_STAGING_PREFIX: &str = "_U_";

/// Which half of the replacement protocol this process runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessRole {
    Launcher,
    /// Running from a staged copy; `target_name` is the file it replaces.
    Staged { target_name: String },
}

impl ProcessRole {
    /// Classify an executable by its file name. An empty prefix never marks a
    /// staged copy, and neither does a name consisting of only the prefix.
    #[must_use]
    pub fn detect(file_name: &str, prefix: &str) -> Self {
        if prefix.is_empty() {
            return Self::Launcher;
        }
        match file_name.strip_prefix(prefix) {
            Some(target) if !target.is_empty() => Self::Staged {
                target_name: target.to_string(),
            },
            _ => Self::Launcher,
        }
    }

    #[must_use]
    pub fn of(identity: &ExecutableIdentity, prefix: &str) -> Self {
        Self::detect(identity.file_name(), prefix)
    }

    #[must_use]
    pub const fn is_staged(&self) -> bool {
        matches!(self, Self::Staged { .. })
    }
}

#[must_use]
pub fn staged_name(file_name: &str, prefix: &str) -> String {
    format!("{prefix}{file_name}")
}

/// Where the launcher writes its staged copy.
#[must_use]
pub fn staged_path(identity: &ExecutableIdentity, prefix: &str) -> PathBuf {
    identity.sibling(&staged_name(identity.file_name(), prefix))
}

/// Delete a staged copy left behind by a previous cycle.
///
/// Returns `true` when a file was removed.
///
/// # Errors
/// Returns an error if the leftover exists but cannot be deleted.
pub fn remove_leftover_stage(
    identity: &ExecutableIdentity,
    prefix: &str,
) -> Result<bool, ReplaceError> {
    if prefix.is_empty() {
        return Ok(false);
    }
    let leftover = staged_path(identity, prefix);
    match std::fs::remove_file(&leftover) {
        Ok(()) => {
            info!("Removed leftover staged copy {}", leftover.display());
            Ok(true)
        }
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(error) => Err(ReplaceError::filesystem(
            "failed to remove leftover staged copy",
            &leftover,
            error,
        )),
    }
}

/// Launcher half: stage `downloaded` next to the running executable and start
/// it. Returns the staged path without waiting for the new process.
///
/// # Errors
/// Returns an error if the staged copy cannot be written or started. The
/// running executable is left untouched in both cases.
pub fn stage_and_launch(
    downloaded: &Path,
    identity: &ExecutableIdentity,
    prefix: &str,
    host: &dyn ProcessHost,
) -> Result<PathBuf, ReplaceError> {
    let staged = staged_path(identity, prefix);
    info!("Staging {} as {}", downloaded.display(), staged.display());

    std::fs::copy(downloaded, &staged)
        .map_err(|error| ReplaceError::filesystem("failed to write staged copy", &staged, error))?;
    mark_executable(&staged)?;

    if let Err(error) = host.spawn_detached(&staged) {
        if let Err(cleanup) = std::fs::remove_file(&staged) {
            warn!(
                "Failed to remove unlaunched staged copy {}: {cleanup}",
                staged.display()
            );
        }
        return Err(ReplaceError::launch(&staged, error));
    }

    Ok(staged)
}

/// Staged half: replace the original executable with this process's own
/// image and start it. Returns the target path.
///
/// No copy is attempted unless the original was deleted first.
///
/// # Errors
/// Returns [`ReplaceError::NotStaged`] when `identity` is not a staged copy,
/// [`ReplaceError::TargetLocked`] when the original cannot be deleted within
/// `policy`, and [`ReplaceError::TargetMissing`] when the original is gone but
/// the copy failed.
pub async fn complete_staged_install(
    identity: &ExecutableIdentity,
    prefix: &str,
    policy: &RetryPolicy,
    host: &dyn ProcessHost,
) -> Result<PathBuf, ReplaceError> {
    let ProcessRole::Staged { target_name } = ProcessRole::of(identity, prefix) else {
        return Err(ReplaceError::NotStaged {
            name: identity.file_name().to_string(),
            prefix: prefix.to_string(),
        });
    };
    let target = identity.sibling(&target_name);
    info!(
        "Installing {} over {}",
        identity.full_path().display(),
        target.display()
    );

    tokio::time::sleep(policy.grace()).await;
    remove_with_retry(&target, policy).await?;

    if let Err(source) = std::fs::copy(identity.full_path(), &target) {
        let error = ReplaceError::TargetMissing {
            target: target.clone(),
            staged: identity.full_path().to_path_buf(),
            source,
        };
        error!("{error}");
        return Err(error);
    }
    mark_executable(&target)?;

    host.spawn_detached(&target)
        .map_err(|error| ReplaceError::launch(&target, error))?;

    Ok(target)
}

async fn remove_with_retry(target: &Path, policy: &RetryPolicy) -> Result<(), ReplaceError> {
    let attempts = policy.delete_attempts.max(1);
    let mut attempt = 1;
    loop {
        match std::fs::remove_file(target) {
            Ok(()) => {
                debug!("Removed {} on attempt {attempt}", target.display());
                return Ok(());
            }
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                debug!("{} already absent", target.display());
                return Ok(());
            }
            Err(error) if attempt >= attempts => {
                return Err(ReplaceError::TargetLocked {
                    path: target.to_path_buf(),
                    attempts,
                    source: error,
                });
            }
            Err(error) => {
                warn!(
                    "Attempt {attempt}/{attempts} to remove {} failed: {error}",
                    target.display()
                );
                attempt += 1;
                tokio::time::sleep(policy.delete_delay()).await;
            }
        }
    }
}

#[cfg(unix)]
fn mark_executable(path: &Path) -> Result<(), ReplaceError> {
    use std::os::unix::fs::PermissionsExt;

    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .map_err(|error| ReplaceError::filesystem("failed to mark file executable", path, error))
}

#[cfg(not(unix))]
#[allow(clippy::unnecessary_wraps)]
fn mark_executable(_path: &Path) -> Result<(), ReplaceError> {
    Ok(())
}
