use std::path::{Path, PathBuf};

use log::info;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecutableError {
    #[error("failed to resolve current executable: {0}")]
    Resolve(#[source] std::io::Error),
    #[error("executable path has no usable file name: {}", path.display())]
    NoFileName { path: PathBuf },
}

/// Location of an executable image on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutableIdentity {
    full_path: PathBuf,
    dir: PathBuf,
    file_name: String,
}

impl ExecutableIdentity {
    /// Identity of the running process's own executable.
    ///
    /// # Errors
    /// Returns an error if the OS cannot report the executable path or the
    /// path has no UTF-8 file name.
    pub fn current() -> Result<Self, ExecutableError> {
        let exe = std::env::current_exe().map_err(ExecutableError::Resolve)?;
        Self::from_path(strip_deleted_suffix(exe))
    }

    /// # Errors
    /// Returns an error if `path` has no UTF-8 file name.
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self, ExecutableError> {
        let full_path = path.into();
        let Some(file_name) = full_path
            .file_name()
            .and_then(|name| name.to_str())
            .filter(|name| !name.is_empty())
            .map(str::to_string)
        else {
            return Err(ExecutableError::NoFileName { path: full_path });
        };
        let dir = full_path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);

        Ok(Self {
            full_path,
            dir,
            file_name,
        })
    }

    #[must_use]
    pub fn full_path(&self) -> &Path {
        &self.full_path
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Path of `name` in the same directory as this executable.
    #[must_use]
    pub fn sibling(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
}

// On Linux, once the image file has been unlinked /proc/self/exe reports the
// old inode with " (deleted)" appended.
fn strip_deleted_suffix(exe: PathBuf) -> PathBuf {
    if !cfg!(target_os = "linux") {
        return exe;
    }
    let path_str = exe.to_string_lossy();
    if let Some(fixed) = path_str.strip_suffix(" (deleted)") {
        let fixed = PathBuf::from(fixed);
        info!("Adjusted exe path from deleted inode: {}", fixed.display());
        fixed
    } else {
        exe
    }
}
