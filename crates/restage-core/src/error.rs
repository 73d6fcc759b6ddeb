use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::session::UpdateState;

/// Transport failures while fetching the manifest or a binary.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("request to {url} failed with HTTP {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl FetchError {
    pub(crate) fn request(url: &str, source: reqwest::Error) -> Self {
        Self::Request {
            url: url.to_string(),
            source,
        }
    }

    pub(crate) fn write(path: &Path, source: std::io::Error) -> Self {
        Self::Write {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Failures of the staged copy/relaunch protocol.
#[derive(Debug, Error)]
pub enum ReplaceError {
    #[error("{context} ({}): {source}", path.display())]
    Filesystem {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not remove {} after {attempts} attempts: {source}", path.display())]
    TargetLocked {
        path: PathBuf,
        attempts: u32,
        #[source]
        source: std::io::Error,
    },
    #[error(
        "{} was removed but the new version could not be copied over it: {source}. \
         Copy {} to {} manually to restore the executable",
        target.display(),
        staged.display(),
        target.display()
    )]
    TargetMissing {
        target: PathBuf,
        staged: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to start {}: {source}", path.display())]
    Launch {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{name} is not a staged copy (expected prefix {prefix:?})")]
    NotStaged { name: String, prefix: String },
}

impl ReplaceError {
    pub(crate) fn filesystem(context: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::Filesystem {
            context,
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn launch(path: &Path, source: std::io::Error) -> Self {
        Self::Launch {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("failed to fetch update manifest: {0}")]
    Transport(#[source] FetchError),
    #[error("failed to download update: {0}")]
    Download(#[source] FetchError),
    #[error("failed to prepare download directory: {0}")]
    DownloadDir(#[source] std::io::Error),
    #[error(transparent)]
    Replace(#[from] ReplaceError),
    #[error("an update check is already in progress")]
    CheckInFlight,
    #[error("no update check has been started")]
    NoCheckPending,
    #[error("update check task ended without a result")]
    CheckAborted,
    #[error("no update is available to install")]
    NoUpdateAvailable,
    #[error("invalid update state transition {from} -> {to}")]
    InvalidTransition { from: UpdateState, to: UpdateState },
}
