use std::fmt;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use restage_platform::ExecutableIdentity;
use restage_version::Version;
use tempfile::TempDir;

use crate::error::UpdateError;
use crate::self_replace::ProcessRole;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum UpdateState {
    #[default]
    Idle,
    Checking,
    NoUpdate,
    UpdateAvailable,
    Downloading,
    DownloadFailed,
    Downloaded,
    Installing,
    InstallFailed,
    /// The staged copy is running and this process is about to exit.
    Relaunching,
}

impl UpdateState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Checking => "checking",
            Self::NoUpdate => "no_update",
            Self::UpdateAvailable => "update_available",
            Self::Downloading => "downloading",
            Self::DownloadFailed => "download_failed",
            Self::Downloaded => "downloaded",
            Self::Installing => "installing",
            Self::InstallFailed => "install_failed",
            Self::Relaunching => "relaunching",
        }
    }

    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (
                Self::Idle | Self::NoUpdate | Self::DownloadFailed | Self::InstallFailed,
                Self::Checking
            ) | (Self::Checking, Self::NoUpdate | Self::UpdateAvailable)
                | (Self::UpdateAvailable, Self::Downloading | Self::Idle)
                | (Self::Downloading, Self::Downloaded | Self::DownloadFailed)
                | (Self::Downloaded, Self::Installing | Self::Idle)
                | (Self::Installing, Self::InstallFailed | Self::Relaunching)
        )
    }

    /// A cycle ended here and a new check may start.
    #[must_use]
    pub const fn is_cycle_end(self) -> bool {
        matches!(
            self,
            Self::NoUpdate | Self::DownloadFailed | Self::InstallFailed
        )
    }
}

impl fmt::Display for UpdateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A downloaded binary. The containing temporary directory is removed when
/// this value is dropped.
#[derive(Debug)]
pub(crate) struct DownloadedUpdate {
    _dir: TempDir,
    path: PathBuf,
}

impl DownloadedUpdate {
    pub(crate) fn new(dir: TempDir, path: PathBuf) -> Self {
        Self { _dir: dir, path }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }
}

#[derive(Debug)]
pub(crate) struct UpdateSession {
    pub(crate) state: UpdateState,
    pub(crate) identity: ExecutableIdentity,
    pub(crate) current_version: Version,
    pub(crate) role: ProcessRole,
    pub(crate) latest_version: Option<Version>,
    pub(crate) download: Option<DownloadedUpdate>,
    pub(crate) staged_path: Option<PathBuf>,
    pub(crate) last_error: Option<String>,
}

impl UpdateSession {
    pub(crate) fn new(
        identity: ExecutableIdentity,
        current_version: Version,
        prefix: &str,
    ) -> Self {
        let role = ProcessRole::of(&identity, prefix);
        Self {
            state: UpdateState::Idle,
            identity,
            current_version,
            role,
            latest_version: None,
            download: None,
            staged_path: None,
            last_error: None,
        }
    }

    pub(crate) fn transition(&mut self, next: UpdateState) -> Result<(), UpdateError> {
        if !self.state.can_transition_to(next) {
            return Err(UpdateError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        debug!("Update state {} -> {next}", self.state);
        self.state = next;
        Ok(())
    }

    /// A staged copy has no check cycle; its session starts by installing.
    pub(crate) fn begin_staged_install(&mut self) -> Result<(), UpdateError> {
        if !self.role.is_staged() || self.state != UpdateState::Idle {
            return Err(UpdateError::InvalidTransition {
                from: self.state,
                to: UpdateState::Installing,
            });
        }
        debug!("Update state {} -> {}", self.state, UpdateState::Installing);
        self.state = UpdateState::Installing;
        Ok(())
    }

    /// Move to a failure state, keeping `error` for later inspection.
    pub(crate) fn fail(&mut self, next: UpdateState, error: &impl fmt::Display) {
        self.last_error = Some(error.to_string());
        self.download = None;
        if let Err(transition) = self.transition(next) {
            warn!("{transition}");
        }
    }

    pub(crate) fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            executable_name: self.identity.file_name().to_string(),
            executable_dir: self.identity.dir().to_path_buf(),
            executable_path: self.identity.full_path().to_path_buf(),
            current_version: self.current_version,
            latest_version: self.latest_version,
            is_staged_copy: self.role.is_staged(),
            downloaded_file: self.download.as_ref().map(|d| d.path().to_path_buf()),
            staged_path: self.staged_path.clone(),
            last_error: self.last_error.clone(),
        }
    }
}

/// Point-in-time copy of the coordinator's session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub state: UpdateState,
    pub executable_name: String,
    pub executable_dir: PathBuf,
    pub executable_path: PathBuf,
    pub current_version: Version,
    /// Version listed for this executable by the last successful check.
    pub latest_version: Option<Version>,
    pub is_staged_copy: bool,
    pub downloaded_file: Option<PathBuf>,
    pub staged_path: Option<PathBuf>,
    pub last_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [UpdateState; 10] = [
        UpdateState::Idle,
        UpdateState::Checking,
        UpdateState::NoUpdate,
        UpdateState::UpdateAvailable,
        UpdateState::Downloading,
        UpdateState::DownloadFailed,
        UpdateState::Downloaded,
        UpdateState::Installing,
        UpdateState::InstallFailed,
        UpdateState::Relaunching,
    ];

    fn session(name: &str) -> UpdateSession {
        let identity =
            ExecutableIdentity::from_path(format!("/opt/app/{name}")).expect("identity");
        UpdateSession::new(identity, Version::new(1, 0, 0, 0), "_U_")
    }

    #[test]
    fn relaunching_is_terminal() {
        for next in ALL {
            assert!(!UpdateState::Relaunching.can_transition_to(next));
        }
    }

    #[test]
    fn new_check_may_start_after_any_cycle_end() {
        for state in ALL.into_iter().filter(|state| state.is_cycle_end()) {
            assert!(state.can_transition_to(UpdateState::Checking), "{state}");
        }
        assert!(!UpdateState::Checking.can_transition_to(UpdateState::Checking));
        assert!(!UpdateState::UpdateAvailable.can_transition_to(UpdateState::Checking));
    }

    #[test]
    fn happy_path_is_accepted() {
        let mut session = session("tool");
        for next in [
            UpdateState::Checking,
            UpdateState::UpdateAvailable,
            UpdateState::Downloading,
            UpdateState::Downloaded,
            UpdateState::Installing,
            UpdateState::Relaunching,
        ] {
            session.transition(next).expect("transition should be legal");
        }
        assert_eq!(session.state, UpdateState::Relaunching);
    }

    #[test]
    fn illegal_transition_leaves_state_unchanged() {
        let mut session = session("tool");
        let error = session
            .transition(UpdateState::Installing)
            .expect_err("idle cannot install");
        assert!(matches!(
            error,
            UpdateError::InvalidTransition {
                from: UpdateState::Idle,
                to: UpdateState::Installing
            }
        ));
        assert_eq!(session.state, UpdateState::Idle);
    }

    #[test]
    fn only_an_idle_staged_copy_begins_installing() {
        let mut launcher = session("tool");
        assert!(launcher.begin_staged_install().is_err());
        assert_eq!(launcher.state, UpdateState::Idle);

        let mut staged = session("_U_tool");
        staged
            .begin_staged_install()
            .expect("staged copy should start installing");
        assert_eq!(staged.state, UpdateState::Installing);
        assert!(staged.begin_staged_install().is_err());

        staged.fail(UpdateState::InstallFailed, &"target locked");
        assert_eq!(staged.state, UpdateState::InstallFailed);
        assert_eq!(staged.last_error.as_deref(), Some("target locked"));
    }

    #[test]
    fn snapshot_reports_staged_role() {
        let snapshot = session("_U_tool").snapshot();
        assert!(snapshot.is_staged_copy);
        assert_eq!(snapshot.executable_name, "_U_tool");
        assert_eq!(snapshot.executable_dir, PathBuf::from("/opt/app"));
        assert_eq!(snapshot.state, UpdateState::Idle);
    }
}
