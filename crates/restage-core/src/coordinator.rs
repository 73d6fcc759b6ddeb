use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, error, info, warn};
use restage_platform::{AppPaths, ExecutableIdentity, ProcessHost};
use restage_version::{Precision, Version};
use tokio::sync::oneshot;

use crate::config::{CheckMode, UpdaterConfig};
use crate::error::UpdateError;
use crate::fetch::{Fetcher, ProgressCallback};
use crate::manifest::Manifest;
use crate::notify::{Decision, Notifier};
use crate::self_replace::{self, ProcessRole};
use crate::session::{DownloadedUpdate, SessionSnapshot, UpdateSession, UpdateState};

const DOWNLOAD_DIR_PREFIX: &str = "restage-";

type CheckResult = Result<CheckOutcome, UpdateError>;

/// What [`UpdateCoordinator::startup`] decided for this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Startup {
    /// Launcher role: carry on with normal work.
    Continue,
    /// Staged role finished installing and asked the host to exit.
    HandedOff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoUpdateReason {
    /// This process is a staged copy and never checks.
    StagedCopy,
    /// The manifest has no entry for this executable.
    NotListed,
    /// The running version is invalid, so nothing can be newer.
    CurrentVersionInvalid,
    UpToDate { latest: Version },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    NoUpdate(NoUpdateReason),
    UpdateAvailable { current: Version, latest: Version },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    /// The check runs in the background; see [`UpdateCoordinator::wait_until_done`].
    Pending,
    Finished(CheckOutcome),
}

/// Result of a successful hand-off to the staged copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOutcome {
    pub version: Version,
    pub staged_path: PathBuf,
}

/// Drives update checks and the staged replacement for one executable.
///
/// Cloning is cheap and every clone shares the same session. At most one
/// background check runs at a time.
#[derive(Clone)]
pub struct UpdateCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    config: UpdaterConfig,
    fetcher: Arc<dyn Fetcher>,
    host: Arc<dyn ProcessHost>,
    session: Mutex<UpdateSession>,
    check_in_flight: AtomicBool,
    pending: Mutex<Option<oneshot::Receiver<CheckResult>>>,
    progress: Mutex<Option<ProgressCallback>>,
}

/// Clears the in-flight flag when the background task finishes, including
/// when it panics.
struct InFlightGuard(Arc<Inner>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.check_in_flight.store(false, Ordering::Release);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl UpdateCoordinator {
    #[must_use]
    pub fn new(
        config: UpdaterConfig,
        identity: ExecutableIdentity,
        current_version: Version,
        fetcher: Arc<dyn Fetcher>,
        host: Arc<dyn ProcessHost>,
    ) -> Self {
        let session = UpdateSession::new(identity, current_version, &config.staging_prefix);
        debug!(
            "Update coordinator for {} {} ({:?})",
            session.identity.file_name(),
            current_version.display(config.version_order, Precision::Four),
            session.role
        );

        Self {
            inner: Arc::new(Inner {
                config,
                fetcher,
                host,
                session: Mutex::new(session),
                check_in_flight: AtomicBool::new(false),
                pending: Mutex::new(None),
                progress: Mutex::new(None),
            }),
        }
    }

    /// Report download progress to `callback`.
    #[must_use]
    pub fn with_progress(self, callback: ProgressCallback) -> Self {
        *lock(&self.inner.progress) = Some(callback);
        self
    }

    #[must_use]
    pub fn config(&self) -> &UpdaterConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn role(&self) -> ProcessRole {
        lock(&self.inner.session).role.clone()
    }

    #[must_use]
    pub fn state(&self) -> UpdateState {
        lock(&self.inner.session).state
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        lock(&self.inner.session).snapshot()
    }

    /// Run the role-specific startup work. Call once, before any check.
    ///
    /// A launcher removes a staged copy left by a previous cycle. A staged
    /// copy installs itself over the original and asks the host to exit with
    /// 0 on success or 1 on failure.
    ///
    /// # Errors
    /// Returns the staged install failure, after the host's exit was
    /// requested. Launcher cleanup failures are only logged.
    pub async fn startup(&self) -> Result<Startup, UpdateError> {
        let (role, identity) = {
            let session = lock(&self.inner.session);
            (session.role.clone(), session.identity.clone())
        };
        let config = &self.inner.config;

        match role {
            ProcessRole::Launcher => {
                if let Err(error) =
                    self_replace::remove_leftover_stage(&identity, &config.staging_prefix)
                {
                    warn!("{error}");
                }
                self.cleanup_stale_downloads();
                Ok(Startup::Continue)
            }
            ProcessRole::Staged { target_name } => {
                info!("Running as staged copy of {target_name}");
                lock(&self.inner.session).begin_staged_install()?;
                match self_replace::complete_staged_install(
                    &identity,
                    &config.staging_prefix,
                    &config.retry,
                    self.inner.host.as_ref(),
                )
                .await
                {
                    Ok(target) => {
                        info!("Handed off to {}", target.display());
                        if let Err(error) =
                            lock(&self.inner.session).transition(UpdateState::Relaunching)
                        {
                            warn!("{error}");
                        }
                        self.inner.host.exit(0);
                        Ok(Startup::HandedOff)
                    }
                    Err(replace_error) => {
                        error!("Staged install failed: {replace_error}");
                        eprintln!("restage: update could not be installed: {replace_error}");
                        lock(&self.inner.session).fail(UpdateState::InstallFailed, &replace_error);
                        self.inner.host.exit(1);
                        Err(replace_error.into())
                    }
                }
            }
        }
    }

    /// Start a background check against the manifest.
    ///
    /// With [`CheckMode::Blocking`] this waits for the outcome. With
    /// [`CheckMode::NonBlocking`] it returns [`CheckStatus::Pending`] and the
    /// outcome is collected with [`Self::wait_until_done`]. When an update is
    /// found, `notifier` runs on the background task before the outcome is
    /// published.
    ///
    /// # Errors
    /// Returns [`UpdateError::CheckInFlight`] while another check is running
    /// and [`UpdateError::InvalidTransition`] when the session is mid-update.
    /// In blocking mode the check's own errors are returned as well.
    pub async fn check_for_updates(
        &self,
        notifier: Notifier,
        mode: CheckMode,
    ) -> Result<CheckStatus, UpdateError> {
        if self
            .inner
            .check_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(UpdateError::CheckInFlight);
        }
        let guard = InFlightGuard(Arc::clone(&self.inner));

        lock(&self.inner.session).transition(UpdateState::Checking)?;

        let (sender, receiver) = oneshot::channel();
        *lock(&self.inner.pending) = Some(receiver);

        let this = self.clone();
        tokio::spawn(async move {
            let result = this.run_check(&notifier).await;
            drop(guard);
            if sender.send(result).is_err() {
                debug!("Update check result dropped without a receiver");
            }
        });

        match mode {
            CheckMode::Blocking => self.wait_until_done().await.map(CheckStatus::Finished),
            CheckMode::NonBlocking => Ok(CheckStatus::Pending),
        }
    }

    /// Wait for the outstanding background check.
    ///
    /// # Errors
    /// Returns [`UpdateError::NoCheckPending`] when no check was started (or
    /// its result was already taken), and the check's own error otherwise.
    pub async fn wait_until_done(&self) -> Result<CheckOutcome, UpdateError> {
        let receiver = lock(&self.inner.pending)
            .take()
            .ok_or(UpdateError::NoCheckPending)?;
        receiver.await.map_err(|_| UpdateError::CheckAborted)?
    }

    /// Download the available update, stage it and hand off to it. On
    /// success the host is asked to exit with code 0.
    ///
    /// # Errors
    /// Returns [`UpdateError::NoUpdateAvailable`] when no check found an
    /// update, and download or staging failures. The running executable is
    /// never modified by a failed install.
    pub async fn install_update(&self) -> Result<InstallOutcome, UpdateError> {
        let (name, latest) = {
            let mut session = lock(&self.inner.session);
            match session.state {
                UpdateState::UpdateAvailable => {}
                UpdateState::Idle | UpdateState::Checking | UpdateState::NoUpdate => {
                    return Err(UpdateError::NoUpdateAvailable);
                }
                other => {
                    return Err(UpdateError::InvalidTransition {
                        from: other,
                        to: UpdateState::Downloading,
                    });
                }
            }
            let latest = session
                .latest_version
                .ok_or(UpdateError::NoUpdateAvailable)?;
            session.transition(UpdateState::Downloading)?;
            (session.identity.file_name().to_string(), latest)
        };

        let download = match self.download(&name).await {
            Ok(download) => download,
            Err(download_error) => {
                error!("Update download failed: {download_error}");
                lock(&self.inner.session).fail(UpdateState::DownloadFailed, &download_error);
                return Err(download_error);
            }
        };

        let downloaded = download.path().to_path_buf();
        let mut session = lock(&self.inner.session);
        session.download = Some(download);
        session.transition(UpdateState::Downloaded)?;
        session.transition(UpdateState::Installing)?;

        let staged = match self_replace::stage_and_launch(
            &downloaded,
            &session.identity,
            &self.inner.config.staging_prefix,
            self.inner.host.as_ref(),
        ) {
            Ok(staged) => staged,
            Err(replace_error) => {
                error!("Update install failed: {replace_error}");
                session.fail(UpdateState::InstallFailed, &replace_error);
                return Err(replace_error.into());
            }
        };

        session.staged_path = Some(staged.clone());
        session.download = None;
        session.transition(UpdateState::Relaunching)?;
        drop(session);

        info!(
            "Update {} staged at {}, exiting",
            latest.display(self.inner.config.version_order, Precision::Four),
            staged.display()
        );
        self.inner.host.exit(0);

        Ok(InstallOutcome {
            version: latest,
            staged_path: staged,
        })
    }

    /// Reject the available update and discard any downloaded file.
    ///
    /// # Errors
    /// Returns [`UpdateError::NoUpdateAvailable`] when there is nothing to
    /// decline.
    pub fn decline_update(&self) -> Result<(), UpdateError> {
        let mut session = lock(&self.inner.session);
        match session.state {
            UpdateState::UpdateAvailable | UpdateState::Downloaded => {
                session.download = None;
                session.transition(UpdateState::Idle)?;
                info!("Update declined");
                Ok(())
            }
            _ => Err(UpdateError::NoUpdateAvailable),
        }
    }

    async fn run_check(&self, notifier: &Notifier) -> CheckResult {
        let (is_staged, name, current) = {
            let session = lock(&self.inner.session);
            (
                session.role.is_staged(),
                session.identity.file_name().to_string(),
                session.current_version,
            )
        };

        if is_staged {
            lock(&self.inner.session).transition(UpdateState::NoUpdate)?;
            return Ok(CheckOutcome::NoUpdate(NoUpdateReason::StagedCopy));
        }

        let config = &self.inner.config;
        let url = config.manifest_url();
        info!("Checking for updates at {url}");

        let bytes = match self.inner.fetcher.fetch(&url, None).await {
            Ok(bytes) => bytes,
            Err(fetch_error) => {
                warn!("Update check failed: {fetch_error}");
                lock(&self.inner.session).fail(UpdateState::NoUpdate, &fetch_error);
                return Err(UpdateError::Transport(fetch_error));
            }
        };

        let manifest = Manifest::parse(&bytes, config.version_order);
        debug!("Manifest lists {} executables", manifest.len());
        let latest = manifest.get(&name);
        let outcome = evaluate(latest, current, config);

        {
            let mut session = lock(&self.inner.session);
            session.latest_version = latest;
            session.last_error = None;
            session.transition(match outcome {
                CheckOutcome::NoUpdate(_) => UpdateState::NoUpdate,
                CheckOutcome::UpdateAvailable { .. } => UpdateState::UpdateAvailable,
            })?;
        }

        if let CheckOutcome::UpdateAvailable { current, latest } = outcome {
            info!(
                "Update available: {} -> {}",
                current.display(config.version_order, Precision::Four),
                latest.display(config.version_order, Precision::Four)
            );
            match notifier.ask(current, latest, config.version_order).await {
                Decision::Install => {
                    if let Err(install_error) = self.install_update().await {
                        error!("Update install failed: {install_error}");
                    }
                }
                Decision::Decline => {
                    if let Err(decline_error) = self.decline_update() {
                        warn!("{decline_error}");
                    }
                }
                Decision::Deferred => {}
            }
        } else {
            info!("No update: {outcome:?}");
        }

        Ok(outcome)
    }

    async fn download(&self, name: &str) -> Result<DownloadedUpdate, UpdateError> {
        let root = self.download_root()?;
        std::fs::create_dir_all(&root).map_err(UpdateError::DownloadDir)?;
        let dir = tempfile::Builder::new()
            .prefix(DOWNLOAD_DIR_PREFIX)
            .tempdir_in(&root)
            .map_err(UpdateError::DownloadDir)?;

        let dest = dir.path().join(name);
        let url = self.inner.config.binary_url(name);
        let progress = lock(&self.inner.progress).clone();

        info!("Downloading update from {url}");
        self.inner
            .fetcher
            .fetch_to_file(&url, &dest, progress)
            .await
            .map_err(UpdateError::Download)?;

        Ok(DownloadedUpdate::new(dir, dest))
    }

    fn download_root(&self) -> Result<PathBuf, UpdateError> {
        if let Some(dir) = &self.inner.config.download_dir {
            return Ok(dir.clone());
        }
        AppPaths::new()
            .map(|paths| paths.download_dir())
            .map_err(|error| UpdateError::DownloadDir(std::io::Error::other(error)))
    }

    // Download directories outlive the process when it exits mid-cycle.
    fn cleanup_stale_downloads(&self) {
        let Ok(root) = self.download_root() else {
            return;
        };
        let Ok(entries) = std::fs::read_dir(&root) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir()
                && entry
                    .file_name()
                    .to_string_lossy()
                    .starts_with(DOWNLOAD_DIR_PREFIX)
            {
                debug!("Cleaning up stale download dir: {}", path.display());
                if let Err(error) = std::fs::remove_dir_all(&path) {
                    warn!("Failed to remove {}: {error}", path.display());
                }
            }
        }
    }
}

fn evaluate(latest: Option<Version>, current: Version, config: &UpdaterConfig) -> CheckOutcome {
    let Some(latest) = latest else {
        return CheckOutcome::NoUpdate(NoUpdateReason::NotListed);
    };
    if !current.is_valid() {
        return CheckOutcome::NoUpdate(NoUpdateReason::CurrentVersionInvalid);
    }
    if config.version_order.is_newer(&latest, &current) {
        CheckOutcome::UpdateAvailable { current, latest }
    } else {
        CheckOutcome::NoUpdate(NoUpdateReason::UpToDate { latest })
    }
}
