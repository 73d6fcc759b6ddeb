use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use restage_core::{
    CheckMode, CheckOutcome, CheckStatus, ExecutableIdentity, FetchError, Fetcher,
    NoUpdateReason, Notifier, ProcessHost, ProcessRole, ProgressCallback, ReplaceError,
    RetryPolicy, Startup, UpdateCoordinator, UpdateError, UpdateState, UpdaterConfig, Version,
};
use tempfile::TempDir;
use tokio::sync::Notify;

const BINARY: &[u8] = b"tool v1.2.4.0";

#[derive(Default)]
struct FakeFetcher {
    manifest: Option<Vec<u8>>,
    binary: Option<Vec<u8>>,
    gate: Option<Arc<Notify>>,
    manifest_calls: AtomicUsize,
    download_calls: AtomicUsize,
}

impl FakeFetcher {
    fn serving(manifest: &str) -> Self {
        Self {
            manifest: Some(manifest.as_bytes().to_vec()),
            binary: Some(BINARY.to_vec()),
            ..Self::default()
        }
    }

    fn not_found(url: &str) -> FetchError {
        FetchError::Status {
            url: url.to_string(),
            status: reqwest::StatusCode::NOT_FOUND,
        }
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch(
        &self,
        url: &str,
        _progress: Option<ProgressCallback>,
    ) -> Result<Vec<u8>, FetchError> {
        self.manifest_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.manifest.clone().ok_or_else(|| Self::not_found(url))
    }

    async fn fetch_to_file(
        &self,
        url: &str,
        dest: &Path,
        progress: Option<ProgressCallback>,
    ) -> Result<(), FetchError> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        let Some(binary) = &self.binary else {
            return Err(Self::not_found(url));
        };
        std::fs::write(dest, binary).map_err(|source| FetchError::Write {
            path: dest.to_path_buf(),
            source,
        })?;
        if let Some(progress) = progress {
            let len = binary.len() as u64;
            progress(len, len);
        }
        Ok(())
    }
}

#[derive(Default)]
struct RecordingHost {
    spawned: Mutex<Vec<PathBuf>>,
    exits: Mutex<Vec<i32>>,
}

impl RecordingHost {
    fn spawned(&self) -> Vec<PathBuf> {
        self.spawned
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn exits(&self) -> Vec<i32> {
        self.exits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ProcessHost for RecordingHost {
    fn spawn_detached(&self, program: &Path) -> io::Result<()> {
        self.spawned
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(program.to_path_buf());
        Ok(())
    }

    fn exit(&self, code: i32) {
        self.exits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(code);
    }
}

struct Fixture {
    temp: TempDir,
    fetcher: Arc<FakeFetcher>,
    host: Arc<RecordingHost>,
    coordinator: UpdateCoordinator,
}

impl Fixture {
    fn new(exe_name: &str, current: Version, fetcher: FakeFetcher) -> Self {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let config = UpdaterConfig {
            base_url: "http://updates.test/app".to_string(),
            retry: RetryPolicy::immediate(3),
            download_dir: Some(temp.path().join("downloads")),
            ..UpdaterConfig::default()
        };
        let identity = ExecutableIdentity::from_path(temp.path().join(exe_name))
            .expect("identity should resolve");
        let fetcher = Arc::new(fetcher);
        let host = Arc::new(RecordingHost::default());
        let coordinator = UpdateCoordinator::new(
            config,
            identity,
            current,
            Arc::clone(&fetcher) as Arc<dyn Fetcher>,
            Arc::clone(&host) as Arc<dyn ProcessHost>,
        );
        Self {
            temp,
            fetcher,
            host,
            coordinator,
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.temp.path().join(name)
    }

    fn download_dirs(&self) -> usize {
        std::fs::read_dir(self.path("downloads"))
            .map(|entries| entries.flatten().count())
            .unwrap_or(0)
    }
}

fn counting_notifier() -> (Notifier, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let notifier = Notifier::Custom(Arc::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    }));
    (notifier, calls)
}

fn current() -> Version {
    Version::new(1, 2, 3, 4)
}

#[tokio::test]
async fn same_version_reaches_no_update() {
    let fixture = Fixture::new("tool", current(), FakeFetcher::serving("tool\t1.2.3.4\n"));
    let (notifier, calls) = counting_notifier();

    let status = fixture
        .coordinator
        .check_for_updates(notifier, CheckMode::Blocking)
        .await
        .expect("check should succeed");

    assert_eq!(
        status,
        CheckStatus::Finished(CheckOutcome::NoUpdate(NoUpdateReason::UpToDate {
            latest: current()
        }))
    );
    assert_eq!(fixture.coordinator.state(), UpdateState::NoUpdate);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn newer_version_notifies_exactly_once() {
    let fixture = Fixture::new(
        "tool",
        current(),
        FakeFetcher::serving("other\t9.0.0.0\ntool\t1.2.4.0\n"),
    );
    let (notifier, calls) = counting_notifier();

    let status = fixture
        .coordinator
        .check_for_updates(notifier, CheckMode::NonBlocking)
        .await
        .expect("check should start");
    assert_eq!(status, CheckStatus::Pending);

    let outcome = fixture
        .coordinator
        .wait_until_done()
        .await
        .expect("check should succeed");

    assert_eq!(
        outcome,
        CheckOutcome::UpdateAvailable {
            current: current(),
            latest: Version::new(1, 2, 4, 0)
        }
    );
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(fixture.coordinator.state(), UpdateState::UpdateAvailable);
    assert_eq!(
        fixture.coordinator.snapshot().latest_version,
        Some(Version::new(1, 2, 4, 0))
    );
}

#[tokio::test]
async fn unlisted_executable_is_not_an_error() {
    let fixture = Fixture::new("tool", current(), FakeFetcher::serving("other\t2.0.0\n"));
    let (notifier, _) = counting_notifier();

    let status = fixture
        .coordinator
        .check_for_updates(notifier, CheckMode::Blocking)
        .await
        .expect("check should succeed");

    assert_eq!(
        status,
        CheckStatus::Finished(CheckOutcome::NoUpdate(NoUpdateReason::NotListed))
    );
}

#[tokio::test]
async fn manifest_failure_reports_transport_error() {
    let fixture = Fixture::new("tool", current(), FakeFetcher::default());
    let (notifier, calls) = counting_notifier();

    let error = fixture
        .coordinator
        .check_for_updates(notifier, CheckMode::Blocking)
        .await
        .expect_err("missing manifest should fail");

    assert!(matches!(error, UpdateError::Transport(FetchError::Status { .. })));
    assert_eq!(fixture.coordinator.state(), UpdateState::NoUpdate);
    assert!(fixture.coordinator.snapshot().last_error.is_some());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn second_check_is_refused_while_one_is_in_flight() {
    let gate = Arc::new(Notify::new());
    let fetcher = FakeFetcher {
        gate: Some(Arc::clone(&gate)),
        ..FakeFetcher::serving("tool\t1.2.3.4\n")
    };
    let fixture = Fixture::new("tool", current(), fetcher);

    fixture
        .coordinator
        .check_for_updates(Notifier::Custom(Arc::new(|| {})), CheckMode::NonBlocking)
        .await
        .expect("first check should start");

    let error = fixture
        .coordinator
        .check_for_updates(Notifier::Custom(Arc::new(|| {})), CheckMode::NonBlocking)
        .await
        .expect_err("second check should be refused");
    assert!(matches!(error, UpdateError::CheckInFlight));

    gate.notify_one();
    fixture
        .coordinator
        .wait_until_done()
        .await
        .expect("first check should finish");
    assert_eq!(fixture.fetcher.manifest_calls.load(Ordering::SeqCst), 1);

    gate.notify_one();
    fixture
        .coordinator
        .check_for_updates(Notifier::Custom(Arc::new(|| {})), CheckMode::Blocking)
        .await
        .expect("a new check may start after the first finished");
}

#[tokio::test]
async fn startup_removes_leftover_stage_before_checking() {
    let fixture = Fixture::new("tool", current(), FakeFetcher::serving("tool\t1.2.3.4\n"));
    std::fs::write(fixture.path("_U_tool"), b"stale").expect("leftover should be written");
    std::fs::create_dir_all(fixture.path("downloads/restage-old"))
        .expect("stale download dir should be created");

    let startup = fixture
        .coordinator
        .startup()
        .await
        .expect("startup should succeed");

    assert_eq!(startup, Startup::Continue);
    assert!(!fixture.path("_U_tool").exists());
    assert_eq!(fixture.download_dirs(), 0);

    fixture
        .coordinator
        .check_for_updates(Notifier::Custom(Arc::new(|| {})), CheckMode::Blocking)
        .await
        .expect("check should still run");
    assert_eq!(fixture.fetcher.manifest_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn install_stages_new_binary_and_exits() {
    let fixture = Fixture::new("tool", current(), FakeFetcher::serving("tool\t1.2.4.0\n"));
    std::fs::write(fixture.path("tool"), b"tool v1.2.3.4").expect("target should be written");

    let progress = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&progress);
    let coordinator = fixture.coordinator.clone().with_progress(Arc::new(move |done, total| {
        sink.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((done, total));
    }));

    coordinator
        .check_for_updates(Notifier::Custom(Arc::new(|| {})), CheckMode::Blocking)
        .await
        .expect("check should succeed");
    let outcome = coordinator
        .install_update()
        .await
        .expect("install should succeed");

    let staged = fixture.path("_U_tool");
    assert_eq!(outcome.staged_path, staged);
    assert_eq!(outcome.version, Version::new(1, 2, 4, 0));
    assert_eq!(std::fs::read(&staged).expect("staged copy should exist"), BINARY);
    assert_eq!(
        std::fs::read(fixture.path("tool")).expect("target should be untouched"),
        b"tool v1.2.3.4"
    );
    assert_eq!(fixture.host.spawned(), vec![staged.clone()]);
    assert_eq!(fixture.host.exits(), vec![0]);
    assert_eq!(coordinator.state(), UpdateState::Relaunching);
    assert_eq!(coordinator.snapshot().staged_path, Some(staged));
    assert_eq!(fixture.download_dirs(), 0);

    let len = BINARY.len() as u64;
    assert_eq!(
        *progress.lock().unwrap_or_else(PoisonError::into_inner),
        vec![(len, len)]
    );
}

#[tokio::test]
async fn download_failure_keeps_running_executable() {
    let fetcher = FakeFetcher {
        binary: None,
        ..FakeFetcher::serving("tool\t1.2.4.0\n")
    };
    let fixture = Fixture::new("tool", current(), fetcher);

    fixture
        .coordinator
        .check_for_updates(Notifier::Custom(Arc::new(|| {})), CheckMode::Blocking)
        .await
        .expect("check should succeed");
    let error = fixture
        .coordinator
        .install_update()
        .await
        .expect_err("download should fail");

    assert!(matches!(error, UpdateError::Download(_)));
    assert_eq!(fixture.coordinator.state(), UpdateState::DownloadFailed);
    assert!(fixture.host.spawned().is_empty());
    assert!(fixture.host.exits().is_empty());
    assert_eq!(fixture.download_dirs(), 0);
    assert_eq!(fixture.fetcher.download_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn decline_returns_to_idle() {
    let fixture = Fixture::new("tool", current(), FakeFetcher::serving("tool\t1.2.4.0\n"));

    fixture
        .coordinator
        .check_for_updates(Notifier::Custom(Arc::new(|| {})), CheckMode::Blocking)
        .await
        .expect("check should succeed");
    fixture
        .coordinator
        .decline_update()
        .expect("decline should succeed");

    let snapshot = fixture.coordinator.snapshot();
    assert_eq!(snapshot.state, UpdateState::Idle);
    assert!(snapshot.downloaded_file.is_none());
    assert!(matches!(
        fixture.coordinator.install_update().await,
        Err(UpdateError::NoUpdateAvailable)
    ));
    assert_eq!(fixture.fetcher.download_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn waiting_without_a_check_is_an_error() {
    let fixture = Fixture::new("tool", current(), FakeFetcher::default());

    assert!(matches!(
        fixture.coordinator.wait_until_done().await,
        Err(UpdateError::NoCheckPending)
    ));
    assert!(matches!(
        fixture.coordinator.decline_update(),
        Err(UpdateError::NoUpdateAvailable)
    ));
}

#[tokio::test]
async fn staged_copy_never_checks() {
    let fixture = Fixture::new("_U_tool", current(), FakeFetcher::serving("tool\t9.0.0.0\n"));
    assert_eq!(
        fixture.coordinator.role(),
        ProcessRole::Staged {
            target_name: "tool".to_string()
        }
    );

    let status = fixture
        .coordinator
        .check_for_updates(Notifier::Custom(Arc::new(|| {})), CheckMode::Blocking)
        .await
        .expect("check should succeed");

    assert_eq!(
        status,
        CheckStatus::Finished(CheckOutcome::NoUpdate(NoUpdateReason::StagedCopy))
    );
    assert_eq!(fixture.fetcher.manifest_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn staged_startup_replaces_target_and_exits() {
    let fixture = Fixture::new("_U_tool", current(), FakeFetcher::default());
    std::fs::write(fixture.path("tool"), b"old").expect("target should be written");
    std::fs::write(fixture.path("_U_tool"), BINARY).expect("staged copy should be written");

    let startup = fixture
        .coordinator
        .startup()
        .await
        .expect("staged install should succeed");

    assert_eq!(startup, Startup::HandedOff);
    assert_eq!(
        std::fs::read(fixture.path("tool")).expect("target should exist"),
        BINARY
    );
    assert_eq!(fixture.host.spawned(), vec![fixture.path("tool")]);
    assert_eq!(fixture.host.exits(), vec![0]);
    assert_eq!(fixture.coordinator.state(), UpdateState::Relaunching);
}

#[tokio::test]
async fn staged_startup_gives_up_on_undeletable_target() {
    let fixture = Fixture::new("_U_tool", current(), FakeFetcher::default());
    let target = fixture.path("tool");
    std::fs::create_dir(&target).expect("target dir should be created");
    std::fs::write(target.join("busy"), b"x").expect("target content should be written");
    std::fs::write(fixture.path("_U_tool"), BINARY).expect("staged copy should be written");

    let error = fixture
        .coordinator
        .startup()
        .await
        .expect_err("locked target should fail");

    assert!(matches!(
        error,
        UpdateError::Replace(ReplaceError::TargetLocked { attempts: 3, .. })
    ));
    assert!(target.join("busy").exists());
    assert!(fixture.host.spawned().is_empty());
    assert_eq!(fixture.host.exits(), vec![1]);
    let snapshot = fixture.coordinator.snapshot();
    assert_eq!(snapshot.state, UpdateState::InstallFailed);
    assert!(snapshot.last_error.is_some());
}

#[tokio::test]
async fn staged_startup_reports_target_missing_when_copy_fails() {
    let fixture = Fixture::new("_U_tool", current(), FakeFetcher::default());
    let target = fixture.path("tool");
    std::fs::write(&target, b"old").expect("target should be written");

    let error = fixture
        .coordinator
        .startup()
        .await
        .expect_err("copy from a missing staged image should fail");

    assert!(matches!(
        error,
        UpdateError::Replace(ReplaceError::TargetMissing { .. })
    ));
    assert!(!target.exists());
    assert!(fixture.host.spawned().is_empty());
    assert_eq!(fixture.host.exits(), vec![1]);

    let snapshot = fixture.coordinator.snapshot();
    assert_eq!(snapshot.state, UpdateState::InstallFailed);
    assert!(
        snapshot
            .last_error
            .is_some_and(|message| message.contains("manually"))
    );
}
