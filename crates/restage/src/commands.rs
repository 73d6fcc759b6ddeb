use std::cmp::Ordering;
use std::io::Write as _;
use std::path::Path;
use std::sync::Arc;

use log::info;
use restage_core::{
    CheckOutcome, CheckStatus, ExecutableIdentity, Fetcher, HttpFetcher, Manifest,
    NoUpdateReason, Notifier, Precision, Startup, SystemHost, UpdateCoordinator, UpdateState,
    UpdaterConfig, Version, VersionOrder,
};

use crate::error::AppError;
use crate::settings::AppSettings;

pub async fn check(
    config: UpdaterConfig,
    yes: bool,
    current: Option<&str>,
) -> Result<(), AppError> {
    let order = config.version_order;
    let identity = ExecutableIdentity::current().map_err(AppError::environment_unavailable)?;
    let current_version = resolve_current_version(current, order)?;
    let fetcher = HttpFetcher::new(&config)
        .map_err(|error| AppError::operation_failed("HTTP client setup", error))?;

    let coordinator = UpdateCoordinator::new(
        config,
        identity,
        current_version,
        Arc::new(fetcher),
        Arc::new(SystemHost),
    )
    .with_progress(Arc::new(print_progress));

    match coordinator.startup().await {
        Ok(Startup::Continue) => {}
        Ok(Startup::HandedOff) => return Ok(()),
        Err(error) => return Err(AppError::auto_update_failed("install", error)),
    }

    let config = coordinator.config();
    if config.base_url.trim().is_empty() {
        return Err(AppError::not_configured("base_url"));
    }

    let notifier = Notifier::from_mode(
        config.notification,
        Some(Arc::new(|| println!("An update is available."))),
    );
    let status = coordinator
        .check_for_updates(notifier, config.check_mode)
        .await
        .map_err(AppError::update_check_failed)?;

    let outcome = match status {
        CheckStatus::Finished(outcome) => outcome,
        CheckStatus::Pending => {
            println!("Checking for updates...");
            coordinator
                .wait_until_done()
                .await
                .map_err(AppError::update_check_failed)?
        }
    };
    println!("{}", describe_outcome(&outcome, order));

    if yes
        && matches!(outcome, CheckOutcome::UpdateAvailable { .. })
        && coordinator.state() == UpdateState::UpdateAvailable
    {
        coordinator
            .install_update()
            .await
            .map_err(|error| AppError::auto_update_failed("install", error))?;
    }

    let snapshot = coordinator.snapshot();
    let last_error = || snapshot.last_error.clone().unwrap_or_default();
    match snapshot.state {
        UpdateState::DownloadFailed => Err(AppError::auto_update_failed("download", last_error())),
        UpdateState::InstallFailed => Err(AppError::auto_update_failed("install", last_error())),
        state => {
            info!("Update cycle finished in state {state}");
            Ok(())
        }
    }
}

pub async fn manifest(config: &UpdaterConfig, path: Option<&Path>) -> Result<(), AppError> {
    let bytes = if let Some(path) = path {
        std::fs::read(path).map_err(|error| AppError::operation_failed("Manifest read", error))?
    } else {
        if config.base_url.trim().is_empty() {
            return Err(AppError::not_configured("base_url"));
        }
        let fetcher = HttpFetcher::new(config)
            .map_err(|error| AppError::operation_failed("HTTP client setup", error))?;
        fetcher
            .fetch(&config.manifest_url(), None)
            .await
            .map_err(|error| AppError::operation_failed("Manifest fetch", error))?
    };

    let manifest = Manifest::parse(&bytes, config.version_order);
    if manifest.is_empty() {
        println!("No valid manifest entries.");
        return Ok(());
    }

    let mut entries: Vec<_> = manifest.iter().collect();
    entries.sort_unstable_by(|a, b| a.0.cmp(b.0));
    for (name, version) in entries {
        println!(
            "{name}\t{}",
            version.display(config.version_order, Precision::Four)
        );
    }
    Ok(())
}

pub fn parse(
    text: &str,
    order: VersionOrder,
    precision: u8,
    label: bool,
    against: Option<&str>,
) -> Result<(), AppError> {
    let version =
        Version::parse(text, order).map_err(|error| AppError::invalid_argument("version", error))?;
    let precision = Precision::from_level(precision)
        .ok_or_else(|| AppError::invalid_argument("precision", "expected a value from 1 to 4"))?;

    let display = version.display(order, precision);
    if label {
        println!("{}", display.with_build_label());
    } else {
        println!("{display}");
    }

    let (most_significant, least_significant) = version.to_packed(order);
    println!("packed: {most_significant:#010x} {least_significant:#010x}");

    if let Some(other) = against {
        let other = Version::parse(other, order)
            .map_err(|error| AppError::invalid_argument("comparison version", error))?;
        let relation = match order.compare(&version, &other) {
            Some(Ordering::Greater) => "newer than",
            Some(Ordering::Less) => "older than",
            Some(Ordering::Equal) => "the same as",
            None => "not comparable with",
        };
        println!(
            "{} is {relation} {} ({order} order)",
            version.display(order, Precision::Four),
            other.display(order, Precision::Four)
        );
    }
    Ok(())
}

pub fn config(settings: &AppSettings, path: &Path, save: bool) -> Result<(), AppError> {
    let json = serde_json::to_string_pretty(settings)
        .map_err(|error| AppError::settings_failed("serialize", error))?;
    println!("{json}");

    if save {
        settings
            .save(path)
            .map_err(|error| AppError::settings_failed("save", error))?;
        println!("Saved to {}", path.display());
    }
    Ok(())
}

fn resolve_current_version(
    current: Option<&str>,
    order: VersionOrder,
) -> Result<Version, AppError> {
    match current {
        Some(text) => Version::parse(text, order)
            .map_err(|error| AppError::invalid_argument("current version", error)),
        None => Ok(Version::parse_lenient(env!("CARGO_PKG_VERSION"), order)),
    }
}

fn describe_outcome(outcome: &CheckOutcome, order: VersionOrder) -> String {
    match outcome {
        CheckOutcome::UpdateAvailable { current, latest } => format!(
            "Update available: {} -> {}",
            current.display(order, Precision::Four),
            latest.display(order, Precision::Four)
        ),
        CheckOutcome::NoUpdate(NoUpdateReason::UpToDate { latest }) => format!(
            "Up to date (latest published: {})",
            latest.display(order, Precision::Four)
        ),
        CheckOutcome::NoUpdate(NoUpdateReason::NotListed) => {
            "This executable is not listed in the manifest.".to_string()
        }
        CheckOutcome::NoUpdate(NoUpdateReason::CurrentVersionInvalid) => {
            "The running version is unknown; not updating.".to_string()
        }
        CheckOutcome::NoUpdate(NoUpdateReason::StagedCopy) => {
            "Running as a staged copy; update checks are skipped.".to_string()
        }
    }
}

fn print_progress(done: u64, total: u64) {
    let mut stderr = std::io::stderr().lock();
    let _ = if total == 0 {
        write!(stderr, "\rDownloading: {done} bytes")
    } else {
        write!(stderr, "\rDownloading: {done}/{total} bytes")
    };
    if total != 0 && done >= total {
        let _ = writeln!(stderr);
    }
}
