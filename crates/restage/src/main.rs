mod cli;
mod commands;
mod error;
mod logging;
mod settings;

use std::process::ExitCode;

use clap::Parser;
use log::{error, info, warn};
use restage_core::{ExecutableIdentity, ProcessRole};
use restage_platform::AppPaths;

use crate::cli::{Cli, Command};
use crate::error::AppError;
use crate::settings::AppSettings;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(app_error) => {
            error!("{app_error}");
            eprintln!("restage: {app_error}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let paths = AppPaths::new().map_err(AppError::environment_unavailable)?;
    let settings_path = cli.settings.clone().unwrap_or_else(|| paths.settings_file());

    let (mut settings, settings_error) = match AppSettings::load(&settings_path) {
        Ok(settings) => (settings, None),
        Err(error) => (AppSettings::default(), Some(error)),
    };
    cli.apply_overrides(&mut settings.updater);

    if let Err(error) = paths.ensure_dirs() {
        eprintln!("restage: cannot create application directories: {error}");
    }
    let role = ExecutableIdentity::current().map_or(ProcessRole::Launcher, |identity| {
        ProcessRole::of(&identity, &settings.updater.staging_prefix)
    });
    logging::init_logging(
        &paths.log_file(),
        &role,
        settings.debug_logging || cli.debug,
        settings.max_log_size_bytes,
    );
    info!("Settings: {}", settings_path.display());
    if let Some(error) = settings_error {
        warn!("{error}; using defaults");
        eprintln!("restage: {error}; using defaults");
    }

    match cli.command.unwrap_or_default() {
        Command::Check { yes, current } => {
            commands::check(settings.updater, yes, current.as_deref()).await
        }
        Command::Manifest { path } => commands::manifest(&settings.updater, path.as_deref()).await,
        Command::Parse {
            text,
            precision,
            label,
            against,
        } => commands::parse(
            &text,
            settings.updater.version_order,
            precision,
            label,
            against.as_deref(),
        ),
        Command::Config { save } => commands::config(&settings, &settings_path, save),
    }
}
