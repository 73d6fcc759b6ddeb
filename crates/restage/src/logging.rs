use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

use log::{info, warn};
use restage_core::ProcessRole;
#[cfg(debug_assertions)]
use simplelog::{ColorChoice, TermLogger, TerminalMode};
use simplelog::{CombinedLogger, ConfigBuilder, LevelFilter, SharedLogger, WriteLogger};

/// The launcher and the staged copy it starts share one log file, and the
/// staged copy usually has no terminal. Both append; only a launcher trims.
fn open_log_file(
    log_path: &Path,
    role: &ProcessRole,
    max_log_size: u64,
) -> io::Result<(File, bool)> {
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Trimming rewrites the file, which would drop lines from a launcher that
    // is still shutting down.
    let trimmed = if role.is_staged() {
        false
    } else {
        match trim_log_file(log_path, max_log_size) {
            Ok(trimmed) => trimmed,
            Err(error) if error.kind() == io::ErrorKind::NotFound => false,
            Err(error) => return Err(error),
        }
    };

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)?;
    Ok((file, trimmed))
}

/// Keep roughly the newest `max_log_size / 2` bytes, starting at a line.
fn trim_log_file(log_path: &Path, max_log_size: u64) -> io::Result<bool> {
    if std::fs::metadata(log_path)?.len() <= max_log_size {
        return Ok(false);
    }

    let contents = std::fs::read(log_path)?;
    let budget = usize::try_from(max_log_size / 2).unwrap_or(usize::MAX);
    let start = contents.len().saturating_sub(budget);
    let keep_from = if start == 0 || contents[start - 1] == b'\n' {
        start
    } else {
        contents[start..]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(contents.len(), |pos| start + pos + 1)
    };

    std::fs::write(log_path, &contents[keep_from..])?;
    Ok(true)
}

fn role_label(role: &ProcessRole) -> &'static str {
    match role {
        ProcessRole::Launcher => "launcher",
        ProcessRole::Staged { .. } => "staged copy",
    }
}

/// Install the file logger (and a terminal logger in debug builds).
/// Failures leave file logging disabled rather than aborting the program.
pub fn init_logging(log_path: &Path, role: &ProcessRole, debug_enabled: bool, max_log_size: u64) {
    let config = ConfigBuilder::new()
        .set_time_format_rfc3339()
        .add_filter_allow_str("restage")
        .build();

    let mut loggers: Vec<Box<dyn SharedLogger>> = Vec::new();

    #[cfg(debug_assertions)]
    loggers.push(TermLogger::new(
        LevelFilter::Debug,
        config.clone(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    ));

    let opened = open_log_file(log_path, role, max_log_size);
    let trimmed = match opened {
        Ok((file, trimmed)) => {
            loggers.push(WriteLogger::new(LevelFilter::Debug, config, file));
            trimmed
        }
        Err(error) => {
            eprintln!("restage: cannot open log file {}: {error}", log_path.display());
            false
        }
    };

    if !loggers.is_empty() {
        let _ = CombinedLogger::init(loggers);
    }
    set_debug_logging(debug_enabled);

    info!(
        "restage {} started as {} (pid {})",
        env!("CARGO_PKG_VERSION"),
        role_label(role),
        std::process::id()
    );
    if trimmed {
        warn!("Log file exceeded {max_log_size} bytes and was trimmed");
    }
}

pub fn set_debug_logging(enabled: bool) {
    if enabled {
        log::set_max_level(log::LevelFilter::Debug);
    } else {
        log::set_max_level(log::LevelFilter::Info);
    }
}
