use std::fmt;
use std::io::{self, BufRead, Write};
use std::sync::Arc;

use log::warn;
use restage_version::{Precision, Version, VersionOrder};
use tokio::sync::oneshot;

use crate::config::NotificationMode;

/// Zero-argument hook invoked when a check finds a newer version.
pub type UpdateCallback = Arc<dyn Fn() + Send + Sync>;

/// What to do with an available update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Install,
    Decline,
    /// The caller decides later through the coordinator.
    Deferred,
}

/// How the user is told that an update is available.
#[derive(Clone)]
pub enum Notifier {
    Console,
    Dialog,
    Custom(UpdateCallback),
}

impl fmt::Debug for Notifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Console => f.write_str("Console"),
            Self::Dialog => f.write_str("Dialog"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl Notifier {
    /// Build the notifier for `mode`. `Custom` without a callback only logs.
    #[must_use]
    pub fn from_mode(mode: NotificationMode, callback: Option<UpdateCallback>) -> Self {
        match mode {
            NotificationMode::Console => Self::Console,
            NotificationMode::Dialog => Self::Dialog,
            NotificationMode::Custom => Self::Custom(callback.unwrap_or_else(|| {
                Arc::new(|| log::info!("Update available; waiting for caller decision"))
            })),
        }
    }

    pub(crate) async fn ask(
        &self,
        current: Version,
        latest: Version,
        order: VersionOrder,
    ) -> Decision {
        match self {
            Self::Console => ask_console(prompt_message(current, latest, order)).await,
            Self::Dialog => ask_dialog(prompt_message(current, latest, order)).await,
            Self::Custom(callback) => {
                callback();
                Decision::Deferred
            }
        }
    }
}

/// Print `message` and read a yes/no answer. End of input declines.
///
/// # Errors
/// Returns an error if writing the prompt or reading the answer fails.
pub fn prompt_console<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    message: &str,
) -> io::Result<Decision> {
    write!(output, "{message} [Y/n] ")?;
    output.flush()?;

    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(Decision::Decline);
    }
    Ok(parse_answer(&line))
}

/// Empty input or a leading `y`/`Y` installs; anything else declines.
#[must_use]
pub fn parse_answer(line: &str) -> Decision {
    let answer = line.trim();
    if answer.is_empty() || answer.starts_with(['y', 'Y']) {
        Decision::Install
    } else {
        Decision::Decline
    }
}

fn prompt_message(current: Version, latest: Version, order: VersionOrder) -> String {
    format!(
        "A new version is available ({} -> {}). Install it now?",
        current.display(order, Precision::Four),
        latest.display(order, Precision::Four)
    )
}

async fn ask_console(message: String) -> Decision {
    run_detached(move || {
        let stdin = io::stdin();
        let stdout = io::stdout();
        prompt_console(&mut stdin.lock(), &mut stdout.lock(), &message)
    })
    .await
}

/// Run a blocking prompt on a detached thread and wait for the answer.
///
/// Runtime shutdown waits for tokio's blocking pool but not for this thread,
/// so an unanswered prompt never keeps the process alive.
async fn run_detached<F>(prompt: F) -> Decision
where
    F: FnOnce() -> io::Result<Decision> + Send + 'static,
{
    let (sender, receiver) = oneshot::channel();
    let spawned = std::thread::Builder::new()
        .name("restage-prompt".to_string())
        .spawn(move || {
            let _ = sender.send(prompt());
        });
    if let Err(error) = spawned {
        warn!("Failed to start update prompt: {error}");
        return Decision::Decline;
    }

    match receiver.await {
        Ok(Ok(decision)) => decision,
        Ok(Err(error)) => {
            warn!("Update prompt failed: {error}");
            Decision::Decline
        }
        Err(_) => {
            warn!("Update prompt ended without an answer");
            Decision::Decline
        }
    }
}

#[cfg(feature = "dialog")]
async fn ask_dialog(message: String) -> Decision {
    run_detached(move || {
        let answer = rfd::MessageDialog::new()
            .set_level(rfd::MessageLevel::Info)
            .set_title("Update available")
            .set_description(message)
            .set_buttons(rfd::MessageButtons::YesNo)
            .show();
        Ok(match answer {
            rfd::MessageDialogResult::Yes | rfd::MessageDialogResult::Ok => Decision::Install,
            _ => Decision::Decline,
        })
    })
    .await
}

#[cfg(not(feature = "dialog"))]
async fn ask_dialog(message: String) -> Decision {
    warn!("Dialog notifications need the `dialog` feature, falling back to console");
    ask_console(message).await
}
