//! Self-update orchestration for a single executable.
//!
//! This crate ties together:
//! - Manifest fetching and parsing (`name<TAB>version` lines).
//! - The update state machine and its background check task.
//! - The staged double-launch protocol that replaces a running executable.
//! - Update notifications (console, native dialog, caller callback).

pub mod config;
mod coordinator;
mod error;
pub mod fetch;
mod manifest;
mod notify;
pub mod self_replace;
mod session;

/// Runtime configuration and its serde defaults.
pub use config::{CheckMode, NotificationMode, RetryPolicy, UpdaterConfig};
/// Update coordinator and the values its API reports.
pub use coordinator::{
    CheckOutcome, CheckStatus, InstallOutcome, NoUpdateReason, Startup, UpdateCoordinator,
};
/// Error taxonomy for fetch, replace and coordinator failures.
pub use error::{FetchError, ReplaceError, UpdateError};
/// Transport seam and the default HTTP implementation.
pub use fetch::{Fetcher, HttpFetcher, ProgressCallback};
/// Manifest model and parser.
pub use manifest::Manifest;
/// Update-available notification strategies.
pub use notify::{Decision, Notifier, UpdateCallback, parse_answer, prompt_console};
/// Process role detection for the staged double-launch.
pub use self_replace::{DEFAULT_STAGING_PREFIX, ProcessRole};
/// Update state machine and session inspection.
pub use session::{SessionSnapshot, UpdateState};

pub use restage_platform::{ExecutableIdentity, ProcessHost, SystemHost};
pub use restage_version::{Precision, Version, VersionOrder};
