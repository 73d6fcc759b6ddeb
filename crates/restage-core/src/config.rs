use std::path::PathBuf;
use std::time::Duration;

use restage_version::VersionOrder;
use serde::{Deserialize, Serialize};

use crate::self_replace::DEFAULT_STAGING_PREFIX;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdaterConfig {
    /// Server directory holding the manifest and the executables.
    #[serde(default)]
    pub base_url: String,

    #[serde(default = "default_manifest_name")]
    pub manifest_name: String,

    #[serde(default)]
    pub version_order: VersionOrder,

    #[serde(default)]
    pub check_mode: CheckMode,

    #[serde(default)]
    pub notification: NotificationMode,

    #[serde(default = "default_staging_prefix")]
    pub staging_prefix: String,

    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Parent directory for downloads. Defaults to the app cache directory.
    #[serde(default)]
    pub download_dir: Option<PathBuf>,
}

fn default_manifest_name() -> String {
    "versions.txt".to_string()
}

fn default_staging_prefix() -> String {
    DEFAULT_STAGING_PREFIX.to_string()
}

fn default_http_timeout() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    10
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            manifest_name: default_manifest_name(),
            version_order: VersionOrder::default(),
            check_mode: CheckMode::default(),
            notification: NotificationMode::default(),
            staging_prefix: default_staging_prefix(),
            retry: RetryPolicy::default(),
            http_timeout_secs: default_http_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            download_dir: None,
        }
    }
}

impl UpdaterConfig {
    #[must_use]
    pub fn manifest_url(&self) -> String {
        self.url_for(&self.manifest_name)
    }

    /// URL of the executable published under `exe_name`.
    #[must_use]
    pub fn binary_url(&self, exe_name: &str) -> String {
        self.url_for(exe_name)
    }

    #[must_use]
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    fn url_for(&self, file: &str) -> String {
        format!("{}/{file}", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckMode {
    Blocking,
    #[default]
    NonBlocking,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationMode {
    #[default]
    Console,
    Dialog,
    Custom,
}

/// Timing of the staged role's attempts to remove the old executable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_delete_attempts")]
    pub delete_attempts: u32,

    #[serde(default = "default_delete_delay")]
    pub delete_delay_ms: u64,

    /// Wait before the first attempt, giving the launcher time to exit.
    #[serde(default = "default_grace")]
    pub grace_ms: u64,
}

fn default_delete_attempts() -> u32 {
    5
}

fn default_delete_delay() -> u64 {
    100
}

fn default_grace() -> u64 {
    100
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            delete_attempts: default_delete_attempts(),
            delete_delay_ms: default_delete_delay(),
            grace_ms: default_grace(),
        }
    }
}

impl RetryPolicy {
    /// Policy without any sleeping, for tests and tooling.
    #[must_use]
    pub const fn immediate(delete_attempts: u32) -> Self {
        Self {
            delete_attempts,
            delete_delay_ms: 0,
            grace_ms: 0,
        }
    }

    #[must_use]
    pub fn delete_delay(&self) -> Duration {
        Duration::from_millis(self.delete_delay_ms)
    }

    #[must_use]
    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }
}
