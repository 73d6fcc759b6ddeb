use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use restage_core::{CheckMode, NotificationMode, UpdaterConfig, VersionOrder};

#[derive(Parser, Debug)]
#[command(name = "restage")]
#[command(version)]
#[command(about = "Self-updating executable: check a manifest, stage the new build, relaunch.")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Update server directory holding the manifest and executables
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Manifest file name on the update server
    #[arg(long, global = true)]
    pub manifest: Option<String>,

    /// Version ordering: "platform" or "semantic"
    #[arg(long, global = true)]
    pub order: Option<VersionOrder>,

    /// How to ask before installing an update
    #[arg(long, global = true, value_enum)]
    pub notify: Option<NotifyArg>,

    /// Wait for the check to finish before returning
    #[arg(long, global = true)]
    pub blocking: bool,

    /// Settings file (defaults to the platform config directory)
    #[arg(long, global = true)]
    pub settings: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Check for a newer build and offer to install it (default)
    Check {
        /// Install without asking; only used with --notify custom
        #[arg(short, long)]
        yes: bool,

        /// Treat the running executable as this version
        #[arg(long)]
        current: Option<String>,
    },
    /// Print the entries of a manifest
    Manifest {
        /// Local manifest file; fetched from the update server when omitted
        path: Option<PathBuf>,
    },
    /// Parse a version string and print it back
    Parse {
        #[arg(value_name = "VERSION")]
        text: String,

        /// Number of components to print (1-4)
        #[arg(long, default_value_t = 4)]
        precision: u8,

        /// Print the fourth component as a label, e.g. "1.2.3 Build #4"
        #[arg(long)]
        label: bool,

        /// Compare against another version
        #[arg(long)]
        against: Option<String>,
    },
    /// Show the effective settings
    Config {
        /// Write the effective settings back to the settings file
        #[arg(long)]
        save: bool,
    },
}

impl Default for Command {
    fn default() -> Self {
        Self::Check {
            yes: false,
            current: None,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyArg {
    Console,
    Dialog,
    Custom,
}

impl From<NotifyArg> for NotificationMode {
    fn from(value: NotifyArg) -> Self {
        match value {
            NotifyArg::Console => Self::Console,
            NotifyArg::Dialog => Self::Dialog,
            NotifyArg::Custom => Self::Custom,
        }
    }
}

impl Cli {
    /// Apply command-line overrides on top of the persisted configuration.
    pub fn apply_overrides(&self, config: &mut UpdaterConfig) {
        if let Some(base_url) = &self.base_url {
            config.base_url.clone_from(base_url);
        }
        if let Some(manifest) = &self.manifest {
            config.manifest_name.clone_from(manifest);
        }
        if let Some(order) = self.order {
            config.version_order = order;
        }
        if let Some(notify) = self.notify {
            config.notification = notify.into();
        }
        if self.blocking {
            config.check_mode = CheckMode::Blocking;
        }
    }
}
