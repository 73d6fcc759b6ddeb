use std::io;
use std::path::Path;
use std::process::Command;

use log::{debug, info};

use crate::commands::DetachProcess;

/// Process-level side effects needed to hand control to another executable.
pub trait ProcessHost: Send + Sync {
    /// Start `program` as a new, independent process. Does not wait for it.
    ///
    /// # Errors
    /// Returns the OS error when the process cannot be started.
    fn spawn_detached(&self, program: &Path) -> io::Result<()>;

    /// Terminate the current process with `code`. [`SystemHost`] never
    /// returns from this call.
    fn exit(&self, code: i32);
}

/// [`ProcessHost`] backed by the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemHost;

impl ProcessHost for SystemHost {
    fn spawn_detached(&self, program: &Path) -> io::Result<()> {
        info!("Executing: {}", program.display());

        let mut command = Command::new(program);
        if let Some(dir) = program.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            command.current_dir(dir);
        }
        let child = command.detach().spawn()?;

        debug!("Started process {} from {}", child.id(), program.display());
        Ok(())
    }

    fn exit(&self, code: i32) {
        info!("Exiting process with code {code}");
        log::logger().flush();
        std::process::exit(code)
    }
}
