mod commands;
mod executable;
mod paths;
mod process;

pub use commands::DetachProcess;
pub use executable::{ExecutableError, ExecutableIdentity};
pub use paths::{AppPaths, AppPathsError};
pub use process::{ProcessHost, SystemHost};
