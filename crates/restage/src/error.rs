#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppErrorDetail {
    Message(String),
    Io {
        kind: std::io::ErrorKind,
        message: String,
    },
}

impl std::fmt::Display for AppErrorDetail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Message(message) => write!(f, "{message}"),
            Self::Io { kind, message } => write!(f, "{kind}: {message}"),
        }
    }
}

impl From<String> for AppErrorDetail {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}

impl From<&str> for AppErrorDetail {
    fn from(value: &str) -> Self {
        Self::Message(value.to_string())
    }
}

impl From<std::io::Error> for AppErrorDetail {
    fn from(error: std::io::Error) -> Self {
        Self::Io {
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

impl From<restage_core::UpdateError> for AppErrorDetail {
    fn from(value: restage_core::UpdateError) -> Self {
        Self::Message(value.to_string())
    }
}

impl From<restage_core::FetchError> for AppErrorDetail {
    fn from(value: restage_core::FetchError) -> Self {
        Self::Message(value.to_string())
    }
}

impl From<restage_platform::ExecutableError> for AppErrorDetail {
    fn from(value: restage_platform::ExecutableError) -> Self {
        Self::Message(value.to_string())
    }
}

impl From<restage_platform::AppPathsError> for AppErrorDetail {
    fn from(value: restage_platform::AppPathsError) -> Self {
        Self::Message(value.to_string())
    }
}

impl From<restage_version::VersionParseError> for AppErrorDetail {
    fn from(value: restage_version::VersionParseError) -> Self {
        Self::Message(value.to_string())
    }
}

impl From<serde_json::Error> for AppErrorDetail {
    fn from(value: serde_json::Error) -> Self {
        Self::Message(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    Message(String),
    NotConfigured {
        setting: &'static str,
    },
    SettingsFailed {
        action: &'static str,
        details: AppErrorDetail,
    },
    EnvironmentUnavailable {
        reason: AppErrorDetail,
    },
    InvalidArgument {
        argument: &'static str,
        details: AppErrorDetail,
    },
    OperationFailed {
        operation: &'static str,
        details: AppErrorDetail,
    },
    UpdateCheckFailed {
        details: AppErrorDetail,
    },
    AutoUpdateFailed {
        phase: &'static str,
        details: AppErrorDetail,
    },
}

impl AppError {
    pub fn not_configured(setting: &'static str) -> Self {
        Self::NotConfigured { setting }
    }

    pub fn settings_failed(action: &'static str, details: impl Into<AppErrorDetail>) -> Self {
        Self::SettingsFailed {
            action,
            details: details.into(),
        }
    }

    pub fn environment_unavailable(reason: impl Into<AppErrorDetail>) -> Self {
        Self::EnvironmentUnavailable {
            reason: reason.into(),
        }
    }

    pub fn invalid_argument(argument: &'static str, details: impl Into<AppErrorDetail>) -> Self {
        Self::InvalidArgument {
            argument,
            details: details.into(),
        }
    }

    pub fn operation_failed(operation: &'static str, details: impl Into<AppErrorDetail>) -> Self {
        Self::OperationFailed {
            operation,
            details: details.into(),
        }
    }

    pub fn update_check_failed(details: impl Into<AppErrorDetail>) -> Self {
        Self::UpdateCheckFailed {
            details: details.into(),
        }
    }

    pub fn auto_update_failed(phase: &'static str, details: impl Into<AppErrorDetail>) -> Self {
        Self::AutoUpdateFailed {
            phase,
            details: details.into(),
        }
    }
}

impl From<String> for AppError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}

impl From<&str> for AppError {
    fn from(value: &str) -> Self {
        Self::Message(value.to_string())
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Message(message) => write!(f, "{message}"),
            Self::NotConfigured { setting } => write!(
                f,
                "{setting} is not configured (set it in settings.json or on the command line)"
            ),
            Self::SettingsFailed { action, details } => {
                write!(f, "Settings {action} failed: {details}")
            }
            Self::EnvironmentUnavailable { reason } => write!(f, "{reason}"),
            Self::InvalidArgument { argument, details } => {
                write!(f, "Invalid {argument}: {details}")
            }
            Self::OperationFailed { operation, details } => {
                write!(f, "{operation} failed: {details}")
            }
            Self::UpdateCheckFailed { details } => write!(f, "Update check failed: {details}"),
            Self::AutoUpdateFailed { phase, details } => {
                write!(f, "Update {phase} failed: {details}")
            }
        }
    }
}

impl std::error::Error for AppError {}

#[cfg(test)]
mod tests {
    use super::{AppError, AppErrorDetail};

    #[test]
    fn constructors_build_expected_variants() {
        assert_eq!(
            AppError::auto_update_failed("download", "HTTP 404"),
            AppError::AutoUpdateFailed {
                phase: "download",
                details: AppErrorDetail::from("HTTP 404")
            }
        );
        assert_eq!(
            AppError::settings_failed("save", "read-only"),
            AppError::SettingsFailed {
                action: "save",
                details: AppErrorDetail::from("read-only")
            }
        );
        assert_eq!(
            AppError::not_configured("base_url"),
            AppError::NotConfigured {
                setting: "base_url"
            }
        );
    }

    #[test]
    fn display_includes_phase_and_details() {
        assert_eq!(
            AppError::auto_update_failed("install", "permission denied").to_string(),
            "Update install failed: permission denied"
        );
        assert_eq!(
            AppError::update_check_failed("timed out").to_string(),
            "Update check failed: timed out"
        );
        assert_eq!(
            AppError::invalid_argument("version", "bad input").to_string(),
            "Invalid version: bad input"
        );
        assert_eq!(AppError::from("plain").to_string(), "plain");
    }

    #[test]
    fn io_detail_keeps_kind() {
        let detail = AppErrorDetail::from(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "settings.json",
        ));

        assert_eq!(
            detail,
            AppErrorDetail::Io {
                kind: std::io::ErrorKind::PermissionDenied,
                message: "settings.json".to_string(),
            }
        );
    }

    #[test]
    fn update_errors_convert_to_messages() {
        let detail = AppErrorDetail::from(restage_core::UpdateError::NoUpdateAvailable);
        assert_eq!(
            detail,
            AppErrorDetail::Message("no update is available to install".to_string())
        );
    }
}
