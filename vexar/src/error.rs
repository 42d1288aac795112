//! Vexar-specific error types

use shared::SharedError;
use thiserror::Error;

/// Failures reported synchronously by `ProcessSupervisor::start`.
///
/// None of these trigger automatic retry; recovery only applies to crashes
/// of a process that did start.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SupervisorError {
    #[error("spoofdpi binary not found. Please install via Homebrew: brew install spoofdpi")]
    BinaryNotFound,

    #[error("No available ports found to start the service")]
    NoPortsAvailable,

    #[error("Failed to start process: {reason}")]
    StartFailed { reason: String },
}

#[derive(Error, Debug)]
pub enum VexarError {
    #[error("Supervisor error: {0}")]
    Supervisor(#[from] SupervisorError),

    #[error("Settings file error: {operation} on {path}")]
    SettingsError { operation: String, path: String },

    #[error("Installation failed: {reason}")]
    InstallFailed { reason: String },

    #[error("Orchestrator is no longer running")]
    OrchestratorGone,

    #[error("Shared component error: {0}")]
    SharedError(#[from] SharedError),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl VexarError {
    pub fn settings(operation: &str, path: &std::path::Path) -> Self {
        VexarError::SettingsError {
            operation: operation.to_string(),
            path: path.display().to_string(),
        }
    }

    pub fn install(reason: impl Into<String>) -> Self {
        VexarError::InstallFailed { reason: reason.into() }
    }
}

pub type VexarResult<T> = Result<T, VexarError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supervisor_error_messages() {
        assert!(SupervisorError::BinaryNotFound.to_string().contains("brew install spoofdpi"));
        assert_eq!(
            SupervisorError::StartFailed {
                reason: "permission denied".to_string()
            }
            .to_string(),
            "Failed to start process: permission denied"
        );
    }

    #[test]
    fn test_supervisor_error_converts() {
        let err: VexarError = SupervisorError::NoPortsAvailable.into();
        assert!(matches!(err, VexarError::Supervisor(SupervisorError::NoPortsAvailable)));
    }
}
