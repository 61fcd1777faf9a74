use thiserror::Error;

/// Error kinds for the Helm Executor.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HelmError {
    #[error("helm release already exists")]
    AlreadyExists,

    #[error("helm chart not found at {0}")]
    ChartNotFound(String),

    #[error("helm CLI binary not found on PATH")]
    CliNotFound,

    #[error("helm command timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("helm install failed: {0}")]
    Failed(String),
}

impl HelmError {
    /// The failure_reason text persisted on the Store Record.
    pub fn as_failure_reason(&self) -> String {
        match self {
            HelmError::Failed(excerpt) => format!("Helm install failed: {excerpt}"),
            HelmError::ChartNotFound(path) => format!("Helm install failed: chart not found at {path}"),
            HelmError::CliNotFound => "Helm install failed: helm CLI not found".to_string(),
            HelmError::Timeout(_) => "Helm install failed: command timed out".to_string(),
            HelmError::AlreadyExists => "Helm install failed: release already exists".to_string(),
        }
    }
}
