pub mod client;
pub mod error;

pub use error::ProbeError;

use async_trait::async_trait;

/// Result of a workload readiness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PodsReadiness {
    pub ready: usize,
    pub total: usize,
    pub any_failed: bool,
}

impl PodsReadiness {
    pub fn is_ready(&self) -> bool {
        self.total >= 1 && self.ready == self.total && !self.any_failed
    }
}

/// The four observable phases of a setup job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

/// Read-only surface into the cluster. All operations
/// tolerate transient API errors by returning `ProbeError::Transient`
/// rather than failing the caller outright.
#[async_trait]
pub trait KubernetesProbe: Send + Sync {
    async fn pods_ready(&self, namespace: &str, release_label: &str) -> Result<PodsReadiness, ProbeError>;

    /// Absence of the job is `Pending`, not an error.
    async fn job_status(&self, namespace: &str, job_name: &str) -> Result<JobStatus, ProbeError>;

    async fn ingress_host(&self, namespace: &str, release_label: &str) -> Result<Option<String>, ProbeError>;

    async fn namespace_exists(&self, namespace: &str) -> Result<bool, ProbeError>;

    /// Best-effort: used on tear-down after the Helm uninstall already
    /// ran, so a missing namespace is success, not an error.
    async fn delete_namespace(&self, namespace: &str) -> Result<(), ProbeError>;
}
