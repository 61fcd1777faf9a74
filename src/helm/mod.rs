pub mod cli;
pub mod error;

pub use error::HelmError;

use async_trait::async_trait;

use crate::store::Engine;

/// Everything the Helm Executor needs to install a store's release.
#[derive(Debug, Clone)]
pub struct InstallRequest {
    pub id: String,
    pub namespace: String,
    pub name: String,
    pub engine: Engine,
    pub domain: String,
    pub admin_username: String,
    pub admin_email: String,
    pub admin_password: String,
}

/// Thin adapter over the external Helm CLI. Idempotency at
/// this layer is impossible without a preflight check, so `install` is
/// deliberately not retried here — the Worker pairs it with
/// `release_exists` instead.
#[async_trait]
pub trait HelmExecutor: Send + Sync {
    async fn install(&self, request: &InstallRequest) -> Result<(), HelmError>;

    /// Idempotent: a missing release is success.
    async fn uninstall(&self, id: &str, namespace: &str) -> Result<(), HelmError>;

    async fn release_exists(&self, id: &str, namespace: &str) -> Result<bool, HelmError>;
}
