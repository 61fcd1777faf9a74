use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{info, warn};

use super::error::HelmError;
use super::{HelmExecutor, InstallRequest};

const STDERR_EXCERPT_LEN: usize = 500;

/// Adapter that shells out to the `helm` binary, in the style of
/// `cmd::helm::helm_exec_with_output` in the reference engine: build an
/// argument vector, run it, classify the outcome from exit code + stderr.
pub struct CliHelmExecutor {
    chart_path: String,
    base_values_file: String,
    env_values_file: String,
    exec_timeout: Duration,
    kubeconfig: Option<String>,
}

impl CliHelmExecutor {
    pub fn new(
        chart_path: String,
        base_values_file: String,
        env_values_file: String,
        exec_timeout: Duration,
        kubeconfig: Option<String>,
    ) -> Self {
        CliHelmExecutor {
            chart_path,
            base_values_file,
            env_values_file,
            exec_timeout,
            kubeconfig,
        }
    }

    fn command(&self, args: &[String]) -> Command {
        let mut command = Command::new("helm");
        command.args(args);
        if let Some(kubeconfig) = &self.kubeconfig {
            command.env("KUBECONFIG", kubeconfig);
        }
        command
    }

    async fn run(&self, args: Vec<String>) -> Result<(i32, String, String), HelmError> {
        let mut child = match self.command(&args).spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(HelmError::CliNotFound),
            Err(e) => return Err(HelmError::Failed(e.to_string())),
        };

        let output = match timeout(self.exec_timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(HelmError::Failed(e.to_string())),
            Err(_) => return Err(HelmError::Timeout(self.exec_timeout)),
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let code = output.status.code().unwrap_or(-1);
        Ok((code, stdout, stderr))
    }
}

fn excerpt(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.len() <= STDERR_EXCERPT_LEN {
        trimmed.to_string()
    } else {
        format!("{}…", &trimmed[..STDERR_EXCERPT_LEN])
    }
}

#[async_trait]
impl HelmExecutor for CliHelmExecutor {
    async fn install(&self, request: &InstallRequest) -> Result<(), HelmError> {
        if !Path::new(&self.chart_path).exists() {
            return Err(HelmError::ChartNotFound(self.chart_path.clone()));
        }

        info!(id = %request.id, namespace = %request.namespace, "exec helm install");

        let args: Vec<String> = vec![
            "install".to_string(),
            request.id.clone(),
            self.chart_path.clone(),
            "--namespace".to_string(),
            request.namespace.clone(),
            "--create-namespace".to_string(),
            "-f".to_string(),
            self.base_values_file.clone(),
            "-f".to_string(),
            self.env_values_file.clone(),
            "--set".to_string(),
            format!("store.id={}", request.id),
            "--set".to_string(),
            format!("store.name={}", request.name),
            "--set".to_string(),
            format!("store.namespace={}", request.namespace),
            "--set".to_string(),
            format!("store.engine={}", request.engine),
            "--set".to_string(),
            format!("store.domain={}", request.domain),
            "--set".to_string(),
            format!("admin.username={}", request.admin_username),
            "--set".to_string(),
            format!("admin.email={}", request.admin_email),
            "--set".to_string(),
            format!("admin.password={}", request.admin_password),
        ];

        let (code, _stdout, stderr) = self.run(args).await?;
        if code == 0 {
            return Ok(());
        }

        if stderr.contains("cannot re-use a name") || stderr.contains("already exists") {
            return Err(HelmError::AlreadyExists);
        }

        warn!(%code, stderr = %excerpt(&stderr), "helm install failed");
        Err(HelmError::Failed(excerpt(&stderr)))
    }

    async fn uninstall(&self, id: &str, namespace: &str) -> Result<(), HelmError> {
        info!(id, namespace, "exec helm uninstall");

        let args = vec![
            "uninstall".to_string(),
            id.to_string(),
            "--namespace".to_string(),
            namespace.to_string(),
        ];

        let (code, _stdout, stderr) = self.run(args).await?;
        if code == 0 || stderr.contains("not found") {
            return Ok(());
        }

        warn!(%code, stderr = %excerpt(&stderr), "helm uninstall failed");
        Err(HelmError::Failed(excerpt(&stderr)))
    }

    async fn release_exists(&self, id: &str, namespace: &str) -> Result<bool, HelmError> {
        info!(id, namespace, "exec helm status");

        let args = vec![
            "status".to_string(),
            id.to_string(),
            "--namespace".to_string(),
            namespace.to_string(),
        ];

        let (code, _stdout, stderr) = self.run(args).await?;
        if code == 0 {
            return Ok(true);
        }
        if stderr.contains("not found") {
            return Ok(false);
        }

        warn!(%code, stderr = %excerpt(&stderr), "helm status failed");
        Err(HelmError::Failed(excerpt(&stderr)))
    }
}
