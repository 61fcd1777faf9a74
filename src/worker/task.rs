use tracing::{info, warn};

use crate::helm::{HelmError, InstallRequest};
use crate::kube_probe::JobStatus;
use crate::store::{StatusUpdate, StoreError, StoreStatus};

use super::Worker;

/// Outcome of the readiness poll loop other than plain success.
enum PollOutcome {
    Failed(String),
    ShuttingDown,
}

enum Tick {
    Ready(String),
    Failed(String),
    NotYet,
}

/// Drives a `PROVISIONING` record to `READY` or `FAILED`.
/// `skip_helm` is set by the Recovery Controller once it has already
/// confirmed the release exists; a fresh create always passes `false` and
/// decides for itself via `release_exists`.
pub async fn install_task(worker: &Worker, id: &str, skip_helm: bool) -> Result<(), StoreError> {
    let store = match worker.store.get(id).await {
        Ok(store) => store,
        Err(StoreError::NotFound) => return Ok(()),
        Err(e) => return Err(e),
    };

    if store.status != StoreStatus::Provisioning {
        return Ok(());
    }

    if !skip_helm {
        match worker.helm.release_exists(id, &store.namespace).await {
            Ok(true) => {}
            Ok(false) => {
                let request = InstallRequest {
                    id: store.id.clone(),
                    namespace: store.namespace.clone(),
                    name: store.name.clone(),
                    engine: store.engine,
                    domain: format!("{}.{}", store.name, worker.config.base_domain),
                    admin_username: store.admin_username.clone(),
                    admin_email: store.admin_email.clone(),
                    admin_password: store.admin_password.clone(),
                };
                if let Err(e) = worker.helm.install(&request).await {
                    if !matches!(e, HelmError::AlreadyExists) {
                        return fail(worker, id, e.as_failure_reason()).await;
                    }
                }
            }
            Err(e) => return fail(worker, id, e.as_failure_reason()).await,
        }
    }

    match poll_until_ready(worker, &store.namespace, &store.helm_release, store.engine.to_string().as_str()).await {
        Ok(host) => {
            let store_url = format!("{}://{}", worker.config.store_scheme(), host);
            transition(worker, id, StatusUpdate::Ready { store_url }).await
        }
        Err(PollOutcome::Failed(reason)) => fail(worker, id, reason).await,
        Err(PollOutcome::ShuttingDown) => {
            info!(store_id = %id, "shutdown requested mid-poll, leaving record in PROVISIONING for recovery");
            Ok(())
        }
    }
}

/// Tears a `DELETING` record down to `DELETED`.
/// Uninstall errors are retried with no attempt ceiling: a store stuck in
/// `DELETING` keeps being retried by the Recovery Controller on every
/// restart rather than being abandoned.
pub async fn delete_task(worker: &Worker, id: &str) -> Result<(), StoreError> {
    let store = match worker.store.get(id).await {
        Ok(store) => store,
        Err(StoreError::NotFound) => return Ok(()),
        Err(e) => return Err(e),
    };

    if store.status != StoreStatus::Deleting {
        return Ok(());
    }

    loop {
        if worker.shutdown.is_cancelled() {
            info!(store_id = %id, "shutdown requested mid-delete, leaving record in DELETING for recovery");
            return Ok(());
        }

        match worker.helm.uninstall(id, &store.namespace).await {
            Ok(()) => break,
            Err(e) => warn!(store_id = %id, error = %e, "helm uninstall failed, will retry"),
        }

        tokio::select! {
            _ = tokio::time::sleep(worker.config.poll_interval) => {}
            _ = worker.shutdown.cancelled() => {
                info!(store_id = %id, "shutdown requested mid-delete, leaving record in DELETING for recovery");
                return Ok(());
            }
        }
    }

    if let Err(e) = worker.probe.delete_namespace(&store.namespace).await {
        warn!(store_id = %id, error = %e, "namespace delete failed, proceeding anyway (best effort)");
    }

    transition(worker, id, StatusUpdate::Deleted).await
}

async fn poll_until_ready(worker: &Worker, namespace: &str, release_label: &str, engine: &str) -> Result<String, PollOutcome> {
    let job_name = format!("{release_label}-{engine}-setup");
    let deadline = tokio::time::Instant::now() + worker.config.overall_timeout;

    loop {
        if worker.shutdown.is_cancelled() {
            return Err(PollOutcome::ShuttingDown);
        }

        match evaluate_tick(worker, namespace, release_label, &job_name).await {
            Tick::Ready(host) => return Ok(host),
            Tick::Failed(reason) => return Err(PollOutcome::Failed(reason)),
            Tick::NotYet => {}
        }

        if tokio::time::Instant::now() >= deadline {
            return Err(PollOutcome::Failed("Provisioning timed out".to_string()));
        }

        tokio::select! {
            _ = tokio::time::sleep(worker.config.poll_interval) => {}
            _ = worker.shutdown.cancelled() => return Err(PollOutcome::ShuttingDown),
        }
    }
}

async fn evaluate_tick(worker: &Worker, namespace: &str, release_label: &str, job_name: &str) -> Tick {
    let pods = match worker.probe.pods_ready(namespace, release_label).await {
        Ok(pods) => pods,
        Err(e) => {
            if !e.is_transient() {
                warn!(namespace, error = %e, "pod readiness check failed, retrying next tick");
            }
            return Tick::NotYet;
        }
    };
    if pods.any_failed {
        return Tick::Failed("Pods not ready".to_string());
    }

    let job = match worker.probe.job_status(namespace, job_name).await {
        Ok(status) => status,
        Err(e) => {
            if !e.is_transient() {
                warn!(namespace, error = %e, "setup job check failed, retrying next tick");
            }
            return Tick::NotYet;
        }
    };
    if job == JobStatus::Failed {
        return Tick::Failed("Setup job failed".to_string());
    }

    if !pods.is_ready() || job != JobStatus::Succeeded {
        return Tick::NotYet;
    }

    match worker.probe.ingress_host(namespace, release_label).await {
        Ok(Some(host)) if !host.is_empty() => Tick::Ready(host),
        _ => Tick::NotYet,
    }
}

async fn fail(worker: &Worker, id: &str, reason: String) -> Result<(), StoreError> {
    warn!(store_id = %id, reason = %reason, "provisioning failed");
    transition(worker, id, StatusUpdate::Failed { reason }).await
}

async fn transition(worker: &Worker, id: &str, update: StatusUpdate) -> Result<(), StoreError> {
    match worker.store.update_status(id, update).await {
        Ok(_) => Ok(()),
        Err(StoreError::IllegalTransition { .. }) => Ok(()),
        Err(e) => Err(e),
    }
}
