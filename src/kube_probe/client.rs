use async_trait::async_trait;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{Namespace, Pod};
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::{DeleteParams, ListParams};
use kube::{Api, Client};
use tokio::sync::RwLock;
use tracing::warn;

use super::error::ProbeError;
use super::{JobStatus, KubernetesProbe, PodsReadiness};

/// Pods crashing more than this many times are considered failed rather
/// than merely still starting up.
const CRASH_LOOP_RESTART_THRESHOLD: i32 = 5;

/// `kube`-backed implementation of the Kubernetes Probe. The client is
/// connected lazily on first use and cached: constructing the probe must
/// never fail just because the cluster isn't reachable yet.
pub struct KubeProbe {
    client: RwLock<Option<Client>>,
}

impl KubeProbe {
    pub fn new() -> Self {
        KubeProbe { client: RwLock::new(None) }
    }

    async fn client(&self) -> Result<Client, ProbeError> {
        if let Some(client) = self.client.read().await.as_ref() {
            return Ok(client.clone());
        }

        let mut guard = self.client.write().await;
        if let Some(client) = guard.as_ref() {
            return Ok(client.clone());
        }

        let client = Client::try_default().await.map_err(|e| {
            warn!(error = %e, "unable to reach kubernetes cluster");
            ProbeError::Transient(e.to_string())
        })?;
        *guard = Some(client.clone());
        Ok(client)
    }
}

impl Default for KubeProbe {
    fn default() -> Self {
        Self::new()
    }
}

fn pod_has_crashed(pod: &Pod) -> bool {
    let Some(status) = &pod.status else { return false };
    if status.phase.as_deref() == Some("Failed") {
        return true;
    }
    let Some(statuses) = &status.container_statuses else { return false };
    statuses.iter().any(|s| {
        if s.restart_count > CRASH_LOOP_RESTART_THRESHOLD {
            return true;
        }
        s.state
            .as_ref()
            .and_then(|state| state.waiting.as_ref())
            .and_then(|waiting| waiting.reason.as_deref())
            .map(|reason| reason == "CrashLoopBackOff" || reason == "ImagePullBackOff")
            .unwrap_or(false)
    })
}

fn pod_is_ready(pod: &Pod) -> bool {
    let Some(status) = &pod.status else { return false };
    let Some(conditions) = &status.conditions else { return false };
    conditions
        .iter()
        .any(|c| c.type_ == "Ready" && c.status == "True")
}

#[async_trait]
impl KubernetesProbe for KubeProbe {
    async fn pods_ready(&self, namespace: &str, release_label: &str) -> Result<PodsReadiness, ProbeError> {
        let client = self.client().await?;
        let api: Api<Pod> = Api::namespaced(client, namespace);
        let selector = format!("app.kubernetes.io/instance={release_label}");
        let pods = api
            .list(&ListParams::default().labels(&selector))
            .await
            .map_err(ProbeError::from_kube_error)?;

        let total = pods.items.len();
        let ready = pods.items.iter().filter(|p| pod_is_ready(p)).count();
        let any_failed = pods.items.iter().any(pod_has_crashed);

        Ok(PodsReadiness { ready, total, any_failed })
    }

    async fn job_status(&self, namespace: &str, job_name: &str) -> Result<JobStatus, ProbeError> {
        let client = self.client().await?;
        let api: Api<Job> = Api::namespaced(client, namespace);

        let job = match api.get_opt(job_name).await.map_err(ProbeError::from_kube_error)? {
            Some(job) => job,
            None => return Ok(JobStatus::Pending),
        };

        let Some(status) = job.status else { return Ok(JobStatus::Pending) };
        if status.succeeded.unwrap_or(0) > 0 {
            return Ok(JobStatus::Succeeded);
        }
        if status.failed.unwrap_or(0) > 0 {
            return Ok(JobStatus::Failed);
        }
        if status.active.unwrap_or(0) > 0 {
            return Ok(JobStatus::Running);
        }
        Ok(JobStatus::Pending)
    }

    async fn ingress_host(&self, namespace: &str, release_label: &str) -> Result<Option<String>, ProbeError> {
        let client = self.client().await?;
        let api: Api<Ingress> = Api::namespaced(client, namespace);
        let selector = format!("app.kubernetes.io/instance={release_label}");
        let ingresses = api
            .list(&ListParams::default().labels(&selector))
            .await
            .map_err(ProbeError::from_kube_error)?;

        for ingress in &ingresses.items {
            if let Some(spec) = &ingress.spec {
                if let Some(rules) = &spec.rules {
                    if let Some(host) = rules.iter().find_map(|r| r.host.clone()) {
                        return Ok(Some(host));
                    }
                }
            }
            if let Some(host) = ingress
                .status
                .as_ref()
                .and_then(|s| s.load_balancer.as_ref())
                .and_then(|lb| lb.ingress.as_ref())
                .and_then(|points| points.first())
                .and_then(|point| point.hostname.clone().or_else(|| point.ip.clone()))
            {
                return Ok(Some(host));
            }
        }

        Ok(None)
    }

    async fn namespace_exists(&self, namespace: &str) -> Result<bool, ProbeError> {
        let client = self.client().await?;
        let api: Api<Namespace> = Api::all(client);
        let found = api.get_opt(namespace).await.map_err(ProbeError::from_kube_error)?;
        Ok(found.is_some())
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<(), ProbeError> {
        let client = self.client().await?;
        let api: Api<Namespace> = Api::all(client);
        match api.delete(namespace, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(()),
            Err(e) => Err(ProbeError::from_kube_error(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{ContainerState, ContainerStateWaiting, ContainerStatus, PodCondition, PodStatus};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn pod_with_phase(phase: &str) -> Pod {
        Pod {
            metadata: ObjectMeta::default(),
            status: Some(PodStatus {
                phase: Some(phase.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn pods_readiness_needs_at_least_one_pod() {
        let r = PodsReadiness { ready: 0, total: 0, any_failed: false };
        assert!(!r.is_ready());
    }

    #[test]
    fn pods_readiness_true_when_all_ready() {
        let r = PodsReadiness { ready: 2, total: 2, any_failed: false };
        assert!(r.is_ready());
    }

    #[test]
    fn pods_readiness_false_when_any_failed_even_if_counts_match() {
        let r = PodsReadiness { ready: 2, total: 2, any_failed: true };
        assert!(!r.is_ready());
    }

    #[test]
    fn detects_failed_phase_as_crashed() {
        assert!(pod_has_crashed(&pod_with_phase("Failed")));
        assert!(!pod_has_crashed(&pod_with_phase("Running")));
    }

    #[test]
    fn detects_crash_loop_waiting_reason() {
        let mut pod = pod_with_phase("Running");
        pod.status.as_mut().unwrap().container_statuses = Some(vec![ContainerStatus {
            restart_count: 1,
            state: Some(ContainerState {
                waiting: Some(ContainerStateWaiting {
                    reason: Some("CrashLoopBackOff".to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }]);
        assert!(pod_has_crashed(&pod));
    }

    #[test]
    fn pod_is_ready_reads_ready_condition() {
        let mut pod = pod_with_phase("Running");
        pod.status.as_mut().unwrap().conditions = Some(vec![PodCondition {
            type_: "Ready".to_string(),
            status: "True".to_string(),
            ..Default::default()
        }]);
        assert!(pod_is_ready(&pod));
    }
}
