pub mod task;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::helm::HelmExecutor;
use crate::kube_probe::KubernetesProbe;
use crate::store::StoreRepository;

/// Tunables for the Provisioning Worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub max_workers: usize,
    pub poll_interval: Duration,
    pub overall_timeout: Duration,
    pub base_domain: String,
    pub tls_enabled: bool,
}

impl WorkerConfig {
    pub fn store_scheme(&self) -> &'static str {
        if self.tls_enabled { "https" } else { "http" }
    }
}

#[derive(Debug, Clone, Copy)]
enum TaskKind {
    Install { skip_helm: bool },
    Delete,
}

/// Bounded-concurrency executor that drives a store from `PROVISIONING` or
/// `DELETING` to a terminal state. Cheap to `Clone`: every clone
/// shares the same permit pool, in-flight set and shutdown token, so the
/// API layer and the Recovery Controller can each hold their own handle.
#[derive(Clone)]
pub struct Worker {
    pub(crate) store: Arc<dyn StoreRepository>,
    pub(crate) helm: Arc<dyn HelmExecutor>,
    pub(crate) probe: Arc<dyn KubernetesProbe>,
    pub(crate) config: Arc<WorkerConfig>,
    permits: Arc<Semaphore>,
    in_flight: Arc<Mutex<HashSet<String>>>,
    pub(crate) shutdown: CancellationToken,
}

impl Worker {
    pub fn new(
        store: Arc<dyn StoreRepository>,
        helm: Arc<dyn HelmExecutor>,
        probe: Arc<dyn KubernetesProbe>,
        config: WorkerConfig,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_workers.max(1)));
        Worker {
            store,
            helm,
            probe,
            config: Arc::new(config),
            permits,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            shutdown: CancellationToken::new(),
        }
    }

    /// Signal every in-flight task to stop after its current poll tick
    /// and refuse new Helm invocations.
    pub fn begin_shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Submit a fresh `PROVISIONING` row: checks `release_exists` itself
    /// before deciding whether to call Helm.
    pub fn submit_install(&self, id: String) {
        self.spawn_task(id, TaskKind::Install { skip_helm: false });
    }

    /// Submit an install task that skips straight to the readiness poll
    /// loop — used by the Recovery Controller once it has already confirmed
    /// the Helm release exists.
    pub fn submit_resume(&self, id: String) {
        self.spawn_task(id, TaskKind::Install { skip_helm: true });
    }

    pub fn submit_delete(&self, id: String) {
        self.spawn_task(id, TaskKind::Delete);
    }

    fn spawn_task(&self, id: String, kind: TaskKind) {
        let worker = self.clone();
        tokio::spawn(async move { worker.run(id, kind).await });
    }

    async fn run(&self, id: String, kind: TaskKind) {
        if !self.claim(&id).await {
            return;
        }

        let permit = tokio::select! {
            permit = self.permits.acquire() => permit.ok(),
            _ = self.shutdown.cancelled() => None,
        };

        // `select!` can still pick the permit branch even after shutdown has
        // been signalled (both branches ready at once race pseudo-randomly),
        // so shutdown must be checked explicitly rather than inferred from
        // which branch of the select won.
        let Some(_permit) = permit else {
            self.release(&id).await;
            return;
        };
        if self.shutdown.is_cancelled() {
            self.release(&id).await;
            return;
        }

        let result = match kind {
            TaskKind::Install { skip_helm } => task::install_task(self, &id, skip_helm).await,
            TaskKind::Delete => task::delete_task(self, &id).await,
        };

        if let Err(e) = result {
            warn!(store_id = %id, error = %e, "worker task aborted on a store backend error");
        }

        self.release(&id).await;
    }

    /// At most one task per `id` may be active at a time.
    async fn claim(&self, id: &str) -> bool {
        self.in_flight.lock().await.insert(id.to_string())
    }

    async fn release(&self, id: &str) {
        self.in_flight.lock().await.remove(id);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex as StdMutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use crate::helm::{HelmError, HelmExecutor, InstallRequest};
    use crate::kube_probe::{JobStatus, KubernetesProbe, PodsReadiness, ProbeError};
    use crate::store::sqlite::SqliteStoreRepository;
    use crate::store::{Engine, NewStore, StatusUpdate, StoreRepository, StoreStatus};

    use super::task;
    use super::{Worker, WorkerConfig};

    struct FakeHelm {
        install_calls: AtomicUsize,
        install_result: StdMutex<Option<Result<(), HelmError>>>,
        release_exists: StdMutex<bool>,
        uninstall_result: StdMutex<Result<(), HelmError>>,
    }

    impl FakeHelm {
        fn new(release_exists: bool) -> Self {
            FakeHelm {
                install_calls: AtomicUsize::new(0),
                install_result: StdMutex::new(None),
                release_exists: StdMutex::new(release_exists),
                uninstall_result: StdMutex::new(Ok(())),
            }
        }

        fn with_failing_uninstall(release_exists: bool) -> Self {
            let helm = FakeHelm::new(release_exists);
            *helm.uninstall_result.lock().unwrap() = Err(HelmError::Failed("uninstall unavailable".to_string()));
            helm
        }
    }

    #[async_trait]
    impl HelmExecutor for FakeHelm {
        async fn install(&self, _request: &InstallRequest) -> Result<(), HelmError> {
            self.install_calls.fetch_add(1, Ordering::SeqCst);
            self.install_result.lock().unwrap().take().unwrap_or(Ok(()))
        }

        async fn uninstall(&self, _id: &str, _namespace: &str) -> Result<(), HelmError> {
            self.uninstall_result.lock().unwrap().clone()
        }

        async fn release_exists(&self, _id: &str, _namespace: &str) -> Result<bool, HelmError> {
            Ok(*self.release_exists.lock().unwrap())
        }
    }

    /// Blocks every `install` call on a shared `Notify` and records the peak
    /// number of calls in flight at once, so tests can assert a concurrency
    /// ceiling directly rather than inferring it from timing.
    struct BlockingHelm {
        active: AtomicUsize,
        max_observed: AtomicUsize,
        release: Notify,
    }

    impl BlockingHelm {
        fn new() -> Self {
            BlockingHelm { active: AtomicUsize::new(0), max_observed: AtomicUsize::new(0), release: Notify::new() }
        }
    }

    #[async_trait]
    impl HelmExecutor for BlockingHelm {
        async fn install(&self, _request: &InstallRequest) -> Result<(), HelmError> {
            let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_observed.fetch_max(active, Ordering::SeqCst);
            self.release.notified().await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }

        async fn uninstall(&self, _id: &str, _namespace: &str) -> Result<(), HelmError> {
            Ok(())
        }

        async fn release_exists(&self, _id: &str, _namespace: &str) -> Result<bool, HelmError> {
            Ok(false)
        }
    }

    struct FakeProbe {
        ready: StdMutex<bool>,
    }

    impl FakeProbe {
        fn new(ready: bool) -> Self {
            FakeProbe { ready: StdMutex::new(ready) }
        }
    }

    #[async_trait]
    impl KubernetesProbe for FakeProbe {
        async fn pods_ready(&self, _namespace: &str, _release_label: &str) -> Result<PodsReadiness, ProbeError> {
            let ready = *self.ready.lock().unwrap();
            Ok(PodsReadiness { ready: if ready { 1 } else { 0 }, total: 1, any_failed: false })
        }

        async fn job_status(&self, _namespace: &str, _job_name: &str) -> Result<JobStatus, ProbeError> {
            if *self.ready.lock().unwrap() {
                Ok(JobStatus::Succeeded)
            } else {
                Ok(JobStatus::Running)
            }
        }

        async fn ingress_host(&self, _namespace: &str, _release_label: &str) -> Result<Option<String>, ProbeError> {
            if *self.ready.lock().unwrap() {
                Ok(Some("shop.localhost".to_string()))
            } else {
                Ok(None)
            }
        }

        async fn namespace_exists(&self, _namespace: &str) -> Result<bool, ProbeError> {
            Ok(true)
        }

        async fn delete_namespace(&self, _namespace: &str) -> Result<(), ProbeError> {
            Ok(())
        }
    }

    async fn new_store_repo() -> Arc<SqliteStoreRepository> {
        Arc::new(SqliteStoreRepository::in_memory().await)
    }

    fn fast_config() -> WorkerConfig {
        WorkerConfig {
            max_workers: 5,
            poll_interval: Duration::from_millis(10),
            overall_timeout: Duration::from_millis(150),
            base_domain: "localhost".to_string(),
            tls_enabled: false,
        }
    }

    fn store_input(name: &str) -> NewStore {
        NewStore {
            name: name.to_string(),
            engine: Engine::Woocommerce,
            admin_username: "admin".to_string(),
            admin_email: "admin@example.com".to_string(),
            admin_password: "pw12345678".to_string(),
        }
    }

    fn new_store_input() -> NewStore {
        store_input("shop")
    }

    #[tokio::test]
    async fn install_task_converges_to_ready_and_calls_helm_once() {
        let store = new_store_repo().await;
        let record = store.create(new_store_input()).await.unwrap();

        let helm = Arc::new(FakeHelm::new(false));
        let probe = Arc::new(FakeProbe::new(true));
        let worker = Worker::new(store.clone(), helm.clone(), probe, fast_config());

        task::install_task(&worker, &record.id, false).await.unwrap();

        let updated = store.get(&record.id).await.unwrap();
        assert_eq!(updated.status, StoreStatus::Ready);
        assert_eq!(updated.store_url.as_deref(), Some("http://shop.localhost"));
        assert_eq!(helm.install_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn install_task_skips_helm_when_resuming() {
        let store = new_store_repo().await;
        let record = store.create(new_store_input()).await.unwrap();

        let helm = Arc::new(FakeHelm::new(true));
        let probe = Arc::new(FakeProbe::new(true));
        let worker = Worker::new(store.clone(), helm.clone(), probe, fast_config());

        task::install_task(&worker, &record.id, true).await.unwrap();

        let updated = store.get(&record.id).await.unwrap();
        assert_eq!(updated.status, StoreStatus::Ready);
        assert_eq!(helm.install_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn install_task_fails_with_timeout_reason_when_never_ready() {
        let store = new_store_repo().await;
        let record = store.create(new_store_input()).await.unwrap();

        let helm = Arc::new(FakeHelm::new(false));
        let probe = Arc::new(FakeProbe::new(false));
        let worker = Worker::new(store.clone(), helm, probe, fast_config());

        task::install_task(&worker, &record.id, false).await.unwrap();

        let updated = store.get(&record.id).await.unwrap();
        assert_eq!(updated.status, StoreStatus::Failed);
        assert_eq!(updated.failure_reason.as_deref(), Some("Provisioning timed out"));
    }

    #[tokio::test]
    async fn install_task_abandons_when_no_longer_provisioning() {
        let store = new_store_repo().await;
        let record = store.create(new_store_input()).await.unwrap();
        store
            .update_status(&record.id, StatusUpdate::Ready { store_url: "http://shop.localhost".to_string() })
            .await
            .unwrap();

        let helm = Arc::new(FakeHelm::new(false));
        let probe = Arc::new(FakeProbe::new(true));
        let worker = Worker::new(store.clone(), helm.clone(), probe, fast_config());

        task::install_task(&worker, &record.id, false).await.unwrap();

        assert_eq!(helm.install_calls.load(Ordering::SeqCst), 0);
        let unchanged = store.get(&record.id).await.unwrap();
        assert_eq!(unchanged.status, StoreStatus::Ready);
    }

    #[tokio::test]
    async fn delete_task_converges_to_deleted() {
        let store = new_store_repo().await;
        let record = store.create(new_store_input()).await.unwrap();
        store
            .update_status(&record.id, StatusUpdate::Ready { store_url: "http://shop.localhost".to_string() })
            .await
            .unwrap();
        store.update_status(&record.id, StatusUpdate::Deleting).await.unwrap();

        let helm = Arc::new(FakeHelm::new(true));
        let probe = Arc::new(FakeProbe::new(true));
        let worker = Worker::new(store.clone(), helm, probe, fast_config());

        task::delete_task(&worker, &record.id).await.unwrap();

        let updated = store.get(&record.id).await.unwrap();
        assert_eq!(updated.status, StoreStatus::Deleted);
    }

    #[tokio::test]
    async fn delete_task_abandons_when_not_deleting() {
        let store = new_store_repo().await;
        let record = store.create(new_store_input()).await.unwrap();

        let helm = Arc::new(FakeHelm::new(true));
        let probe = Arc::new(FakeProbe::new(true));
        let worker = Worker::new(store.clone(), helm, probe, fast_config());

        task::delete_task(&worker, &record.id).await.unwrap();

        let unchanged = store.get(&record.id).await.unwrap();
        assert_eq!(unchanged.status, StoreStatus::Provisioning);
    }

    #[tokio::test]
    async fn submit_install_drives_record_to_ready_through_the_public_api() {
        let store = new_store_repo().await;
        let record = store.create(new_store_input()).await.unwrap();

        let helm = Arc::new(FakeHelm::new(false));
        let probe = Arc::new(FakeProbe::new(true));
        let worker = Worker::new(store.clone(), helm, probe, fast_config());

        worker.submit_install(record.id.clone());

        let mut attempts = 0;
        loop {
            let current = store.get(&record.id).await.unwrap();
            if current.status != StoreStatus::Provisioning || attempts > 50 {
                assert_eq!(current.status, StoreStatus::Ready);
                break;
            }
            attempts += 1;
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn concurrent_installs_never_exceed_configured_max_workers() {
        let store = new_store_repo().await;
        let max_workers = 2;
        let mut ids = Vec::new();
        for i in 0..5 {
            let record = store.create(store_input(&format!("shop{i}"))).await.unwrap();
            ids.push(record.id);
        }

        let helm = Arc::new(BlockingHelm::new());
        let probe = Arc::new(FakeProbe::new(true));
        let config = WorkerConfig {
            max_workers,
            poll_interval: Duration::from_millis(10),
            overall_timeout: Duration::from_millis(500),
            base_domain: "localhost".to_string(),
            tls_enabled: false,
        };
        let worker = Worker::new(store.clone(), helm.clone(), probe, config);

        for id in &ids {
            worker.submit_install(id.clone());
        }

        // Give every spawned task a chance to either enter `install` (and
        // block there) or queue on the semaphore.
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(helm.active.load(Ordering::SeqCst), max_workers);
        assert!(helm.max_observed.load(Ordering::SeqCst) <= max_workers);

        helm.release.notify_waiters();
    }

    #[tokio::test]
    async fn shutdown_leaves_install_in_flight_record_provisioning() {
        let store = new_store_repo().await;
        let record = store.create(new_store_input()).await.unwrap();

        let helm = Arc::new(FakeHelm::new(false));
        let probe = Arc::new(FakeProbe::new(false));
        let worker = Worker::new(store.clone(), helm, probe, fast_config());

        worker.submit_install(record.id.clone());
        tokio::time::sleep(Duration::from_millis(20)).await;
        worker.begin_shutdown();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let current = store.get(&record.id).await.unwrap();
        assert_eq!(current.status, StoreStatus::Provisioning);
    }

    #[tokio::test]
    async fn shutdown_leaves_delete_in_flight_record_deleting() {
        let store = new_store_repo().await;
        let record = store.create(new_store_input()).await.unwrap();
        store
            .update_status(&record.id, StatusUpdate::Ready { store_url: "http://shop.localhost".to_string() })
            .await
            .unwrap();
        store.update_status(&record.id, StatusUpdate::Deleting).await.unwrap();

        let helm = Arc::new(FakeHelm::with_failing_uninstall(true));
        let probe = Arc::new(FakeProbe::new(true));
        let worker = Worker::new(store.clone(), helm, probe, fast_config());

        worker.submit_delete(record.id.clone());
        tokio::time::sleep(Duration::from_millis(5)).await;
        worker.begin_shutdown();
        tokio::time::sleep(Duration::from_millis(30)).await;

        let current = store.get(&record.id).await.unwrap();
        assert_eq!(current.status, StoreStatus::Deleting);
    }
}
