use std::sync::Arc;

use tracing::{info, warn};

use crate::helm::HelmExecutor;
use crate::store::{Store, StoreRepository, StoreStatus};
use crate::worker::Worker;

/// Reconciles persisted intent against cluster reality on process start.
/// Runs once, before the API starts accepting traffic; this
/// is the sole mechanism that makes provisioning idempotent across crashes.
pub struct RecoveryController {
    store: Arc<dyn StoreRepository>,
    helm: Arc<dyn HelmExecutor>,
    worker: Worker,
}

impl RecoveryController {
    pub fn new(store: Arc<dyn StoreRepository>, helm: Arc<dyn HelmExecutor>, worker: Worker) -> Self {
        RecoveryController { store, helm, worker }
    }

    pub async fn run(&self) {
        let rows = match self.store.list_non_terminal().await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(error = %e, "recovery could not list non-terminal stores, starting with none resumed");
                return;
            }
        };

        info!(count = rows.len(), "recovering non-terminal stores");

        for store in rows {
            match store.status {
                StoreStatus::Provisioning => self.recover_provisioning(&store).await,
                StoreStatus::Deleting => {
                    info!(store_id = %store.id, "resuming delete");
                    self.worker.submit_delete(store.id.clone());
                }
                other => warn!(store_id = %store.id, status = %other, "list_non_terminal returned an unexpected status"),
            }
        }
    }

    async fn recover_provisioning(&self, store: &Store) {
        match self.helm.release_exists(&store.id, &store.namespace).await {
            Ok(true) => {
                info!(store_id = %store.id, "release already exists, resuming readiness poll without reinstalling");
                self.worker.submit_resume(store.id.clone());
            }
            Ok(false) => {
                info!(store_id = %store.id, "no existing release found, submitting full install");
                self.worker.submit_install(store.id.clone());
            }
            Err(e) => {
                // Cluster/Helm unavailability is not a store-level failure:
                // leave the row in PROVISIONING for the next recovery pass
                // rather than marking it FAILED.
                warn!(store_id = %store.id, error = %e, "could not confirm release existence, deferring this store");
            }
        }
    }
}
