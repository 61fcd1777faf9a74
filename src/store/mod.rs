pub mod error;
pub mod model;
pub mod sqlite;

pub use error::StoreError;
pub use model::{Engine, NewStore, StatusUpdate, Store, StoreStatus};

use async_trait::async_trait;

/// The Store Store: durable CRUD, unique-name enforcement and
/// status transitions, exclusively owning persistence for the Store Record.
#[async_trait]
pub trait StoreRepository: Send + Sync {
    async fn create(&self, input: NewStore) -> Result<Store, StoreError>;

    async fn get(&self, id: &str) -> Result<Store, StoreError>;

    async fn list(&self) -> Result<Vec<Store>, StoreError>;

    async fn update_status(&self, id: &str, update: StatusUpdate) -> Result<Store, StoreError>;

    /// Rows where `status ∈ {PROVISIONING, DELETING}` — used only by the
    /// Recovery Controller.
    async fn list_non_terminal(&self) -> Result<Vec<Store>, StoreError>;

    /// Cheap liveness check for the `/health` endpoint.
    async fn ping(&self) -> Result<(), StoreError>;
}
