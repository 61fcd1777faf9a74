use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::{Engine, Store, StoreStatus};

/// Inbound creation payload. `admin_password` is moved straight
/// into [`crate::store::NewStore`] and never echoed back.
#[derive(Debug, Deserialize)]
pub struct CreateStoreRequest {
    pub name: String,
    pub engine: Engine,
    pub admin_username: String,
    pub admin_email: String,
    pub admin_password: String,
}

/// Store representation returned to clients. `admin_password` has no field
/// here at all, rather than being blanked out, so it cannot leak through a
/// serialization bug.
#[derive(Debug, Serialize)]
pub struct StoreResponse {
    pub id: String,
    pub name: String,
    pub engine: Engine,
    pub namespace: String,
    pub helm_release: String,
    pub status: StoreStatus,
    pub store_url: Option<String>,
    pub failure_reason: Option<String>,
    pub admin_username: String,
    pub admin_email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Store> for StoreResponse {
    fn from(store: Store) -> Self {
        StoreResponse {
            id: store.id,
            name: store.name,
            engine: store.engine,
            namespace: store.namespace,
            helm_release: store.helm_release,
            status: store.status,
            store_url: store.store_url,
            failure_reason: store.failure_reason,
            admin_username: store.admin_username,
            admin_email: store.admin_email,
            created_at: store.created_at,
            updated_at: store.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StoreListResponse {
    pub stores: Vec<StoreResponse>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

impl HealthResponse {
    pub fn healthy() -> Self {
        HealthResponse { status: "healthy" }
    }

    pub fn unhealthy() -> Self {
        HealthResponse { status: "unhealthy" }
    }
}

#[derive(Debug, Serialize)]
pub struct DeleteAcceptedResponse {
    pub id: String,
    pub status: StoreStatus,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
