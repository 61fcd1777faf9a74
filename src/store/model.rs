use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Closed set of supported storefront engines. `Medusa` is
/// accepted at this layer but may still be rejected by the Helm layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    Woocommerce,
    Medusa,
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Engine::Woocommerce => "woocommerce",
            Engine::Medusa => "medusa",
        };
        f.write_str(s)
    }
}

impl FromStr for Engine {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "woocommerce" => Ok(Engine::Woocommerce),
            "medusa" => Ok(Engine::Medusa),
            other => Err(format!("unknown engine {other:?}")),
        }
    }
}

/// The full status graph the Store Store enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StoreStatus {
    Provisioning,
    Ready,
    Failed,
    Deleting,
    Deleted,
}

impl StoreStatus {
    /// Whether `(self, next)` is an edge in the state machine.
    pub fn can_transition_to(self, next: StoreStatus) -> bool {
        use StoreStatus::*;
        matches!(
            (self, next),
            (Provisioning, Ready) | (Provisioning, Failed) | (Ready, Deleting) | (Failed, Deleting) | (Deleting, Deleted)
        )
    }
}

impl fmt::Display for StoreStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StoreStatus::Provisioning => "PROVISIONING",
            StoreStatus::Ready => "READY",
            StoreStatus::Failed => "FAILED",
            StoreStatus::Deleting => "DELETING",
            StoreStatus::Deleted => "DELETED",
        };
        f.write_str(s)
    }
}

impl FromStr for StoreStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PROVISIONING" => Ok(StoreStatus::Provisioning),
            "READY" => Ok(StoreStatus::Ready),
            "FAILED" => Ok(StoreStatus::Failed),
            "DELETING" => Ok(StoreStatus::Deleting),
            "DELETED" => Ok(StoreStatus::Deleted),
            other => Err(format!("unknown store status {other:?}")),
        }
    }
}

/// The one persisted entity. `admin_password` is write-only
/// from the API's perspective; see [`crate::api::dto::StoreResponse`] for
/// the redacted view actually returned to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Store {
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
    pub admin_password: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Store {
    pub fn namespace_for(id: &str) -> String {
        format!("store-{id}")
    }
}

/// Input to [`crate::store::StoreRepository::create`].
#[derive(Debug, Clone)]
pub struct NewStore {
    pub name: String,
    pub engine: Engine,
    pub admin_username: String,
    pub admin_email: String,
    pub admin_password: String,
}

/// A status mutation requested through
/// [`crate::store::StoreRepository::update_status`]. Each variant carries
/// exactly the fields its target status requires, so illegal
/// combinations (e.g. `Ready` without a URL) can't be constructed.
#[derive(Debug, Clone)]
pub enum StatusUpdate {
    Ready { store_url: String },
    Failed { reason: String },
    Deleting,
    Deleted,
}

impl StatusUpdate {
    pub fn target(&self) -> StoreStatus {
        match self {
            StatusUpdate::Ready { .. } => StoreStatus::Ready,
            StatusUpdate::Failed { .. } => StoreStatus::Failed,
            StatusUpdate::Deleting => StoreStatus::Deleting,
            StatusUpdate::Deleted => StoreStatus::Deleted,
        }
    }
}
