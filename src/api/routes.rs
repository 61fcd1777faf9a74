use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};

use crate::store::{NewStore, StatusUpdate, StoreRepository};
use crate::worker::Worker;

use super::dto::{CreateStoreRequest, DeleteAcceptedResponse, HealthResponse, StoreListResponse, StoreResponse};
use super::error::ApiError;

/// Everything a handler needs, constructed once in the composition root.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn StoreRepository>,
    pub worker: Worker,
}

/// The `/api/v1` surface.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/stores", get(list_stores).post(create_store))
        .route("/stores/{id}", get(get_store).delete(delete_store))
        .with_state(state)
}

/// Reports `unhealthy` (but still 200, since the endpoint itself is up)
/// when the database is unreachable — the one dependency this layer can
/// check synchronously without touching Helm or Kubernetes.
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    match state.store.ping().await {
        Ok(()) => Json(HealthResponse::healthy()),
        Err(_) => Json(HealthResponse::unhealthy()),
    }
}

async fn list_stores(State(state): State<AppState>) -> Result<Json<StoreListResponse>, ApiError> {
    let stores = state.store.list().await?;
    Ok(Json(StoreListResponse {
        stores: stores.into_iter().map(StoreResponse::from).collect(),
    }))
}

async fn get_store(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<StoreResponse>, ApiError> {
    let store = state.store.get(&id).await?;
    Ok(Json(store.into()))
}

async fn create_store(
    State(state): State<AppState>,
    Json(request): Json<CreateStoreRequest>,
) -> Result<(StatusCode, Json<StoreResponse>), ApiError> {
    let created = state
        .store
        .create(NewStore {
            name: request.name,
            engine: request.engine,
            admin_username: request.admin_username,
            admin_email: request.admin_email,
            admin_password: request.admin_password,
        })
        .await?;

    state.worker.submit_install(created.id.clone());

    Ok((StatusCode::ACCEPTED, Json(created.into())))
}

async fn delete_store(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<DeleteAcceptedResponse>), ApiError> {
    let updated = state.store.update_status(&id, StatusUpdate::Deleting).await?;
    state.worker.submit_delete(updated.id.clone());

    Ok((
        StatusCode::ACCEPTED,
        Json(DeleteAcceptedResponse { id: updated.id, status: updated.status }),
    ))
}
