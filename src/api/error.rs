use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::error;

use crate::store::{StoreError, StoreStatus};

use super::dto::ErrorResponse;

/// Translates Store Store errors into HTTP responses. The API
/// layer never reaches into the Worker for error handling — every terminal
/// outcome it sees comes back through a `StoreError`.
pub enum ApiError {
    Store(StoreError),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Store(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let ApiError::Store(err) = self;

        let (status, message) = match &err {
            StoreError::NotFound => (StatusCode::NOT_FOUND, err.to_string()),
            StoreError::NameConflict(_) => (StatusCode::CONFLICT, err.to_string()),
            StoreError::Invalid(_) => (StatusCode::BAD_REQUEST, err.to_string()),
            // A delete of an already-DELETED record is a legitimate client
            // conflict, not the programmer error other illegal
            // transitions represent.
            StoreError::IllegalTransition { from, .. } if from == &StoreStatus::Deleted.to_string() => {
                (StatusCode::CONFLICT, "store is already deleted".to_string())
            }
            StoreError::IllegalTransition { .. } => {
                error!(error = %err, "illegal transition reached the API layer");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
            StoreError::Backend(_) => {
                error!(error = %err, "store backend error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}
