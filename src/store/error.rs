use thiserror::Error;

/// Error kinds for the Store Store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store not found")]
    NotFound,

    #[error("a non-deleted store named {0:?} already exists")]
    NameConflict(String),

    #[error("invalid store data: {0}")]
    Invalid(String),

    #[error("illegal status transition from {from} to {to}")]
    IllegalTransition { from: String, to: String },

    #[error("store backend error: {0}")]
    Backend(#[from] sqlx::Error),
}
