use thiserror::Error;

use crate::{MAX_BATCH_OPS, MAX_IN_VALUES};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{collection}/{id} not found")]
    NotFound { collection: &'static str, id: String },

    #[error("batch of {0} operations exceeds the limit of {MAX_BATCH_OPS}")]
    BatchTooLarge(usize),

    #[error("'in' query with {0} values exceeds the limit of {MAX_IN_VALUES}")]
    InQueryTooLarge(usize),

    #[error("DB lock poisoned: {0}")]
    LockPoisoned(String),

    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("malformed document field: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    pub fn not_found(collection: &'static str, id: &str) -> Self {
        Self::NotFound {
            collection,
            id: id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
