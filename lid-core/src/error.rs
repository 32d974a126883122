use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Errors surfaced by every `LockService` call.
///
/// `Forbidden`, `BadRequest` and `NotFound` are ordinary outcomes the caller is
/// expected to branch on. `Infrastructure` means the operation did not happen.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("forbidden: lock is held by another signee")]
    Forbidden,
    #[error("lock not found")]
    NotFound,
    #[error(transparent)]
    Infrastructure(#[from] InfraError),
}

impl LockError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LockError::BadRequest(_) => ErrorKind::BadRequest,
            LockError::Forbidden => ErrorKind::Forbidden,
            LockError::NotFound => ErrorKind::NotFound,
            LockError::Infrastructure(_) => ErrorKind::Infrastructure,
        }
    }
}

impl From<StoreError> for LockError {
    fn from(err: StoreError) -> Self {
        LockError::Infrastructure(InfraError::Store(err))
    }
}

/// Stable, comparable error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    BadRequest,
    Forbidden,
    NotFound,
    Infrastructure,
}

#[derive(Debug, thiserror::Error)]
pub enum InfraError {
    #[error("a store handle is required")]
    MissingStore,
    #[error("a table name is required")]
    MissingTable,
    #[error("a non-zero lease duration is required")]
    MissingDuration,
    #[error("timed out after {0:?} waiting for table '{1}'")]
    Timeout(Duration, String),
    #[error(transparent)]
    Store(StoreError),
}

/// Errors at the conditional-store boundary.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The write's condition did not hold; nothing was changed.
    #[error("condition failed")]
    ConditionFailed,
    #[error("invalid table name '{0}'")]
    InvalidTable(String),
    #[error("table '{0}' does not exist")]
    TableNotFound(String),
    #[error("store unavailable: {0}")]
    Unavailable(#[source] Box<dyn std::error::Error + Send + Sync>),
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Unavailable(Box::new(err))
    }
}
