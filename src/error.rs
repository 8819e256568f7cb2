use thiserror::Error;

use crate::keys::RandomUnavailable;
use crate::object_store::ObjectStoreError;
use crate::storage::DatabaseError;

/// Errors surfaced by the upload coordinator and the request guard.
#[derive(Debug, Error)]
pub enum Error {
    /// Bad input the caller can fix; the message is shown as-is.
    #[error("{0}")]
    Validation(String),
    #[error("File has expired")]
    Expired,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(String),
    #[error("Storage unavailable: {0}")]
    BackendUnavailable(String),
    #[error("Too many requests")]
    RateLimited,
    #[error("Too many failed attempts, try again later")]
    LockedOut,
    #[error("Database error: {0}")]
    Database(DatabaseError),
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl From<DatabaseError> for Error {
    fn from(e: DatabaseError) -> Self {
        match e {
            DatabaseError::InvalidTransition { .. }
            | DatabaseError::ShortCodeTaken(_)
            | DatabaseError::StorageKeyTaken(_) => Error::Conflict(e.to_string()),
            other => Error::Database(other),
        }
    }
}

impl From<ObjectStoreError> for Error {
    fn from(e: ObjectStoreError) -> Self {
        Error::BackendUnavailable(e.to_string())
    }
}

impl From<RandomUnavailable> for Error {
    fn from(e: RandomUnavailable) -> Self {
        Error::Internal(e.to_string())
    }
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }

    pub fn storage_not_configured() -> Self {
        Error::BackendUnavailable("storage is not configured".to_string())
    }
}
