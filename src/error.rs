//! Errors shared by the storage collaborators.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

/// Failure of an authoritative store (accounts, tokens, directories).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store call exceeded deadline of {0:?}")]
    Timeout(Duration),

    #[error("duplicate key: {0}")]
    Conflict(String),
}

/// Run a store call under a deadline.
pub async fn with_deadline<T, F>(deadline: Duration, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(deadline, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(deadline)),
    }
}
