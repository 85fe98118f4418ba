use thiserror::Error;

use crate::{network::NetworkError, store::StoreError};

/// Failures surfaced by the job manager.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("network error: {0}")]
    Network(#[from] NetworkError),

    #[error("no job is associated with this manager")]
    NoActiveJob,
}
