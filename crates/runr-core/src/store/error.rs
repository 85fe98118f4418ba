use std::{io, path::PathBuf};

use thiserror::Error;

use runr_model::ModelError;

/// Failures of a job store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store path is empty")]
    EmptyPath,

    #[error("unknown store type: {0}")]
    UnknownType(String),

    #[error("invalid store config: {0}")]
    InvalidConfig(#[from] ModelError),

    #[error("{op} {path}: {source}")]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("encode job {id}: {reason}")]
    Encode { id: u64, reason: String },

    #[error("store {op} task failed: {reason}")]
    Task { op: &'static str, reason: String },
}

impl StoreError {
    /// Wrap an I/O failure of `op` on `path`.
    pub fn io(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            op,
            path: path.into(),
            source,
        }
    }
}
