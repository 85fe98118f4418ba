use std::{io, path::PathBuf};

use thiserror::Error;

/// Failures while preparing or dialing a router connection.
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("invalid router url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("unsupported scheme {scheme:?} in router url {url:?}")]
    UnsupportedScheme { url: String, scheme: String },

    #[error("runner token is not a valid header value")]
    InvalidToken,

    #[error("invalid user agent {0:?}")]
    InvalidUserAgent(String),

    #[error("{op} {path}: {source}")]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("tls material {path}: {reason}")]
    Tls { path: PathBuf, reason: String },

    #[error("tls setup: {0}")]
    TlsConfig(#[from] rustls::Error),

    #[error("router transport: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("connection pool has been shut down")]
    PoolClosed,
}

impl RouterError {
    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            op,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn tls(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Tls {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
