use std::{io, path::PathBuf, time::Duration};

use thiserror::Error;

/// Errors of the wrapper, its server and its client.
#[derive(Debug, Error)]
pub enum WrapperError {
    #[error("process not initialized")]
    ProcessNotInitialized,

    #[error("failed to start process {path}: {source}")]
    StartFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not send {signal} to pid {pid}: {source}")]
    Signal {
        signal: &'static str,
        pid: u32,
        #[source]
        source: io::Error,
    },

    #[error("timed out after {0:?} waiting for process to exit")]
    ProcessExitTimeout(Duration),

    #[error("invalid control address {addr:?}: {reason}")]
    InvalidAddress { addr: String, reason: String },

    #[error("control plane {op} failed: {source}")]
    Io {
        op: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("control plane transport: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("control plane call: {0}")]
    Rpc(#[from] tonic::Status),
}
