use std::time::Duration;

use hyper_util::rt::TokioIo;
use tonic::transport::{Channel, Endpoint, Uri};
use tower::service_fn;
use tracing::debug;

use crate::{
    addr::ControlAddr,
    callback::ShutdownCallback,
    error::WrapperError,
    proto::{Empty, InitGracefulShutdownRequest, StatusResponse, process_wrapper_client::ProcessWrapperClient},
    status::{Status, status_from_wire},
};

/// Dial timeout used by [`WrapperClient::connect`].
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// What the wrapper reported back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub status: Status,
    /// Empty unless the wrapper hit a fatal error.
    pub failure_reason: String,
}

impl From<StatusResponse> for StatusReport {
    fn from(r: StatusResponse) -> Self {
        Self {
            status: status_from_wire(r.status),
            failure_reason: r.failure_reason,
        }
    }
}

/// Typed client for a wrapper control plane.
#[derive(Clone)]
pub struct WrapperClient {
    inner: ProcessWrapperClient<Channel>,
}

impl WrapperClient {
    /// Connect to `addr` with [`DEFAULT_CONNECT_TIMEOUT`].
    pub async fn connect(addr: &str) -> Result<Self, WrapperError> {
        Self::connect_with_timeout(addr, DEFAULT_CONNECT_TIMEOUT).await
    }

    /// Connect to a TCP or Unix socket address, waiting at most `timeout`.
    pub async fn connect_with_timeout(addr: &str, timeout: Duration) -> Result<Self, WrapperError> {
        let target = ControlAddr::parse(addr)?;
        debug!(target = %target, "connecting to wrapper");

        let channel = match target {
            ControlAddr::Tcp(hp) => {
                Endpoint::from_shared(format!("http://{hp}"))?
                    .connect_timeout(timeout)
                    .connect()
                    .await?
            }
            ControlAddr::Unix(path) => {
                // The URI is required by the endpoint but never dialed.
                Endpoint::from_static("http://[::]:50051")
                    .connect_timeout(timeout)
                    .connect_with_connector(service_fn(move |_: Uri| {
                        let path = path.clone();
                        async move { connect_unix(path).await }
                    }))
                    .await?
            }
        };

        Ok(Self {
            inner: ProcessWrapperClient::new(channel),
        })
    }

    /// Current status of the wrapped process.
    pub async fn check_status(&mut self) -> Result<StatusReport, WrapperError> {
        let resp = self.inner.check_status(Empty {}).await?;
        Ok(resp.into_inner().into())
    }

    /// Ask the process to stop, running `callback` once it has.
    pub async fn init_graceful_shutdown(
        &mut self,
        callback: Option<ShutdownCallback>,
    ) -> Result<StatusReport, WrapperError> {
        let req = InitGracefulShutdownRequest {
            shutdown_callback: callback.map(Into::into),
        };
        let resp = self.inner.init_graceful_shutdown(req).await?;
        Ok(resp.into_inner().into())
    }

    /// Escalate to the forceful signal right away.
    pub async fn init_forceful_shutdown(&mut self) -> Result<StatusReport, WrapperError> {
        let resp = self.inner.init_forceful_shutdown(Empty {}).await?;
        Ok(resp.into_inner().into())
    }
}

#[cfg(unix)]
async fn connect_unix(
    path: std::path::PathBuf,
) -> std::io::Result<TokioIo<tokio::net::UnixStream>> {
    Ok(TokioIo::new(tokio::net::UnixStream::connect(path).await?))
}

#[cfg(not(unix))]
async fn connect_unix(_path: std::path::PathBuf) -> std::io::Result<TokioIo<tokio::net::TcpStream>> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "unix sockets are not supported on this platform",
    ))
}
