use std::{net::SocketAddr, sync::Arc};

use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status as RpcStatus, transport::Server};
use tracing::{debug, info};

use crate::{
    addr::ControlAddr,
    callback::ShutdownCallback,
    error::WrapperError,
    proto::{
        Empty, InitGracefulShutdownRequest, StatusResponse, WireStatus,
        process_wrapper_server::{ProcessWrapper, ProcessWrapperServer},
    },
    wrapper::Wrapper,
};

/// gRPC face of a [`Wrapper`].
pub struct ControlService {
    wrapper: Arc<Wrapper>,
}

impl ControlService {
    /// Control plane for `wrapper`.
    pub fn new(wrapper: Arc<Wrapper>) -> Self {
        Self { wrapper }
    }

    /// Service ready to be added to a tonic router.
    pub fn into_server(self) -> ProcessWrapperServer<Self> {
        ProcessWrapperServer::new(self)
    }

    fn report(&self) -> StatusResponse {
        StatusResponse {
            status: WireStatus::from(self.wrapper.status()) as i32,
            failure_reason: self.wrapper.failure_reason(),
        }
    }

    /// A request that came before the child started is answered with the
    /// current status instead of an error.
    fn respond(&self, res: Result<(), WrapperError>) -> Result<Response<StatusResponse>, RpcStatus> {
        match res {
            Ok(()) | Err(WrapperError::ProcessNotInitialized) => Ok(Response::new(self.report())),
            Err(e) => Err(RpcStatus::internal(e.to_string())),
        }
    }
}

#[tonic::async_trait]
impl ProcessWrapper for ControlService {
    async fn check_status(
        &self,
        _request: Request<Empty>,
    ) -> Result<Response<StatusResponse>, RpcStatus> {
        debug!("check status requested");
        Ok(Response::new(self.report()))
    }

    async fn init_graceful_shutdown(
        &self,
        request: Request<InitGracefulShutdownRequest>,
    ) -> Result<Response<StatusResponse>, RpcStatus> {
        let callback = request
            .into_inner()
            .shutdown_callback
            .map(ShutdownCallback::from);
        debug!(with_callback = callback.is_some(), "graceful shutdown requested");
        let res = self.wrapper.initiate_graceful_shutdown(callback);
        self.respond(res)
    }

    async fn init_forceful_shutdown(
        &self,
        _request: Request<Empty>,
    ) -> Result<Response<StatusResponse>, RpcStatus> {
        debug!("forceful shutdown requested");
        let res = self.wrapper.initiate_forceful_shutdown().await;
        self.respond(res)
    }
}

/// A bound control-plane listener.
pub enum ControlListener {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(tokio::net::UnixListener),
}

impl ControlListener {
    /// Bind `addr`. A stale unix socket file at the path is replaced.
    pub async fn bind(addr: &ControlAddr) -> Result<Self, WrapperError> {
        match addr {
            ControlAddr::Tcp(hp) => TcpListener::bind(hp.as_str())
                .await
                .map(ControlListener::Tcp)
                .map_err(|source| WrapperError::Io { op: "bind", source }),
            #[cfg(unix)]
            ControlAddr::Unix(path) => {
                match std::fs::remove_file(path) {
                    Ok(()) => debug!(path = %path.display(), "removed stale control socket"),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(source) => return Err(WrapperError::Io { op: "remove socket", source }),
                }
                tokio::net::UnixListener::bind(path)
                    .map(ControlListener::Unix)
                    .map_err(|source| WrapperError::Io { op: "bind", source })
            }
            #[cfg(not(unix))]
            ControlAddr::Unix(_) => Err(WrapperError::InvalidAddress {
                addr: addr.to_string(),
                reason: "unix sockets are not supported on this platform".into(),
            }),
        }
    }

    /// Local TCP address, if this is a TCP listener.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match self {
            ControlListener::Tcp(l) => l.local_addr().ok(),
            #[cfg(unix)]
            ControlListener::Unix(_) => None,
        }
    }
}

/// Serve the control plane for `wrapper` until `shutdown` fires.
pub async fn serve(
    listener: ControlListener,
    wrapper: Arc<Wrapper>,
    shutdown: CancellationToken,
) -> Result<(), WrapperError> {
    let service = ControlService::new(wrapper).into_server();
    let router = Server::builder().add_service(service);
    info!("wrapper control plane started");

    match listener {
        ControlListener::Tcp(l) => {
            router
                .serve_with_incoming_shutdown(TcpListenerStream::new(l), shutdown.cancelled())
                .await?
        }
        #[cfg(unix)]
        ControlListener::Unix(l) => {
            router
                .serve_with_incoming_shutdown(
                    tokio_stream::wrappers::UnixListenerStream::new(l),
                    shutdown.cancelled(),
                )
                .await?
        }
    }

    info!("wrapper control plane stopped");
    Ok(())
}
