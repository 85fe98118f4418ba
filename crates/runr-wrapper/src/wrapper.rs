use std::{
    ffi::OsString,
    io,
    path::PathBuf,
    process::{ExitStatus, Stdio},
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};

use tokio::{process::Command, sync::mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use runr_core::{ExitOutcome, MetricsHandle, noop_metrics};

use crate::{
    callback::ShutdownCallback,
    config::WrapperConfig,
    error::WrapperError,
    signal::{Signal, SignalPlan, send_signal},
    status::Status,
};

#[derive(Default)]
struct Shared {
    pid: Option<u32>,
    status: Status,
    failure_reason: Option<String>,
    callback: Option<ShutdownCallback>,
}

impl Shared {
    /// Move forward to `next`; earlier states are ignored.
    fn advance(&mut self, next: Status) {
        if next > self.status {
            debug!(from = %self.status, to = %next, "wrapper status changed");
            self.status = next;
        }
    }
}

/// Runs one child process and turns control requests into signals.
///
/// The child inherits stdio. Status only moves forward:
/// unknown, running, in shutdown, stopped.
pub struct Wrapper {
    path: PathBuf,
    args: Vec<OsString>,
    termination_timeout: Duration,
    plan: SignalPlan,
    metrics: MetricsHandle,
    shared: RwLock<Shared>,
}

impl Wrapper {
    /// Wrapper for `path` run with `args`.
    ///
    /// Nothing is spawned until [`Wrapper::run`].
    pub fn new<I, A>(path: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<OsString>,
    {
        Self {
            path: path.into(),
            args: args.into_iter().map(Into::into).collect(),
            termination_timeout: WrapperConfig::default().termination_timeout(),
            plan: SignalPlan::native(),
            metrics: noop_metrics(),
            shared: RwLock::new(Shared::default()),
        }
    }

    /// Take the termination timeout from `config`.
    pub fn with_config(mut self, config: &WrapperConfig) -> Self {
        self.termination_timeout = config.termination_timeout();
        self
    }

    /// Time the child gets to exit after the forceful signal before shutdown
    /// fails with [`WrapperError::ProcessExitTimeout`].
    pub fn with_termination_timeout(mut self, timeout: Duration) -> Self {
        self.termination_timeout = timeout;
        self
    }

    /// Report child exits through `metrics`.
    pub fn with_metrics(mut self, metrics: MetricsHandle) -> Self {
        self.metrics = metrics;
        self
    }

    fn read(&self) -> RwLockReadGuard<'_, Shared> {
        self.shared.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Shared> {
        self.shared.write().unwrap_or_else(|p| p.into_inner())
    }

    /// Current status. Never moves backwards.
    pub fn status(&self) -> Status {
        self.read().status
    }

    /// Last fatal error, empty when there was none.
    pub fn failure_reason(&self) -> String {
        self.read().failure_reason.clone().unwrap_or_default()
    }

    /// Start the child and wait for it to exit or for `cancel`.
    ///
    /// A child that exits on its own, with any status, ends the run without
    /// error; a non-zero status is kept as the failure reason. On cancel the
    /// child is sent the forceful signal and given the termination timeout.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), WrapperError> {
        let mut cmd = Command::new(&self.path);
        cmd.args(&self.args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        debug!(path = %self.path.display(), args = ?self.args, "starting process");
        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(source) => {
                let err = WrapperError::StartFailed {
                    path: self.path.clone(),
                    source,
                };
                self.write().failure_reason = Some(err.to_string());
                self.metrics.record_child_exit(ExitOutcome::StartFailed);
                return Err(err);
            }
        };

        {
            let mut shared = self.write();
            shared.pid = child.id();
            shared.advance(Status::Running);
        }
        info!(pid = ?child.id(), path = %self.path.display(), "process started");

        let (tx, mut exited) = mpsc::channel(1);
        let waiter = tokio::spawn(async move {
            let _ = tx.send(child.wait().await).await;
        });

        let result = tokio::select! {
            res = exited.recv() => {
                self.on_exit(res).await;
                Ok(())
            }
            _ = cancel.cancelled() => self.terminate(&mut exited).await,
        };

        if result.is_err() {
            waiter.abort();
        } else if let Err(e) = waiter.await {
            debug!(error = %e, "process waiter ended abnormally");
        }
        result
    }

    async fn on_exit(&self, res: Option<io::Result<ExitStatus>>) {
        let failure = match &res {
            Some(Ok(status)) if status.success() => None,
            Some(Ok(status)) => Some(status.to_string()),
            Some(Err(e)) => Some(format!("waiting for process: {e}")),
            None => Some("process waiter stopped".to_string()),
        };
        info!(status = ?res, "wrapped process exited");
        self.metrics.record_child_exit(if failure.is_none() {
            ExitOutcome::Success
        } else {
            ExitOutcome::Failure
        });

        let callback = {
            let mut shared = self.write();
            shared.pid = None;
            if failure.is_some() {
                shared.failure_reason = failure;
            }
            shared.advance(Status::Stopped);
            shared.callback.take()
        };

        match callback {
            Some(cb) => cb.run().await,
            None => debug!("no shutdown callback registered"),
        }
    }

    async fn terminate(
        &self,
        exited: &mut mpsc::Receiver<io::Result<ExitStatus>>,
    ) -> Result<(), WrapperError> {
        info!("shutting down wrapped process");

        match self.forceful_signal().await {
            Ok(()) | Err(WrapperError::ProcessNotInitialized) => {}
            Err(e) => match exited.try_recv() {
                Ok(res) => {
                    self.on_exit(Some(res)).await;
                    return Ok(());
                }
                Err(_) => return Err(e),
            },
        }

        match tokio::time::timeout(self.termination_timeout, exited.recv()).await {
            Ok(res) => {
                self.on_exit(res).await;
                Ok(())
            }
            Err(_) => {
                warn!(timeout = ?self.termination_timeout, "wrapped process did not exit in time");
                self.metrics.record_child_exit(ExitOutcome::Timeout);
                Err(WrapperError::ProcessExitTimeout(self.termination_timeout))
            }
        }
    }

    fn signal(&self, pid: u32, signal: Signal) -> Result<(), WrapperError> {
        debug!(pid, signal = signal.as_str(), "sending signal");
        send_signal(pid, signal).map_err(|source| WrapperError::Signal {
            signal: signal.as_str(),
            pid,
            source,
        })
    }

    async fn forceful_signal(&self) -> Result<(), WrapperError> {
        let pid = self.read().pid.ok_or(WrapperError::ProcessNotInitialized)?;
        self.plan
            .forceful(|| self.status(), |signal| self.signal(pid, signal))
            .await
    }

    /// Ask the child to stop and remember `callback` for when it has.
    ///
    /// A no-op once shutdown is under way; the first callback registered wins.
    pub fn initiate_graceful_shutdown(
        &self,
        callback: Option<ShutdownCallback>,
    ) -> Result<(), WrapperError> {
        let callback = callback.filter(|c| !c.url.is_empty());
        let mut shared = self.write();

        match shared.status {
            Status::Unknown => return Err(WrapperError::ProcessNotInitialized),
            Status::Stopped => return Ok(()),
            Status::InShutdown => {
                if shared.callback.is_none() {
                    shared.callback = callback;
                }
                return Ok(());
            }
            Status::Running => {}
        }

        let pid = shared.pid.ok_or(WrapperError::ProcessNotInitialized)?;
        info!(pid, "initiating graceful shutdown");
        if let Some(cb) = callback {
            debug!(target_url = %cb.url, method = %cb.method, "registering shutdown callback");
            shared.callback.get_or_insert(cb);
        }

        self.signal(pid, self.plan.graceful())?;
        shared.advance(Status::InShutdown);
        Ok(())
    }

    /// Send the forceful signal sequence.
    pub async fn initiate_forceful_shutdown(&self) -> Result<(), WrapperError> {
        if self.status() == Status::Stopped {
            return Ok(());
        }
        info!("initiating forceful shutdown");
        self.forceful_signal().await?;
        self.write().advance(Status::InShutdown);
        Ok(())
    }
}
