use std::sync::Arc;

use crate::network::JobPoll;

/// Where a job request was answered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobSource {
    /// Resumed from the local job store.
    Store,
    /// Served by a discovered job router.
    Router,
    /// Served by the default network collaborator.
    Network,
}

impl JobSource {
    /// Stable label value for metrics.
    #[inline]
    pub fn as_label(&self) -> &'static str {
        match self {
            JobSource::Store => "store",
            JobSource::Router => "router",
            JobSource::Network => "network",
        }
    }
}

/// How a wrapped child process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    Success,
    Failure,
    StartFailed,
    Timeout,
}

impl ExitOutcome {
    #[inline]
    pub fn as_label(&self) -> &'static str {
        match self {
            ExitOutcome::Success => "success",
            ExitOutcome::Failure => "failure",
            ExitOutcome::StartFailed => "start_failed",
            ExitOutcome::Timeout => "timeout",
        }
    }
}

/// Backend metrics collection interface.
pub trait MetricsBackend: Send + Sync + 'static {
    /// Record the outcome of one job request tick.
    fn record_job_request(&self, source: JobSource, poll: &JobPoll);
    /// Record one store operation (`request`, `list`, `update`, `remove`).
    fn record_store_op(&self, op: &'static str, ok: bool);
    /// Record a router connection attempt by URL scheme.
    fn record_router_dial(&self, scheme: &str, ok: bool);
    /// Record the end of a wrapped process.
    fn record_child_exit(&self, outcome: ExitOutcome);
}

/// Shared handle to a metrics backend.
pub type MetricsHandle = Arc<dyn MetricsBackend>;
