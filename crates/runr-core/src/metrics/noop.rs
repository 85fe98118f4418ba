use crate::{
    metrics::backend::{ExitOutcome, JobSource, MetricsBackend},
    network::JobPoll,
};

/// Metrics backend that records nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpMetrics;

impl MetricsBackend for NoOpMetrics {
    #[inline(always)]
    fn record_job_request(&self, _: JobSource, _: &JobPoll) {}

    #[inline(always)]
    fn record_store_op(&self, _: &'static str, _: bool) {}

    #[inline(always)]
    fn record_router_dial(&self, _: &str, _: bool) {}

    #[inline(always)]
    fn record_child_exit(&self, _: ExitOutcome) {}
}
