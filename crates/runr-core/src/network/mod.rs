mod error;
pub use error::NetworkError;

mod poll;
pub use poll::JobPoll;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use runr_model::{JobRequest, RouterDiscovery, RunnerConfig, SessionInfo};

/// Upstream collaborator that hands out jobs.
///
/// Implementations must be cheap to share across tasks.
#[async_trait]
pub trait Network: Send + Sync + 'static {
    /// Ask for the next job. Never fails: problems map to [`JobPoll::NoJob`]
    /// (keep polling) or [`JobPoll::Unhealthy`] (back off).
    async fn request_job(
        &self,
        cancel: &CancellationToken,
        config: &RunnerConfig,
        session: Option<&SessionInfo>,
    ) -> JobPoll;

    /// Build the request body sent for `request_job`.
    fn prepare_job_request(
        &self,
        config: &RunnerConfig,
        session: Option<&SessionInfo>,
    ) -> JobRequest;

    /// Look up the job router. `Ok(None)` means no router is configured.
    async fn get_router_discovery(
        &self,
        cancel: &CancellationToken,
        config: &RunnerConfig,
    ) -> Result<Option<RouterDiscovery>, NetworkError>;
}
