use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tonic::{Code, Request, Status, metadata::MetadataValue};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use runr_core::{JobPoll, JobSource, MetricsHandle, Network, NetworkError, noop_metrics};
use runr_model::{JobRequest, JobResponse, RouterDiscovery, RunnerConfig, SessionInfo};

use crate::{
    config::RouterClientConfig,
    pool::{ConnPool, Lease},
    proto::GetJobRequest,
    target::DialTarget,
};

/// Metadata key carrying the request correlation id, both directions.
pub const REQUEST_ID_KEY: &str = "x-request-id";

struct CachedDiscovery {
    record: Option<RouterDiscovery>,
    /// `None` when the TTL does not fit in an `Instant`.
    expires_at: Option<Instant>,
}

impl CachedDiscovery {
    fn is_fresh(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|t| t > now)
    }
}

/// [`Network`] that serves job requests from a discovered job router and
/// delegates everything else, including requests while no router is
/// known, to another network.
pub struct RouterClient {
    delegate: Arc<dyn Network>,
    pool: ConnPool,
    discovery_ttl: Duration,
    discovery: Mutex<Option<CachedDiscovery>>,
    metrics: MetricsHandle,
}

impl RouterClient {
    /// Client that falls back to `delegate` whenever the router is unusable.
    pub fn new(delegate: Arc<dyn Network>, config: RouterClientConfig) -> Self {
        Self {
            delegate,
            discovery_ttl: config.discovery_ttl(),
            pool: ConnPool::new(config),
            discovery: Mutex::new(None),
            metrics: noop_metrics(),
        }
    }

    /// Report pool and request outcomes through `metrics`.
    pub fn with_metrics(mut self, metrics: MetricsHandle) -> Self {
        self.pool = self.pool.with_metrics(Arc::clone(&metrics));
        self.metrics = metrics;
        self
    }

    /// The connection pool, exposed for inspection.
    #[inline]
    pub fn pool(&self) -> &ConnPool {
        &self.pool
    }

    /// Close pooled connections now. Calls in flight end as cancelled,
    /// which callers see as [`JobPoll::NoJob`].
    pub fn shutdown(&self) {
        self.pool.shutdown();
    }

    /// Cached discovery record; refreshed once the TTL has passed.
    /// Lookup failures are not cached.
    async fn router_discovery(
        &self,
        cancel: &CancellationToken,
        config: &RunnerConfig,
    ) -> Option<RouterDiscovery> {
        let mut cache = self.discovery.lock().await;
        if let Some(cached) = cache.as_ref().filter(|c| c.is_fresh(Instant::now())) {
            return cached.record.clone();
        }

        match self.delegate.get_router_discovery(cancel, config).await {
            Ok(record) => {
                match &record {
                    Some(d) => info!(router = %d.server_url, "using job router"),
                    None => debug!("no job router configured"),
                }
                *cache = Some(CachedDiscovery {
                    record: record.clone(),
                    expires_at: Instant::now().checked_add(self.discovery_ttl),
                });
                record
            }
            Err(e) => {
                warn!(error = %e, "job router discovery failed");
                None
            }
        }
    }

    async fn get_job(
        &self,
        cancel: &CancellationToken,
        lease: &Lease,
        request: &JobRequest,
        discovery: &RouterDiscovery,
    ) -> JobPoll {
        let body = match serde_json::to_vec(request) {
            Ok(body) => body,
            Err(e) => {
                error!(error = %e, "failed to encode job request");
                return JobPoll::Unhealthy;
            }
        };

        let correlation_id = Uuid::new_v4().to_string();
        let mut req = Request::new(GetJobRequest { job_request: body });
        if let Ok(v) = MetadataValue::try_from(correlation_id.as_str()) {
            req.metadata_mut().insert(REQUEST_ID_KEY, v);
        }

        let mut client = lease.client();
        let result = tokio::select! {
            r = client.get_job(req) => r,
            _ = cancel.cancelled() => Err(Status::cancelled("job request canceled")),
            _ = lease.closed() => Err(Status::cancelled("router connection closed")),
        };
        let resp = match result {
            Ok(resp) => resp,
            Err(status) => return poll_for_status(&status),
        };

        let (metadata, body, _) = resp.into_parts();
        if body.job_response.is_empty() {
            debug!(conn = lease.conn_id(), "router has no job");
            return JobPoll::NoJob;
        }

        let mut job: JobResponse = match serde_json::from_slice(&body.job_response) {
            Ok(job) => job,
            Err(e) => {
                error!(error = %e, "failed to decode job from router");
                return JobPoll::Unhealthy;
            }
        };
        job.tls_data = discovery.tls_data.clone();
        job.correlation_id = metadata
            .get(REQUEST_ID_KEY)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap_or(correlation_id);

        info!(job = job.id, correlation_id = %job.correlation_id, "received job from router");
        JobPoll::Job(Box::new(job))
    }
}

/// Map a failed router call onto a poll outcome.
pub(crate) fn poll_for_status(status: &Status) -> JobPoll {
    match status.code() {
        Code::DeadlineExceeded | Code::Cancelled | Code::Unavailable => {
            debug!(code = ?status.code(), message = status.message(), "router call interrupted");
            JobPoll::NoJob
        }
        code => {
            warn!(code = ?code, message = status.message(), "router call failed");
            JobPoll::Unhealthy
        }
    }
}

#[async_trait]
impl Network for RouterClient {
    async fn request_job(
        &self,
        cancel: &CancellationToken,
        config: &RunnerConfig,
        session: Option<&SessionInfo>,
    ) -> JobPoll {
        let Some(discovery) = self.router_discovery(cancel, config).await else {
            return self.delegate.request_job(cancel, config, session).await;
        };

        let target = DialTarget::for_runner(&discovery.server_url, config);
        let lease = match self.pool.dial(target) {
            Ok(lease) => lease,
            Err(e) => {
                error!(router = %discovery.server_url, error = %e, "failed to dial job router");
                return self.delegate.request_job(cancel, config, session).await;
            }
        };

        let request = self.delegate.prepare_job_request(config, session);
        let poll = self.get_job(cancel, &lease, &request, &discovery).await;
        drop(lease);

        self.metrics.record_job_request(JobSource::Router, &poll);
        poll
    }

    fn prepare_job_request(&self, config: &RunnerConfig, session: Option<&SessionInfo>) -> JobRequest {
        self.delegate.prepare_job_request(config, session)
    }

    async fn get_router_discovery(
        &self,
        cancel: &CancellationToken,
        config: &RunnerConfig,
    ) -> Result<Option<RouterDiscovery>, NetworkError> {
        self.delegate.get_router_discovery(cancel, config).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_codes_keep_polling() {
        for code in [Code::DeadlineExceeded, Code::Cancelled, Code::Unavailable] {
            assert_eq!(poll_for_status(&Status::new(code, "x")), JobPoll::NoJob, "{code:?}");
        }
    }

    #[test]
    fn other_codes_are_unhealthy() {
        for code in [
            Code::Unknown,
            Code::InvalidArgument,
            Code::PermissionDenied,
            Code::Unauthenticated,
            Code::Internal,
            Code::ResourceExhausted,
        ] {
            assert_eq!(poll_for_status(&Status::new(code, "x")), JobPoll::Unhealthy, "{code:?}");
        }
    }

    #[test]
    fn zero_ttl_is_never_fresh() {
        let now = Instant::now();
        let cached = CachedDiscovery {
            record: None,
            expires_at: now.checked_add(Duration::ZERO),
        };
        assert!(!cached.is_fresh(now));

        let forever = CachedDiscovery {
            record: None,
            expires_at: None,
        };
        assert!(forever.is_fresh(now));
    }
}
