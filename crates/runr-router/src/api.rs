//! Default [`Network`] speaking the upstream HTTP API.
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::spawn_blocking;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use runr_core::{JobPoll, Network, NetworkError};
use runr_model::{JobRequest, JobResponse, RouterDiscovery, RunnerConfig, SessionInfo, VersionInfo};

/// Header carrying the runner authentication token.
pub const RUNNER_TOKEN_HEADER: &str = "Runner-Token";
/// Header carrying the request correlation id, both directions.
pub const CORRELATION_ID_HEADER: &str = "X-Request-Id";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Result of one HTTP job request.
#[derive(Debug)]
enum JobReply {
    Job(Box<JobResponse>),
    NoJob,
    Unhealthy,
}

/// HTTP client for `/api/v4`.
///
/// Requests run on the blocking pool. A canceled call still waits for its
/// request to finish, bounded by the agent timeout, so a job assigned by
/// upstream in the meantime is returned rather than lost.
#[derive(Clone)]
pub struct ApiNetwork {
    agent: ureq::Agent,
    version: VersionInfo,
}

impl ApiNetwork {
    /// Client identifying itself with `version`, using a 60 second timeout.
    pub fn new(version: VersionInfo) -> Self {
        Self::with_timeout(version, DEFAULT_TIMEOUT)
    }

    /// Client with a custom per-request timeout. The timeout also bounds how
    /// long a canceled call waits for its reply.
    pub fn with_timeout(version: VersionInfo, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(timeout)
            .user_agent(&format!("{}/{}", version.name, version.version))
            .build();
        Self { agent, version }
    }
}

fn endpoint(config: &RunnerConfig, path: &str) -> String {
    format!("{}/api/v4/{}", config.url.trim_end_matches('/'), path)
}

fn transport_error(url: &str, e: impl std::fmt::Display) -> NetworkError {
    NetworkError::Transport {
        url: url.to_string(),
        reason: e.to_string(),
    }
}

fn post_job_request(agent: &ureq::Agent, url: &str, token: &str, body: &JobRequest) -> JobReply {
    let correlation_id = Uuid::new_v4().to_string();
    let result = agent
        .post(url)
        .set(RUNNER_TOKEN_HEADER, token)
        .set(CORRELATION_ID_HEADER, &correlation_id)
        .set("Accept", "application/json")
        .send_json(body);

    let resp = match result {
        Ok(resp) => resp,
        Err(ureq::Error::Status(code, _)) => {
            return match code {
                403 => {
                    warn!(status = code, "job request forbidden, check the runner token");
                    JobReply::Unhealthy
                }
                503 => {
                    warn!(status = code, "upstream unavailable");
                    JobReply::NoJob
                }
                400..=499 => {
                    warn!(status = code, "job request rejected");
                    JobReply::Unhealthy
                }
                _ => {
                    warn!(status = code, "job request failed");
                    JobReply::NoJob
                }
            };
        }
        Err(e) => {
            warn!(url, error = %e, "job request failed");
            return JobReply::Unhealthy;
        }
    };

    match resp.status() {
        201 => {
            let server_id = resp.header(CORRELATION_ID_HEADER).map(str::to_string);
            match resp.into_json::<JobResponse>() {
                Ok(mut job) => {
                    job.correlation_id = server_id.unwrap_or(correlation_id);
                    info!(job = job.id, correlation_id = %job.correlation_id, "received job");
                    JobReply::Job(Box::new(job))
                }
                Err(e) => {
                    warn!(error = %e, "failed to decode job");
                    JobReply::Unhealthy
                }
            }
        }
        204 => {
            debug!("no job available");
            JobReply::NoJob
        }
        code => {
            warn!(status = code, "unexpected job request status");
            JobReply::NoJob
        }
    }
}

fn get_discovery(
    agent: &ureq::Agent,
    url: &str,
    token: &str,
) -> Result<Option<RouterDiscovery>, NetworkError> {
    let result = agent
        .get(url)
        .set(RUNNER_TOKEN_HEADER, token)
        .set(CORRELATION_ID_HEADER, &Uuid::new_v4().to_string())
        .set("Accept", "application/json")
        .call();

    match result {
        Ok(resp) if resp.status() == 200 => resp
            .into_json::<RouterDiscovery>()
            .map(Some)
            .map_err(|e| NetworkError::Decode {
                url: url.to_string(),
                reason: e.to_string(),
            }),
        Ok(resp) => Err(NetworkError::Status {
            url: url.to_string(),
            status: resp.status(),
        }),
        // Router not enabled, or an upstream too old to know the endpoint.
        Err(ureq::Error::Status(404 | 501, _)) => Ok(None),
        Err(ureq::Error::Status(status, _)) => Err(NetworkError::Status {
            url: url.to_string(),
            status,
        }),
        Err(e) => Err(transport_error(url, e)),
    }
}

#[async_trait]
impl Network for ApiNetwork {
    async fn request_job(
        &self,
        cancel: &CancellationToken,
        config: &RunnerConfig,
        session: Option<&SessionInfo>,
    ) -> JobPoll {
        let body = self.prepare_job_request(config, session);
        let url = endpoint(config, "jobs/request");
        let agent = self.agent.clone();
        let token = config.token.clone();
        let mut call = spawn_blocking(move || post_job_request(&agent, &url, &token, &body));

        let reply = tokio::select! {
            r = &mut call => r,
            _ = cancel.cancelled() => {
                // Upstream may already have assigned a job to this request;
                // wait for the reply, bounded by the agent timeout.
                debug!("job request canceled, waiting for the upstream reply");
                match call.await {
                    Ok(JobReply::Job(job)) => {
                        info!(job = job.id, "job arrived after cancel, handing it back");
                        return JobPoll::Job(job);
                    }
                    Ok(_) => return JobPoll::NoJob,
                    Err(e) => {
                        warn!(error = %e, "job request task failed");
                        return JobPoll::NoJob;
                    }
                }
            }
        };
        match reply {
            Ok(JobReply::Job(job)) => JobPoll::Job(job),
            Ok(JobReply::NoJob) => JobPoll::NoJob,
            Ok(JobReply::Unhealthy) => JobPoll::Unhealthy,
            Err(e) => {
                warn!(error = %e, "job request task failed");
                JobPoll::Unhealthy
            }
        }
    }

    fn prepare_job_request(&self, config: &RunnerConfig, session: Option<&SessionInfo>) -> JobRequest {
        JobRequest {
            info: self.version.clone(),
            token: config.token.clone(),
            system_id: config.system_id.clone(),
            last_update: String::new(),
            session: session.cloned(),
        }
    }

    async fn get_router_discovery(
        &self,
        cancel: &CancellationToken,
        config: &RunnerConfig,
    ) -> Result<Option<RouterDiscovery>, NetworkError> {
        let url = endpoint(config, "runners/router/discovery");
        let agent = self.agent.clone();
        let token = config.token.clone();
        let mut call = {
            let url = url.clone();
            spawn_blocking(move || get_discovery(&agent, &url, &token))
        };

        tokio::select! {
            r = &mut call => r.map_err(|e| transport_error(&url, e))?,
            _ = cancel.cancelled() => {
                // Nothing keeps running detached once we return.
                let _ = call.await;
                Err(NetworkError::Canceled)
            }
        }
    }
}
