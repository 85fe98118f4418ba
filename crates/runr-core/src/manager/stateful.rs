use std::sync::{Arc, Mutex, MutexGuard};

use tokio::task::{JoinHandle, spawn_blocking};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use runr_model::{BuildRuntimeState, Job, RunnerConfig, SessionInfo};

use crate::{
    error::CoreError,
    metrics::{JobSource, MetricsHandle},
    network::{JobPoll, Network},
    store::{JobStore, StoreError},
};

/// What [`StatefulJobManager::request_job`] came back with.
#[derive(Debug, Clone, PartialEq)]
pub enum ManagedJob {
    /// A previously abandoned job picked up from the store.
    Resumed(Job),
    /// A new job from the network.
    Received(Job),
    /// Nothing to do; upstream is healthy.
    NoJob,
    /// Upstream misbehaved.
    Unhealthy,
}

impl ManagedJob {
    /// The job, when one was handed out.
    pub fn job(&self) -> Option<&Job> {
        match self {
            ManagedJob::Resumed(job) | ManagedJob::Received(job) => Some(job),
            _ => None,
        }
    }

    /// False only when upstream misbehaved; the caller should back off.
    #[inline]
    pub fn is_healthy(&self) -> bool {
        !matches!(self, ManagedJob::Unhealthy)
    }
}

enum StoreEvent {
    Resume,
    Health,
    Trace(u64),
    BuildState(BuildRuntimeState),
    Stage(String),
}

/// Owns one job at a time and mirrors its runtime state into a [`JobStore`].
///
/// Jobs come from the store first so an abandoned job is resumed before new
/// work is accepted. Every recorded event doubles as a health check.
///
/// Store calls do file I/O and run on the blocking pool. They are issued one
/// at a time, in the order the events were recorded.
pub struct StatefulJobManager {
    network: Arc<dyn Network>,
    store: Arc<dyn JobStore>,
    config: RunnerConfig,
    metrics: MetricsHandle,
    job: Mutex<Option<Job>>,
    persist: tokio::sync::Mutex<()>,
}

impl StatefulJobManager {
    /// Manager for the runner described by `config`, persisting into `store`.
    pub fn new(
        network: Arc<dyn Network>,
        store: Arc<dyn JobStore>,
        config: RunnerConfig,
        metrics: MetricsHandle,
    ) -> Self {
        Self {
            network,
            store,
            config,
            metrics,
            job: Mutex::new(None),
            persist: tokio::sync::Mutex::new(()),
        }
    }

    /// Associate the manager with the next job.
    pub async fn request_job(
        &self,
        cancel: &CancellationToken,
        session: Option<&SessionInfo>,
    ) -> ManagedJob {
        let stored = self.run_store("request", |store| store.request()).await;
        match stored {
            Ok(Some(job)) => {
                info!(job = job.id(), retries = job.state.retries(), "resuming job from store");
                *self.lock() = Some(job);
                self.apply(StoreEvent::Resume).await;
                if let Some(job) = self.current_job() {
                    let poll = JobPoll::Job(Box::new(job.response.clone()));
                    self.metrics.record_job_request(JobSource::Store, &poll);
                    return ManagedJob::Resumed(job);
                }
            }
            Ok(None) => {}
            Err(e) => error!(error = %e, "failed to request job from store"),
        }

        let poll = self.network.request_job(cancel, &self.config, session).await;
        self.metrics.record_job_request(JobSource::Network, &poll);
        match poll {
            JobPoll::Job(response) => {
                let job = Job::new(*response);
                debug!(job = job.id(), "received job from network");
                *self.lock() = Some(job.clone());
                ManagedJob::Received(job)
            }
            JobPoll::NoJob => ManagedJob::NoJob,
            JobPoll::Unhealthy => ManagedJob::Unhealthy,
        }
    }

    /// Snapshot of the job currently owned by the manager.
    pub fn current_job(&self) -> Option<Job> {
        self.lock().clone()
    }

    /// Record a build state change. Success and failure drop the job from the store.
    pub async fn update_build_state(&self, state: BuildRuntimeState) -> Result<(), CoreError> {
        if matches!(state, BuildRuntimeState::Success | BuildRuntimeState::Failed) {
            let _order = self.persist.lock().await;
            let job = {
                let mut guard = self.lock();
                let job = guard.as_mut().ok_or(CoreError::NoActiveJob)?;
                job.state.set_build_state(state);
                job.clone()
            };
            let id = job.id();
            self.run_store("remove", move |store| store.remove(&job)).await?;
            debug!(job = id, state = %state, "job finished, removed from store");
            return Ok(());
        }
        self.try_apply(StoreEvent::BuildState(state)).await
    }

    /// Record the stage the job is executing, for resuming after a crash.
    pub async fn update_stage(&self, stage: impl Into<String>) -> Result<(), CoreError> {
        self.try_apply(StoreEvent::Stage(stage.into())).await
    }

    /// Record how much of the trace upstream has acknowledged.
    pub async fn record_sent_trace(&self, offset: u64) -> Result<(), CoreError> {
        self.try_apply(StoreEvent::Trace(offset)).await
    }

    /// Stamp the job as alive now.
    pub async fn update_health(&self) -> Result<(), CoreError> {
        self.try_apply(StoreEvent::Health).await
    }

    /// Refresh the job health every `store.health_interval` until `cancel` fires.
    pub fn spawn_health_ticker(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        let period = self.config.store.health_interval();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = manager.update_health().await {
                            debug!(error = %e, "health update skipped");
                        }
                    }
                    _ = cancel.cancelled() => return,
                }
            }
        })
    }

    async fn try_apply(&self, event: StoreEvent) -> Result<(), CoreError> {
        if self.lock().is_none() {
            return Err(CoreError::NoActiveJob);
        }
        self.apply(event).await;
        Ok(())
    }

    async fn apply(&self, event: StoreEvent) {
        let _order = self.persist.lock().await;
        let job = {
            let mut guard = self.lock();
            let Some(job) = guard.as_mut() else {
                return;
            };
            match event {
                StoreEvent::Health => {}
                StoreEvent::Resume => job.state.resume(),
                StoreEvent::Trace(offset) => job.state.set_sent_trace(offset),
                StoreEvent::Stage(stage) => job.state.set_stage(stage),
                StoreEvent::BuildState(state) => {
                    if !job.state.set_build_state(state) {
                        debug!(job = job.id(), from = %job.state.build_state(), to = %state, "refused build state transition");
                    }
                }
            }
            job.state.update_health();
            job.clone()
        };

        let id = job.id();
        if let Err(e) = self.run_store("update", move |store| store.update(&job)).await {
            error!(job = id, error = %e, "failed to update job");
        }
    }

    /// Run one store operation on the blocking pool and record its outcome.
    async fn run_store<T, F>(&self, op: &'static str, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn JobStore) -> Result<T, StoreError> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let result = spawn_blocking(move || f(store.as_ref()))
            .await
            .unwrap_or_else(|e| Err(StoreError::Task { op, reason: e.to_string() }));
        self.metrics.record_store_op(op, result.is_ok());
        result
    }

    fn lock(&self) -> MutexGuard<'_, Option<Job>> {
        self.job.lock().unwrap_or_else(|e| e.into_inner())
    }
}
