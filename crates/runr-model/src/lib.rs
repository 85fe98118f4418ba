mod domain;
pub use domain::{Env, KeyValue};

mod error;
pub use error::{ModelError, ModelResult};

mod job;
pub use job::{
    BuildRuntimeState, Job, JobInfo, JobRequest, JobResponse, JobRuntimeState, JobVariable,
    SessionInfo, TlsData, VersionInfo,
};

mod config;
pub use config::{RouterDiscovery, RunnerConfig, StoreConfig, DEFAULT_STORE_TYPE};
