mod request;
pub use request::{JobRequest, SessionInfo, VersionInfo};

mod response;
pub use response::{JobInfo, JobResponse, JobVariable, TlsData};

mod state;
pub use state::{BuildRuntimeState, JobRuntimeState};

use serde::{Deserialize, Serialize};

/// A job owned by this runner together with its persisted runtime state.
///
/// The id comes from the response payload and never changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// The job as received from upstream.
    pub response: JobResponse,
    /// Local progress, owned by the runner.
    pub state: JobRuntimeState,
}

impl Job {
    /// Wrap a freshly received response with a new runtime state.
    pub fn new(response: JobResponse) -> Self {
        Self {
            response,
            state: JobRuntimeState::new(),
        }
    }

    /// Upstream job id.
    #[inline]
    pub fn id(&self) -> u64 {
        self.response.id
    }
}
