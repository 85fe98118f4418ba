pub mod error;
pub mod manager;
pub mod metrics;
pub mod network;
pub mod store;

pub use error::CoreError;
pub use manager::{ManagedJob, StatefulJobManager};
pub use metrics::{ExitOutcome, JobSource, MetricsBackend, MetricsHandle, NoOpMetrics, noop_metrics};
pub use network::{JobPoll, Network, NetworkError};
pub use store::{JobStore, StoreError, StoreProvider, StoreRegistry};

pub mod prelude {
    pub use crate::error::CoreError;
    pub use crate::manager::{ManagedJob, StatefulJobManager};
    pub use crate::network::{JobPoll, Network};
    pub use crate::store::{JobStore, StoreRegistry};
}
