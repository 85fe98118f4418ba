mod discovery;
pub use discovery::RouterDiscovery;

mod runner;
pub use runner::RunnerConfig;

mod store;
pub use store::{DEFAULT_STORE_TYPE, StoreConfig};
