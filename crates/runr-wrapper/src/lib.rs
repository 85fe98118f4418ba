//! Process wrapper: runs one child, exposes a gRPC control plane that turns
//! shutdown requests into signals, and calls back over HTTP once the child
//! has stopped.
pub mod proto;

mod addr;
pub use addr::ControlAddr;

mod callback;
pub use callback::ShutdownCallback;

mod client;
pub use client::{DEFAULT_CONNECT_TIMEOUT, StatusReport, WrapperClient};

mod config;
pub use config::{DEFAULT_TERMINATION_TIMEOUT, WrapperConfig};

mod error;
pub use error::WrapperError;

mod server;
pub use server::{ControlListener, ControlService, serve};

mod signal;
pub use signal::{Signal, SignalPlan, send_signal};

mod status;
pub use status::{Status, status_from_wire};

mod wrapper;
pub use wrapper::Wrapper;
