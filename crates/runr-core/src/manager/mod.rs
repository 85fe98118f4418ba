//! Job lifecycle bound to the persistent store.
mod stateful;
pub use stateful::{ManagedJob, StatefulJobManager};
