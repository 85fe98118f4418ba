//! Job persistence seam.
//!
//! Concrete stores live in their own crates and are reached through a
//! [`StoreRegistry`] keyed by the configured store type.
mod error;
pub use error::StoreError;

mod registry;
pub use registry::{StoreProvider, StoreRegistry};

use runr_model::Job;

/// Crash-safe persistence of in-flight jobs.
///
/// All operations on one instance are totally ordered.
pub trait JobStore: Send + Sync + 'static {
    /// Find the next resumable job, deleting dead ones on the way.
    fn request(&self) -> Result<Option<Job>, StoreError>;
    /// Every job that decodes cleanly.
    fn list(&self) -> Result<Vec<Job>, StoreError>;
    /// Atomically replace the stored copy of `job`.
    fn update(&self, job: &Job) -> Result<(), StoreError>;
    /// Forget `job`. Missing entries are not an error.
    fn remove(&self, job: &Job) -> Result<(), StoreError>;
}
