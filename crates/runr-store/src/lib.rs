//! File-backed [`JobStore`](runr_core::JobStore).
//!
//! Each job lives in `<dir>/<id>.state`, written through a sibling
//! `<id>.state.tmp` and an atomic rename.
mod codec;
pub use codec::{CborCodec, CodecError};

mod filter;
pub use filter::{can_delete, can_resume};

mod file;
pub use file::FileStore;

mod provider;
pub use provider::FileStoreProvider;

use std::sync::Arc;

use runr_core::StoreRegistry;
use runr_model::DEFAULT_STORE_TYPE;

/// Register the file store provider under `"file"`.
pub fn register_file_store(registry: &mut StoreRegistry) {
    registry.register(DEFAULT_STORE_TYPE, Arc::new(FileStoreProvider::new()));
}
