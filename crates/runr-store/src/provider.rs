use std::{
    collections::HashMap,
    fs,
    path::PathBuf,
    sync::{Arc, Mutex},
};

use tracing::info;

use runr_core::{JobStore, StoreError, StoreProvider};
use runr_model::{Env, StoreConfig};

use crate::file::FileStore;

/// Hands out one [`FileStore`] per expanded directory path.
///
/// The first config seen for a path wins; later configs for the same path
/// get the existing store.
#[derive(Default)]
pub struct FileStoreProvider {
    stores: Mutex<HashMap<PathBuf, Arc<FileStore>>>,
}

impl FileStoreProvider {
    /// Provider for the `file` store type.
    pub fn new() -> Self {
        Self::default()
    }

    /// Typed variant of [`StoreProvider::get`].
    pub fn open(&self, config: &StoreConfig, env: &Env) -> Result<Arc<FileStore>, StoreError> {
        if config.path.trim().is_empty() {
            return Err(StoreError::EmptyPath);
        }
        let dir = PathBuf::from(env.expand(&config.path));

        let mut stores = self.stores.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(store) = stores.get(&dir) {
            return Ok(Arc::clone(store));
        }

        create_dir(&dir)?;
        info!(path = %dir.display(), "opened file job store");
        let store = Arc::new(FileStore::new(dir.clone(), config.clone()));
        stores.insert(dir, Arc::clone(&store));
        Ok(store)
    }
}

fn create_dir(dir: &PathBuf) -> Result<(), StoreError> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder
        .create(dir)
        .map_err(|e| StoreError::io("create dir", dir, e))
}

impl StoreProvider for FileStoreProvider {
    fn get(&self, config: &StoreConfig, env: &Env) -> Result<Arc<dyn JobStore>, StoreError> {
        let store: Arc<dyn JobStore> = self.open(config, env)?;
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_path_is_rejected() {
        let provider = FileStoreProvider::new();
        assert!(matches!(
            provider.open(&StoreConfig::default(), &Env::new()),
            Err(StoreError::EmptyPath)
        ));
    }

    #[test]
    fn one_store_per_expanded_path() {
        let root = tempfile::tempdir().unwrap();
        let mut env = Env::new();
        env.push("STORE_ROOT", root.path().to_string_lossy());

        let provider = FileStoreProvider::new();
        let by_var = StoreConfig {
            path: "${STORE_ROOT}/jobs".into(),
            ..Default::default()
        };
        let literal = StoreConfig {
            path: root.path().join("jobs").to_string_lossy().into_owned(),
            max_retries: 9,
            ..Default::default()
        };

        let a = provider.open(&by_var, &env).unwrap();
        let b = provider.open(&literal, &Env::new()).unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(b.config().max_retries, 3);
        assert!(root.path().join("jobs").is_dir());
    }
}
