use std::{collections::HashMap, sync::Arc};

use tracing::debug;

use runr_model::{Env, StoreConfig};

use crate::store::{JobStore, StoreError};

/// Factory for stores of one type.
///
/// A provider must return the same instance for the same effective location,
/// so that two stores never share a directory.
pub trait StoreProvider: Send + Sync + 'static {
    fn get(&self, config: &StoreConfig, env: &Env) -> Result<Arc<dyn JobStore>, StoreError>;
}

/// Explicit table of store providers keyed by type string.
#[derive(Default, Clone)]
pub struct StoreRegistry {
    providers: HashMap<String, Arc<dyn StoreProvider>>,
}

impl StoreRegistry {
    /// Empty registry. Use [`StoreRegistry::register`] to add providers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `provider` under `store_type`, replacing any previous entry.
    pub fn register(&mut self, store_type: impl Into<String>, provider: Arc<dyn StoreProvider>) {
        let store_type = store_type.into();
        debug!(store_type = %store_type, "registered store provider");
        self.providers.insert(store_type, provider);
    }

    /// True when a provider is registered for `store_type`.
    pub fn contains(&self, store_type: &str) -> bool {
        self.providers.contains_key(store_type)
    }

    /// Validate `config` and open the store it names.
    pub fn open(&self, config: &StoreConfig, env: &Env) -> Result<Arc<dyn JobStore>, StoreError> {
        config.validate()?;
        let provider = self
            .providers
            .get(&config.store_type)
            .ok_or_else(|| StoreError::UnknownType(config.store_type.clone()))?;
        provider.get(config, env)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use runr_model::Job;

    use super::*;

    #[derive(Default)]
    struct MemoryStore(Mutex<Vec<Job>>);

    impl JobStore for MemoryStore {
        fn request(&self) -> Result<Option<Job>, StoreError> {
            Ok(None)
        }
        fn list(&self) -> Result<Vec<Job>, StoreError> {
            Ok(self.0.lock().unwrap().clone())
        }
        fn update(&self, job: &Job) -> Result<(), StoreError> {
            self.0.lock().unwrap().push(job.clone());
            Ok(())
        }
        fn remove(&self, _: &Job) -> Result<(), StoreError> {
            Ok(())
        }
    }

    struct MemoryProvider(Arc<MemoryStore>);

    impl StoreProvider for MemoryProvider {
        fn get(&self, _: &StoreConfig, _: &Env) -> Result<Arc<dyn JobStore>, StoreError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn unknown_type_is_rejected() {
        let registry = StoreRegistry::new();
        let cfg = StoreConfig {
            path: "/var/lib/runr".into(),
            ..Default::default()
        };
        let err = registry
            .open(&cfg, &Env::new())
            .err()
            .expect("must fail");
        assert!(matches!(err, StoreError::UnknownType(t) if t == "file"));
    }

    #[test]
    fn invalid_config_is_rejected_before_lookup() {
        let mut registry = StoreRegistry::new();
        registry.register("file", Arc::new(MemoryProvider(Arc::default())));

        let cfg = StoreConfig {
            health_timeout: 100,
            stale_timeout: 10,
            ..Default::default()
        };
        assert!(matches!(
            registry.open(&cfg, &Env::new()),
            Err(StoreError::InvalidConfig(_))
        ));
    }

    #[test]
    fn opens_registered_provider() {
        let store = Arc::new(MemoryStore::default());
        let mut registry = StoreRegistry::new();
        registry.register("memory", Arc::new(MemoryProvider(store.clone())));
        assert!(registry.contains("memory"));

        let cfg = StoreConfig {
            store_type: "memory".into(),
            ..Default::default()
        };
        let opened = registry.open(&cfg, &Env::new()).unwrap();
        opened.update(&Job::new(Default::default())).unwrap();
        assert_eq!(store.list().unwrap().len(), 1);
    }
}
