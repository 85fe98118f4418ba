use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{ModelError, ModelResult};

/// Store type served by the file-backed provider.
pub const DEFAULT_STORE_TYPE: &str = "file";

/// Persistent job store settings.
///
/// All timeouts are whole seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Provider key in the store registry.
    #[serde(rename = "type")]
    pub store_type: String,
    /// Directory holding job state files. May reference `$VARS`.
    pub path: String,
    /// How often an active job refreshes its health timestamp.
    pub health_interval: u64,
    /// Age of the health timestamp after which a job counts as abandoned.
    pub health_timeout: u64,
    /// Age after which a job is dropped regardless of state.
    pub stale_timeout: u64,
    /// How many times an abandoned job may be resumed.
    pub max_retries: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            store_type: DEFAULT_STORE_TYPE.to_string(),
            path: String::new(),
            health_interval: 30,
            health_timeout: 5 * 60,
            stale_timeout: 24 * 60 * 60,
            max_retries: 3,
        }
    }
}

impl StoreConfig {
    /// Health refresh period, never below one second.
    #[inline]
    pub fn health_interval(&self) -> Duration {
        Duration::from_secs(self.health_interval.max(1))
    }

    /// Idle age after which a running job may be resumed.
    #[inline]
    pub fn health_timeout(&self) -> Duration {
        Duration::from_secs(self.health_timeout)
    }

    /// Idle age after which a job is deleted.
    #[inline]
    pub fn stale_timeout(&self) -> Duration {
        Duration::from_secs(self.stale_timeout)
    }

    /// Check the settings before a store is opened.
    ///
    /// The type must be set, the file store needs a non-blank path, and
    /// `stale_timeout` may not be lower than `health_timeout`.
    ///
    /// ```
    /// use runr_model::StoreConfig;
    ///
    /// let mut cfg = StoreConfig::default();
    /// assert!(cfg.validate().is_err(), "no path yet");
    ///
    /// cfg.path = "/var/lib/runr/jobs".into();
    /// assert!(cfg.validate().is_ok());
    /// ```
    pub fn validate(&self) -> ModelResult<()> {
        if self.store_type.trim().is_empty() {
            return Err(ModelError::InvalidStoreConfig("store type is empty".into()));
        }
        if self.store_type == DEFAULT_STORE_TYPE && self.path.trim().is_empty() {
            return Err(ModelError::InvalidStoreConfig(
                "file store requires a path".into(),
            ));
        }
        if self.stale_timeout < self.health_timeout {
            return Err(ModelError::InvalidStoreConfig(format!(
                "stale_timeout ({}s) must not be lower than health_timeout ({}s)",
                self.stale_timeout, self.health_timeout
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_consistent() {
        let cfg = StoreConfig::default();
        assert_eq!(cfg.store_type, "file");
        assert_eq!(cfg.health_timeout(), Duration::from_secs(300));
        assert_eq!(cfg.stale_timeout(), Duration::from_secs(86_400));
        assert_eq!(cfg.max_retries, 3);

        let cfg = StoreConfig {
            path: "/var/lib/runr".into(),
            ..cfg
        };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn file_store_requires_a_path() {
        for path in ["", "   "] {
            let cfg = StoreConfig {
                path: path.into(),
                ..Default::default()
            };
            assert!(
                matches!(cfg.validate(), Err(ModelError::InvalidStoreConfig(m)) if m.contains("path")),
                "{path:?} must be rejected"
            );
        }

        let other = StoreConfig {
            store_type: "memory".into(),
            ..Default::default()
        };
        assert!(other.validate().is_ok(), "only the file store is path based");
    }

    #[test]
    fn rejects_stale_below_health() {
        let cfg = StoreConfig {
            path: "/var/lib/runr".into(),
            health_timeout: 600,
            stale_timeout: 60,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(ModelError::InvalidStoreConfig(_))));
    }

    #[test]
    fn partial_deserialization_keeps_defaults() {
        let cfg: StoreConfig =
            serde_json::from_str(r#"{"type":"file","path":"/var/lib/runr","max_retries":1}"#)
                .unwrap();
        assert_eq!(cfg.path, "/var/lib/runr");
        assert_eq!(cfg.max_retries, 1);
        assert_eq!(cfg.health_timeout, 300);
    }
}
