use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default time a child gets to exit after the termination signal.
pub const DEFAULT_TERMINATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Wrapper settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WrapperConfig {
    /// Seconds to wait for the child after a termination signal.
    pub termination_timeout: u64,
}

impl Default for WrapperConfig {
    fn default() -> Self {
        Self {
            termination_timeout: DEFAULT_TERMINATION_TIMEOUT.as_secs(),
        }
    }
}

impl WrapperConfig {
    #[inline]
    pub fn termination_timeout(&self) -> Duration {
        Duration::from_secs(self.termination_timeout)
    }
}
