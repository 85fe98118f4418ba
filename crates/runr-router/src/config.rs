use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

/// How long a discovery record is trusted.
pub const DEFAULT_DISCOVERY_TTL: Duration = Duration::from_secs(60 * 60);

/// HTTP/2 keepalive ping interval, kept under common load balancer idle limits.
pub const DEFAULT_KEEPALIVE: Duration = Duration::from_secs(55);

/// Largest WebSocket message accepted on a tunnel.
pub const DEFAULT_WS_MAX_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

/// Tuning knobs of the router client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterClientConfig {
    /// Seconds a discovery record stays cached.
    pub discovery_ttl: u64,
    /// Directory searched for `<host>.crt`, `<host>.auth.crt` and `<host>.auth.key`.
    pub cert_dir: Option<PathBuf>,
    pub user_agent: String,
    /// Seconds between keepalive pings.
    pub keepalive: u64,
    /// Bytes; larger WebSocket messages fail the tunnel.
    pub ws_max_message_size: usize,
}

impl Default for RouterClientConfig {
    fn default() -> Self {
        Self {
            discovery_ttl: DEFAULT_DISCOVERY_TTL.as_secs(),
            cert_dir: None,
            user_agent: concat!("runr/", env!("CARGO_PKG_VERSION")).to_string(),
            keepalive: DEFAULT_KEEPALIVE.as_secs(),
            ws_max_message_size: DEFAULT_WS_MAX_MESSAGE_SIZE,
        }
    }
}

impl RouterClientConfig {
    #[inline]
    pub fn discovery_ttl(&self) -> Duration {
        Duration::from_secs(self.discovery_ttl)
    }

    #[inline]
    pub fn keepalive(&self) -> Duration {
        Duration::from_secs(self.keepalive)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let cfg: RouterClientConfig =
            serde_json::from_str(r#"{"cert_dir":"/etc/runr/certs"}"#).unwrap();
        assert_eq!(cfg.discovery_ttl(), DEFAULT_DISCOVERY_TTL);
        assert_eq!(cfg.keepalive(), Duration::from_secs(55));
        assert_eq!(cfg.ws_max_message_size, 10 * 1024 * 1024);
        assert_eq!(cfg.cert_dir.as_deref(), Some(std::path::Path::new("/etc/runr/certs")));
        assert!(cfg.user_agent.starts_with("runr/"));
    }
}
