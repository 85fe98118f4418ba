use serde::{Deserialize, Serialize};

use crate::StoreConfig;

/// Per-runner settings consumed by the network and routing layers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Display name, used in logs only.
    pub name: String,
    /// Base URL of the upstream service.
    pub url: String,
    /// Runner authentication token.
    pub token: String,
    /// PEM bundle trusted for the upstream service, empty for system roots.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub tls_ca_file: String,
    /// Client certificate for mutual TLS.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub tls_cert_file: String,
    /// Key matching `tls_cert_file`.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub tls_key_file: String,
    /// Identifies this runner process to upstream.
    pub system_id: String,
    /// Where jobs are persisted between runner generations.
    pub store: StoreConfig,
}

impl RunnerConfig {
    /// Token prefix suitable for log fields.
    pub fn short_description(&self) -> &str {
        let end = self
            .token
            .char_indices()
            .nth(8)
            .map(|(i, _)| i)
            .unwrap_or(self.token.len());
        &self.token[..end]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_description_truncates_token() {
        let cfg = RunnerConfig {
            token: "glrt-0123456789".into(),
            ..Default::default()
        };
        assert_eq!(cfg.short_description(), "glrt-012");

        let short = RunnerConfig {
            token: "abc".into(),
            ..Default::default()
        };
        assert_eq!(short.short_description(), "abc");
    }
}
