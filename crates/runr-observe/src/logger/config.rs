use std::io::IsTerminal;

use serde::{Deserialize, Serialize};

use crate::logger::{LoggerResult, object::{LoggerFormat, LoggerLevel}};

/// Logger configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// Output format.
    pub format: LoggerFormat,
    /// Filter expression, e.g. `"info"` or `"runr_router=debug,info"`.
    pub level: LoggerLevel,
    /// Include module targets in records.
    pub with_targets: bool,
    /// Colored output when stdout is a terminal.
    pub use_color: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            format: LoggerFormat::default(),
            level: LoggerLevel::default(),
            with_targets: true,
            use_color: true,
        }
    }
}

impl LoggerConfig {
    /// Build a config from `<prefix>_LOG_FORMAT` and `<prefix>_LOG_LEVEL`.
    ///
    /// Unset variables keep their defaults; set but invalid ones are errors.
    pub fn from_env(prefix: &str) -> LoggerResult<Self> {
        Self::from_lookup(prefix, |key| std::env::var(key).ok())
    }

    fn from_lookup(prefix: &str, lookup: impl Fn(&str) -> Option<String>) -> LoggerResult<Self> {
        let mut cfg = Self::default();
        if let Some(format) = lookup(&format!("{prefix}_LOG_FORMAT")) {
            cfg.format = format.parse()?;
        }
        if let Some(level) = lookup(&format!("{prefix}_LOG_LEVEL")) {
            cfg.level = level.parse()?;
        }
        Ok(cfg)
    }

    /// Color is used only when enabled and stdout is a terminal.
    pub fn should_use_color(&self) -> bool {
        self.use_color && std::io::stdout().is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::LoggerError;

    #[test]
    fn default_values() {
        let config = LoggerConfig::default();

        assert_eq!(config.format, LoggerFormat::Text);
        assert_eq!(config.level.as_str(), "info");
        assert!(config.with_targets);
        assert!(config.use_color);
    }

    #[test]
    fn serde_uses_defaults_for_missing_fields() {
        let config: LoggerConfig = serde_json::from_str(r#"{"format": "json"}"#).unwrap();

        assert_eq!(config.format, LoggerFormat::Json);
        assert_eq!(config.level.as_str(), "info");
        assert!(config.with_targets);
    }

    #[test]
    fn reads_prefixed_variables() {
        let vars: HashMap<&str, &str> = [
            ("RUNR_LOG_FORMAT", "json"),
            ("RUNR_LOG_LEVEL", "runr_router=debug,info"),
        ]
        .into_iter()
        .collect();

        let cfg = LoggerConfig::from_lookup("RUNR", |k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(cfg.format, LoggerFormat::Json);
        assert_eq!(cfg.level.as_str(), "runr_router=debug,info");
    }

    #[test]
    fn invalid_variable_is_an_error() {
        let err = LoggerConfig::from_lookup("RUNR", |k| {
            (k == "RUNR_LOG_FORMAT").then(|| "xml".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, LoggerError::InvalidFormat(_)));
    }
}
