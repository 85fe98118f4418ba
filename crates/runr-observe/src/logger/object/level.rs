use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use crate::logger::LoggerError;

/// Validated `EnvFilter` expression such as `"info"` or `"runr_store=trace,warn"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String")]
#[serde(into = "String")]
pub struct LoggerLevel(String);

impl LoggerLevel {
    /// Validate `s` as an [`EnvFilter`](tracing_subscriber::EnvFilter) directive.
    ///
    /// ```
    /// use runr_observe::LoggerLevel;
    ///
    /// assert!(LoggerLevel::new("info,runr_router=debug").is_ok());
    /// assert!(LoggerLevel::new("x=nope").is_err());
    /// ```
    pub fn new(s: impl Into<String>) -> Result<Self, LoggerError> {
        Self::try_from(s.into())
    }

    /// The directive as given.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Build the filter. The expression was validated on construction.
    pub fn to_env_filter(&self) -> EnvFilter {
        EnvFilter::try_new(self.as_str()).unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

impl Default for LoggerLevel {
    fn default() -> Self {
        Self("info".to_string())
    }
}

impl FromStr for LoggerLevel {
    type Err = LoggerError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(s.to_owned())
    }
}

impl TryFrom<String> for LoggerLevel {
    type Error = LoggerError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        match EnvFilter::try_new(&s) {
            Ok(_) => Ok(LoggerLevel(s)),
            Err(e) => Err(LoggerError::InvalidLevel(format!("{s}: {e}"))),
        }
    }
}

impl From<LoggerLevel> for String {
    fn from(l: LoggerLevel) -> Self {
        l.0
    }
}

#[cfg(test)]
mod tests {
    use super::LoggerLevel;

    #[test]
    fn accepts_valid_levels() {
        for lvl in ["info", "warn", "trace", "runr_trace=trace,runr_store=debug,info"] {
            assert!(lvl.parse::<LoggerLevel>().is_ok(), "{lvl} must parse");
        }
    }

    #[test]
    fn rejects_invalid_levels() {
        for lvl in ["runr_trace=verbose", "root=info,sub=xyz"] {
            assert!(lvl.parse::<LoggerLevel>().is_err(), "{lvl} must be rejected");
        }
    }

    #[test]
    fn serde_from_plain_string() {
        let lvl: LoggerLevel = serde_json::from_str(r#""debug""#).unwrap();
        assert_eq!(lvl.as_str(), "debug");
        assert!(serde_json::from_str::<LoggerLevel>(r#""x=nope""#).is_err());
    }
}
