use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::logger::LoggerError;

/// Where and how log records are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
#[non_exhaustive]
pub enum LoggerFormat {
    /// Plain lines on stdout, colored on a terminal.
    #[default]
    Text,
    /// One JSON object per line on stdout.
    Json,
    /// systemd-journald; only available on Linux.
    Journald,
}

impl LoggerFormat {
    /// Canonical lowercase name.
    ///
    /// ```
    /// use runr_observe::LoggerFormat;
    ///
    /// let format: LoggerFormat = "plain".parse().unwrap();
    /// assert_eq!(format.as_str(), "text");
    /// ```
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Json => "json",
            Self::Journald => "journald",
        }
    }

    /// True when records are written to stdout.
    pub fn is_stream(self) -> bool {
        !matches!(self, Self::Journald)
    }
}

impl FromStr for LoggerFormat {
    type Err = LoggerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let format = match s.trim().to_ascii_lowercase().as_str() {
            "text" | "plain" => Self::Text,
            "json" => Self::Json,
            "journald" | "journal" => Self::Journald,
            _ => return Err(LoggerError::InvalidFormat(s.to_string())),
        };
        if format == Self::Journald && !cfg!(target_os = "linux") {
            return Err(LoggerError::JournaldNotSupported);
        }
        Ok(format)
    }
}

impl TryFrom<String> for LoggerFormat {
    type Error = LoggerError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl fmt::Display for LoggerFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
