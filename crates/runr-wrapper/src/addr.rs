use std::{fmt, path::PathBuf};

use crate::error::WrapperError;

/// Where the control plane listens: `host:port`, `tcp://host:port` or
/// `unix:///path/to/socket`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlAddr {
    Tcp(String),
    Unix(PathBuf),
}

impl ControlAddr {
    /// Accepts `host:port`, `tcp://host:port` and `unix:///path`.
    pub fn parse(addr: &str) -> Result<Self, WrapperError> {
        let invalid = |reason: &str| WrapperError::InvalidAddress {
            addr: addr.to_string(),
            reason: reason.to_string(),
        };

        if let Some(path) = addr.strip_prefix("unix://") {
            if path.is_empty() {
                return Err(invalid("empty socket path"));
            }
            return Ok(ControlAddr::Unix(PathBuf::from(path)));
        }

        let hostport = addr.strip_prefix("tcp://").unwrap_or(addr);
        if hostport.contains("://") {
            return Err(invalid("unsupported scheme"));
        }
        match hostport.rsplit_once(':') {
            Some((_, port)) if port.parse::<u16>().is_ok() => Ok(ControlAddr::Tcp(hostport.to_string())),
            _ => Err(invalid("expected host:port")),
        }
    }
}

impl fmt::Display for ControlAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlAddr::Tcp(hp) => write!(f, "tcp://{hp}"),
            ControlAddr::Unix(p) => write!(f, "unix://{}", p.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_supported_forms() {
        assert_eq!(
            ControlAddr::parse("127.0.0.1:7070").unwrap(),
            ControlAddr::Tcp("127.0.0.1:7070".into())
        );
        assert_eq!(
            ControlAddr::parse("tcp://localhost:1").unwrap(),
            ControlAddr::Tcp("localhost:1".into())
        );
        assert_eq!(
            ControlAddr::parse("unix:///tmp/w.sock").unwrap(),
            ControlAddr::Unix("/tmp/w.sock".into())
        );
    }

    #[test]
    fn rejects_garbage() {
        for bad in ["", "unix://", "http://h:1", "host", "host:port"] {
            assert!(ControlAddr::parse(bad).is_err(), "{bad}");
        }
    }
}
