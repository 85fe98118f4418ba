use std::{
    fmt, fs, io,
    path::{Path, PathBuf},
    time::SystemTime,
};

use tonic::transport::Uri;

use runr_model::RunnerConfig;

use crate::error::RouterError;

/// Transport named by a router URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    /// Plaintext HTTP/2.
    Grpc,
    /// HTTP/2 over TLS.
    Grpcs,
    /// HTTP/2 tunneled through a plaintext WebSocket.
    Ws,
    /// HTTP/2 tunneled through a WebSocket over TLS.
    Wss,
}

impl Scheme {
    /// Recognize a scheme name. Matching is case-sensitive.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "grpc" => Some(Scheme::Grpc),
            "grpcs" => Some(Scheme::Grpcs),
            "ws" => Some(Scheme::Ws),
            "wss" => Some(Scheme::Wss),
            _ => None,
        }
    }

    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Grpc => "grpc",
            Scheme::Grpcs => "grpcs",
            Scheme::Ws => "ws",
            Scheme::Wss => "wss",
        }
    }

    /// Port used when the URL has none.
    #[inline]
    pub fn default_port(&self) -> u16 {
        match self {
            Scheme::Grpc | Scheme::Ws => 80,
            Scheme::Grpcs | Scheme::Wss => 443,
        }
    }

    /// True for `grpcs` and `wss`.
    #[inline]
    pub fn is_tls(&self) -> bool {
        matches!(self, Scheme::Grpcs | Scheme::Wss)
    }

    /// True when HTTP/2 is carried over a WebSocket.
    #[inline]
    pub fn is_tunnel(&self) -> bool {
        matches!(self, Scheme::Ws | Scheme::Wss)
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed router URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterUrl {
    pub scheme: Scheme,
    /// Host without IPv6 brackets.
    pub host: String,
    pub port: u16,
    raw: String,
}

impl RouterUrl {
    /// Parse a router URL. The port falls back to the scheme default.
    pub fn parse(url: &str) -> Result<Self, RouterError> {
        let invalid = |reason: &str| RouterError::InvalidUrl {
            url: url.to_string(),
            reason: reason.to_string(),
        };

        let uri = url.parse::<Uri>().map_err(|e| invalid(&format!("{e}")))?;
        let scheme_str = uri.scheme_str().ok_or_else(|| invalid("missing scheme"))?;
        let scheme = Scheme::parse(scheme_str).ok_or_else(|| RouterError::UnsupportedScheme {
            url: url.to_string(),
            scheme: scheme_str.to_string(),
        })?;
        let host = uri
            .host()
            .map(|h| h.trim_start_matches('[').trim_end_matches(']'))
            .filter(|h| !h.is_empty())
            .ok_or_else(|| invalid("missing host"))?;

        Ok(Self {
            scheme,
            host: host.to_string(),
            port: uri.port_u16().unwrap_or_else(|| scheme.default_port()),
            raw: url.to_string(),
        })
    }

    /// `host:port`, bracketing IPv6 literals.
    pub fn authority(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// The URL exactly as configured.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for RouterUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Everything that identifies one pooled connection.
///
/// Two targets are the same connection only if every field matches, so a
/// token rotation or a different TLS file retires the old connection.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct DialTarget {
    /// Router URL from discovery.
    pub url: String,
    /// Token sent as bearer credentials.
    pub token: String,
    pub tls_ca_file: Option<PathBuf>,
    pub tls_cert_file: Option<PathBuf>,
    pub tls_key_file: Option<PathBuf>,
}

impl DialTarget {
    /// Target without TLS files.
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: token.into(),
            ..Default::default()
        }
    }

    /// Target for `url` reusing the runner's own TLS files.
    pub fn for_runner(url: impl Into<String>, config: &RunnerConfig) -> Self {
        let path = |s: &str| (!s.is_empty()).then(|| PathBuf::from(s));
        Self {
            url: url.into(),
            token: config.token.clone(),
            tls_ca_file: path(&config.tls_ca_file),
            tls_cert_file: path(&config.tls_cert_file),
            tls_key_file: path(&config.tls_key_file),
        }
    }

    /// Fill unset TLS paths from `dir` using names derived from the host.
    /// Files that do not exist leave the slot empty.
    pub fn with_cert_dir(mut self, dir: &Path) -> Result<Self, RouterError> {
        let url = RouterUrl::parse(&self.url)?;
        let host = &url.host;

        fill(&mut self.tls_ca_file, dir.join(format!("{host}.crt")))?;
        fill(&mut self.tls_cert_file, dir.join(format!("{host}.auth.crt")))?;
        fill(&mut self.tls_key_file, dir.join(format!("{host}.auth.key")))?;
        Ok(self)
    }

    /// The TLS paths that are set.
    pub fn tls_files(&self) -> impl Iterator<Item = &Path> {
        [&self.tls_ca_file, &self.tls_cert_file, &self.tls_key_file]
            .into_iter()
            .filter_map(|p| p.as_deref())
    }

    /// Latest modification time among the TLS files that can be stat'ed.
    pub fn newest_tls_mtime(&self) -> Option<SystemTime> {
        self.tls_files()
            .filter_map(|p| fs::metadata(p).and_then(|m| m.modified()).ok())
            .max()
    }
}

fn fill(slot: &mut Option<PathBuf>, candidate: PathBuf) -> Result<(), RouterError> {
    if slot.is_some() {
        return Ok(());
    }
    match fs::metadata(&candidate) {
        Ok(_) => {
            *slot = Some(candidate);
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(RouterError::io("stat", candidate, e)),
    }
}

impl fmt::Debug for DialTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DialTarget")
            .field("url", &self.url)
            .field("token", &"[MASKED]")
            .field("tls_ca_file", &self.tls_ca_file)
            .field("tls_cert_file", &self.tls_cert_file)
            .field("tls_key_file", &self.tls_key_file)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ports_follow_scheme() {
        let cases = [
            ("grpc://r", Scheme::Grpc, 80),
            ("grpcs://r", Scheme::Grpcs, 443),
            ("ws://r/tunnel", Scheme::Ws, 80),
            ("wss://r/tunnel", Scheme::Wss, 443),
            ("grpc://r:50051", Scheme::Grpc, 50051),
        ];
        for (url, scheme, port) in cases {
            let u = RouterUrl::parse(url).unwrap();
            assert_eq!(u.scheme, scheme, "{url}");
            assert_eq!(u.port, port, "{url}");
            assert_eq!(u.host, "r");
        }
    }

    #[test]
    fn ipv6_hosts_are_unbracketed() {
        let u = RouterUrl::parse("grpcs://[::1]:8443").unwrap();
        assert_eq!(u.host, "::1");
        assert_eq!(u.authority(), "[::1]:8443");
    }

    #[test]
    fn rejects_unknown_scheme_and_garbage() {
        assert!(matches!(
            RouterUrl::parse("https://r"),
            Err(RouterError::UnsupportedScheme { scheme, .. }) if scheme == "https"
        ));
        assert!(matches!(
            RouterUrl::parse("not a url"),
            Err(RouterError::InvalidUrl { .. })
        ));
        assert!(matches!(
            RouterUrl::parse("/only/a/path"),
            Err(RouterError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn cert_dir_fills_only_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("router.example.crt"), "ca").unwrap();

        let t = DialTarget::new("grpcs://router.example:443", "tok")
            .with_cert_dir(dir.path())
            .unwrap();
        assert_eq!(t.tls_ca_file, Some(dir.path().join("router.example.crt")));
        assert_eq!(t.tls_cert_file, None);
        assert_eq!(t.tls_key_file, None);
    }

    #[test]
    fn explicit_paths_win_over_cert_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("r.crt"), "ca").unwrap();

        let mut t = DialTarget::new("grpcs://r", "tok");
        t.tls_ca_file = Some(PathBuf::from("/etc/ssl/mine.crt"));
        let t = t.with_cert_dir(dir.path()).unwrap();
        assert_eq!(t.tls_ca_file, Some(PathBuf::from("/etc/ssl/mine.crt")));
    }

    #[test]
    fn debug_hides_token() {
        let t = DialTarget::new("grpc://r", "glrt-secret");
        assert!(!format!("{t:?}").contains("glrt-secret"));
    }

    #[test]
    fn runner_tls_files_are_carried() {
        let cfg = RunnerConfig {
            token: "t".into(),
            tls_ca_file: "/ca.pem".into(),
            ..Default::default()
        };
        let t = DialTarget::for_runner("grpcs://r", &cfg);
        assert_eq!(t.tls_ca_file, Some(PathBuf::from("/ca.pem")));
        assert_eq!(t.tls_cert_file, None);
        assert_eq!(t.token, "t");
    }
}
