use std::time::Duration;

use hyper_util::rt::TokioIo;
use tonic::{
    Request, Status,
    metadata::{Ascii, MetadataValue},
    service::Interceptor,
    transport::{Channel, Endpoint, Uri},
};
use tower::service_fn;

use crate::{
    config::RouterClientConfig,
    error::RouterError,
    target::{DialTarget, RouterUrl, Scheme},
    tls::TlsMaterial,
    tunnel::WsDialer,
};

/// Metadata key of the bearer token.
pub const AUTHORIZATION_KEY: &str = "authorization";
/// Metadata key naming the kind of agent calling.
pub const AGENT_TYPE_KEY: &str = "gitlab-agent-type";
pub const AGENT_TYPE: &str = "runner";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-call credentials: bearer token plus the agent type header.
#[derive(Clone)]
pub struct TokenAuth {
    bearer: MetadataValue<Ascii>,
}

impl TokenAuth {
    /// Fails when `token` cannot be carried in a header.
    pub fn new(token: &str) -> Result<Self, RouterError> {
        let bearer = format!("Bearer {token}")
            .parse()
            .map_err(|_| RouterError::InvalidToken)?;
        Ok(Self { bearer })
    }
}

impl Interceptor for TokenAuth {
    fn call(&mut self, mut req: Request<()>) -> Result<Request<()>, Status> {
        let md = req.metadata_mut();
        md.insert(AUTHORIZATION_KEY, self.bearer.clone());
        md.insert(AGENT_TYPE_KEY, MetadataValue::from_static(AGENT_TYPE));
        Ok(req)
    }
}

/// Build a lazily connecting channel for `target`.
///
/// Reads TLS files but performs no network I/O; the first call dials.
pub fn connect(target: &DialTarget, config: &RouterClientConfig) -> Result<Channel, RouterError> {
    let url = RouterUrl::parse(&target.url)?;
    let tls = if url.scheme.is_tls() {
        TlsMaterial::load(target)?
    } else {
        TlsMaterial::default()
    };

    let endpoint = |uri: String| -> Result<Endpoint, RouterError> {
        Ok(Endpoint::from_shared(uri)?
            .user_agent(config.user_agent.as_str())
            .map_err(|_| RouterError::InvalidUserAgent(config.user_agent.clone()))?
            .connect_timeout(CONNECT_TIMEOUT)
            .http2_keep_alive_interval(config.keepalive())
            .keep_alive_while_idle(true))
    };

    match url.scheme {
        Scheme::Grpc => Ok(endpoint(format!("http://{}", url.authority()))?.connect_lazy()),
        Scheme::Grpcs => Ok(endpoint(format!("https://{}", url.authority()))?
            .tls_config(tls.tonic_config(&url.host))?
            .connect_lazy()),
        Scheme::Ws | Scheme::Wss => {
            let endpoint = endpoint(format!("http://{}", url.authority()))?;
            let rustls = match url.scheme {
                Scheme::Wss => Some(tls.rustls_config()?),
                _ => None,
            };
            let dialer = WsDialer::new(
                url.as_str(),
                &target.token,
                &config.user_agent,
                rustls,
                config.ws_max_message_size,
            )
            .map_err(|_| RouterError::InvalidToken)?;

            // The endpoint URI only names the :authority; the dialer picks the socket.
            let connector = service_fn(move |_: Uri| {
                let dialer = dialer.clone();
                async move { dialer.dial().await.map(TokioIo::new) }
            });
            Ok(endpoint.connect_with_connector_lazy(connector))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interceptor_sets_auth_headers() {
        let mut auth = TokenAuth::new("glrt-abc").unwrap();
        let req = auth.call(Request::new(())).unwrap();
        let md = req.metadata();
        let get = |k: &str| md.get(k).and_then(|v| v.to_str().ok());
        assert_eq!(get(AUTHORIZATION_KEY), Some("Bearer glrt-abc"));
        assert_eq!(get(AGENT_TYPE_KEY), Some("runner"));
    }

    #[test]
    fn token_with_newline_is_rejected() {
        assert!(matches!(TokenAuth::new("bad\ntoken"), Err(RouterError::InvalidToken)));
    }

    #[tokio::test]
    async fn plain_and_tunnel_schemes_build_lazy_channels() {
        let cfg = RouterClientConfig::default();
        for url in ["grpc://127.0.0.1:1", "ws://127.0.0.1:1/t", "wss://127.0.0.1:1/t"] {
            connect(&DialTarget::new(url, "tok"), &cfg).unwrap_or_else(|e| panic!("{url}: {e}"));
        }
    }

    #[tokio::test]
    async fn unsupported_scheme_fails_before_dialing() {
        let err = connect(&DialTarget::new("http://r", "tok"), &RouterClientConfig::default())
            .unwrap_err();
        assert!(matches!(err, RouterError::UnsupportedScheme { .. }));
    }
}
