//! Job router client.
//!
//! [`RouterClient`] asks its delegate [`Network`](runr_core::Network) where
//! the job router lives, then requests jobs from it over gRPC (plain, TLS,
//! or tunneled through a WebSocket), reusing one pooled connection per
//! target. Without a router it falls back to the delegate.
pub mod proto;

mod api;
pub use api::{ApiNetwork, CORRELATION_ID_HEADER, RUNNER_TOKEN_HEADER};

mod client;
pub use client::{REQUEST_ID_KEY, RouterClient};

mod config;
pub use config::{
    DEFAULT_DISCOVERY_TTL, DEFAULT_KEEPALIVE, DEFAULT_WS_MAX_MESSAGE_SIZE, RouterClientConfig,
};

mod error;
pub use error::RouterError;

mod pool;
pub use pool::{ConnPool, HolderSnapshot, Lease, PoolSnapshot, RouterGrpcClient};

mod target;
pub use target::{DialTarget, RouterUrl, Scheme};

mod tls;
pub use tls::TlsMaterial;

mod transport;
pub use transport::{AGENT_TYPE, AGENT_TYPE_KEY, AUTHORIZATION_KEY, TokenAuth, connect};

mod tunnel;
pub use tunnel::{TUNNEL_SUBPROTOCOL, WsDialer, WsTunnel};
