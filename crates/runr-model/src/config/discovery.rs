use serde::{Deserialize, Serialize};

use crate::TlsData;

/// Alternate job dispatch endpoint announced by upstream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterDiscovery {
    /// Router URL; the scheme is one of `grpc`, `grpcs`, `ws`, `wss`.
    pub server_url: String,
    #[serde(default)]
    pub tls_data: TlsData,
}
