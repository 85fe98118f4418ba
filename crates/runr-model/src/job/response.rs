use serde::{Deserialize, Serialize};

/// Trust material attached to a job routed through an alternate authority.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsData {
    /// PEM bundle to trust instead of system roots.
    pub ca_chain: String,
    pub auth_cert: String,
    pub auth_key: String,
}

impl TlsData {
    /// True when no field is set; such data is not serialized.
    pub fn is_empty(&self) -> bool {
        self.ca_chain.is_empty() && self.auth_cert.is_empty() && self.auth_key.is_empty()
    }
}

/// Descriptive fields of a job, used for logging.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobInfo {
    pub name: String,
    pub stage: String,
    pub project_id: u64,
    pub project_name: String,
}

/// A job variable as delivered by the upstream service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobVariable {
    pub key: String,
    pub value: String,
    pub public: bool,
    /// Value must be masked in the build log.
    pub masked: bool,
    /// Value is written to a file and the variable holds its path.
    pub file: bool,
    /// Value is not expanded.
    pub raw: bool,
}

/// Work description received from upstream.
///
/// Fields the runner core does not interpret are kept in `extra` so a
/// persisted job round-trips without losing payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobResponse {
    /// Upstream job id, unique per instance.
    pub id: u64,
    /// Job token. Authenticates trace and status updates, always masked.
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub job_info: JobInfo,
    #[serde(default)]
    pub variables: Vec<JobVariable>,
    #[serde(default, skip_serializing_if = "TlsData::is_empty")]
    pub tls_data: TlsData,
    /// Request id echoed back in logs, empty when upstream sent none.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub correlation_id: String,
    /// Every field not listed above, preserved verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl JobResponse {
    /// Values of variables flagged as masked, empty ones skipped.
    pub fn masked_values(&self) -> Vec<String> {
        self.variables
            .iter()
            .filter(|v| v.masked && !v.value.is_empty())
            .map(|v| v.value.clone())
            .collect()
    }
}
