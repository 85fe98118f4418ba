use serde::{Deserialize, Serialize};

/// Runner identity reported with every job request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VersionInfo {
    /// Product name, `runr` for this build.
    pub name: String,
    pub version: String,
    pub revision: String,
    /// Operating system the runner runs on.
    pub platform: String,
    pub architecture: String,
    /// Executor that will run the job, empty if undecided.
    pub executor: String,
    pub shell: String,
}

impl VersionInfo {
    /// Identity of this build of the runner.
    pub fn current(name: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            platform: std::env::consts::OS.to_string(),
            architecture: std::env::consts::ARCH.to_string(),
            ..Default::default()
        }
    }
}

/// Interactive session endpoint advertised to upstream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionInfo {
    /// Base URL of the session server.
    pub url: String,
    /// PEM certificate presented by the session server.
    pub certificate: String,
    /// Value upstream must send in the `Authorization` header.
    pub authorization: String,
}

/// Body of a job request, sent as JSON both to the HTTP API and the router.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequest {
    pub info: VersionInfo,
    /// Runner authentication token.
    pub token: String,
    /// Omitted when empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub system_id: String,
    /// Opaque cursor returned by the previous poll.
    ///
    /// Upstream uses it to hold the request open until something changed.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_update: String,
    /// Present when the runner offers interactive sessions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionInfo>,
}
