use std::{collections::HashMap, io::Read, time::Duration};

use tracing::{info, warn};

use crate::proto;

const CALLBACK_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_DRAIN: u64 = 64 * 1024;

/// HTTP request sent once the wrapped process has stopped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownCallback {
    /// Absolute URL to call.
    pub url: String,
    /// Empty means `GET`.
    pub method: String,
    pub headers: HashMap<String, String>,
}

impl ShutdownCallback {
    /// `GET` request to `url` without headers.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    /// Add a header; a repeated key replaces the earlier value.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    fn method(&self) -> &str {
        if self.method.is_empty() { "GET" } else { &self.method }
    }

    /// Perform the request. Failures are logged, never returned.
    pub async fn run(&self) {
        let this = self.clone();
        match tokio::task::spawn_blocking(move || this.call()).await {
            Ok(Ok(code)) => info!(target_url = %self.url, status_code = code, "shutdown callback sent"),
            Ok(Err(e)) => warn!(target_url = %self.url, error = %e, "shutdown callback failed"),
            Err(e) => warn!(target_url = %self.url, error = %e, "shutdown callback task failed"),
        }
    }

    fn call(&self) -> Result<u16, Box<ureq::Error>> {
        let agent = ureq::AgentBuilder::new().timeout(CALLBACK_TIMEOUT).build();
        let mut req = agent.request(self.method(), &self.url);
        for (k, v) in &self.headers {
            req = req.set(k, v);
        }

        let resp = match req.call() {
            Ok(resp) => resp,
            Err(ureq::Error::Status(_, resp)) => resp,
            Err(e) => return Err(Box::new(e)),
        };

        let code = resp.status();
        let mut sink = Vec::new();
        let _ = resp.into_reader().take(MAX_DRAIN).read_to_end(&mut sink);
        Ok(code)
    }
}

impl From<proto::ShutdownCallback> for ShutdownCallback {
    fn from(c: proto::ShutdownCallback) -> Self {
        Self {
            url: c.url,
            method: c.method,
            headers: c.headers,
        }
    }
}

impl From<ShutdownCallback> for proto::ShutdownCallback {
    fn from(c: ShutdownCallback) -> Self {
        Self {
            url: c.url,
            method: c.method,
            headers: c.headers,
        }
    }
}
