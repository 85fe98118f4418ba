use thiserror::Error;

/// Why a call to the upstream service did not produce an answer.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("request to {url} failed: {reason}")]
    Transport { url: String, reason: String },

    #[error("unexpected status {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("failed to decode response from {url}: {reason}")]
    Decode { url: String, reason: String },

    #[error("request canceled")]
    Canceled,
}
