use thiserror::Error;

/// Validation and decoding errors of the shared model.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("unknown build state: {0}")]
    UnknownBuildState(String),

    #[error("invalid store config: {0}")]
    InvalidStoreConfig(String),

    #[error("invalid runner config: {0}")]
    InvalidRunnerConfig(String),

    #[error("invalid model: {0}")]
    Invalid(String),
}

pub type ModelResult<T> = Result<T, ModelError>;
