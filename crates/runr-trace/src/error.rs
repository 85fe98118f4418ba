use std::io;

use thiserror::Error;

/// A failed pipeline write.
///
/// `accepted` counts the input bytes that were fully processed before the
/// failing downstream write; nothing past that point reached the sink.
#[derive(Debug, Error)]
#[error("log write failed after {accepted} bytes: {source}")]
pub struct WriteError {
    /// Input bytes fully processed before the failure.
    pub accepted: usize,
    /// The downstream failure.
    #[source]
    pub source: io::Error,
}

impl WriteError {
    pub fn new(accepted: usize, source: io::Error) -> Self {
        Self { accepted, source }
    }

    /// Re-base the error onto the caller's input position.
    pub(crate) fn at(self, accepted: usize) -> Self {
        Self::new(accepted, self.source)
    }
}

impl From<WriteError> for io::Error {
    fn from(e: WriteError) -> Self {
        e.source
    }
}
