//! Byte-stream log pipeline: line framing with timestamps plus secret masking.
//!
//! Data written to a [`LogStream`] passes, outermost first, through phrase
//! masking, URL parameter scrubbing, token prefix masking and the
//! [`Timestamper`] before reaching the shared sink. Masking stages hold back
//! partial matches between writes, so a secret is masked no matter how the
//! producer splits its output.
mod emit;

mod error;
pub use error::WriteError;

mod sink;
pub use sink::{IoSink, SharedSink, WriteCloser};

mod timestamper;
pub use timestamper::{Clock, StreamType, SystemClock, Timestamper};

mod token;
pub use token::{DEFAULT_TOKEN_PREFIX, MAX_TOKEN_PREFIXES, TokenSanitizer, mask_tokens, token_prefixes};

mod url;
pub use url::{SENSITIVE_PARAMS, UrlSanitizer};

mod phrase;
pub use phrase::{PhraseMasker, mask_phrases};

mod logger;
pub use logger::{
    BuildLogger, LogStream, Options, STREAM_EXECUTOR_LEVEL, STREAM_STARTING_SERVICE_LEVEL,
    STREAM_WORK_LEVEL,
};

/// Replacement emitted in place of every masked secret.
pub const MASK: &[u8] = b"[MASKED]";
