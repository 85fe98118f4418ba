use std::io;

use thiserror::Error;

use runr_model::Job;

/// Failures turning a job into bytes or back.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("cbor encode: {0}")]
    Encode(#[from] ciborium::ser::Error<io::Error>),

    #[error("cbor decode: {0}")]
    Decode(#[from] ciborium::de::Error<io::Error>),
}

/// CBOR encoding of a whole [`Job`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CborCodec;

impl CborCodec {
    /// Serialize `job` into one self-contained record.
    pub fn encode(&self, job: &Job) -> Result<Vec<u8>, CodecError> {
        let mut buf = Vec::with_capacity(512);
        ciborium::into_writer(job, &mut buf)?;
        Ok(buf)
    }

    /// Read one record from `r`.
    pub fn decode<R: io::Read>(&self, r: R) -> Result<Job, CodecError> {
        Ok(ciborium::from_reader(r)?)
    }
}
