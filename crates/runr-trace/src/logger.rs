use std::{
    io,
    sync::{Arc, Mutex},
};

use runr_model::JobResponse;
use tracing::debug;

use crate::{
    error::WriteError,
    phrase::mask_phrases,
    sink::{SharedSink, WriteCloser},
    timestamper::{Clock, StreamType, SystemClock, Timestamper},
    token::{mask_tokens, token_prefixes},
    url::UrlSanitizer,
};

/// Stream id of the runner's own messages.
pub const STREAM_EXECUTOR_LEVEL: u8 = 0;
/// Stream id of job scripts.
pub const STREAM_WORK_LEVEL: u8 = 1;
/// Stream id of service containers starting up.
pub const STREAM_STARTING_SERVICE_LEVEL: u8 = 15;

/// What the pipeline masks and whether lines are timestamped.
#[derive(Debug, Clone)]
pub struct Options {
    /// Literal phrases replaced by `[MASKED]` wherever they appear.
    pub mask_phrases: Vec<String>,
    /// Token prefixes whose bodies are masked, on top of the built-in one.
    pub mask_token_prefixes: Vec<String>,
    /// Prefix every line with an RFC 3339 timestamp.
    pub timestamping: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            mask_phrases: Vec::new(),
            mask_token_prefixes: Vec::new(),
            timestamping: true,
        }
    }
}

impl Options {
    /// Masks the job token, every masked variable and the token prefixes
    /// listed under `features.token_mask_prefixes`.
    pub fn from_job(job: &JobResponse) -> Self {
        let mut mask_phrases = job.masked_values();
        if !job.token.is_empty() {
            mask_phrases.push(job.token.clone());
        }

        let mask_token_prefixes = job
            .extra
            .get("features")
            .and_then(|f| f.get("token_mask_prefixes"))
            .and_then(|p| p.as_array())
            .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();

        Self {
            mask_phrases,
            mask_token_prefixes,
            ..Self::default()
        }
    }
}

/// Builds masked, framed log streams over one shared sink.
#[derive(Clone)]
pub struct BuildLogger {
    sink: SharedSink,
    options: Options,
    prefixes: Vec<String>,
    clock: Arc<dyn Clock>,
}

impl BuildLogger {
    /// Logger writing to `sink`. Token prefixes are normalised once here.
    pub fn new(sink: SharedSink, options: Options) -> Self {
        let prefixes = token_prefixes(&options.mask_token_prefixes);
        Self {
            sink,
            options,
            prefixes,
            clock: Arc::new(SystemClock),
        }
    }

    /// Use `clock` for line timestamps.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Token prefixes in effect after normalisation.
    pub fn token_prefixes(&self) -> &[String] {
        &self.prefixes
    }

    /// Open a stream. Bytes written to it go through phrase masking, URL
    /// scrubbing, token masking and framing, in that order.
    pub fn stream(&self, stream_id: u8, stream_type: StreamType) -> LogStream {
        let mut ts = Timestamper::new(self.sink.clone(), stream_type, stream_id)
            .with_clock(Arc::clone(&self.clock));
        if !self.options.timestamping {
            ts = ts.without_timestamps();
        }

        let chain: Box<dyn WriteCloser> = Box::new(ts);
        let chain = mask_tokens(chain, &self.prefixes);
        let chain: Box<dyn WriteCloser> = Box::new(UrlSanitizer::new(chain));
        let chain = mask_phrases(chain, &self.options.mask_phrases);

        debug!(
            stream = stream_id,
            ?stream_type,
            phrases = self.options.mask_phrases.len(),
            prefixes = self.prefixes.len(),
            "log stream opened"
        );
        LogStream {
            chain: Mutex::new(Some(chain)),
        }
    }
}

/// Producer end of one pipeline. Safe to share between writers; each write
/// is applied atomically with respect to the others.
///
/// Closing flushes every stage. It is idempotent and also happens on drop.
pub struct LogStream {
    chain: Mutex<Option<Box<dyn WriteCloser>>>,
}

impl LogStream {
    /// Push `buf` through the pipeline.
    ///
    /// Fails with [`io::ErrorKind::BrokenPipe`] once the stream is closed.
    pub fn write_bytes(&self, buf: &[u8]) -> Result<usize, WriteError> {
        let mut guard = self
            .chain
            .lock()
            .map_err(|_| WriteError::new(0, io::Error::other("log stream lock poisoned")))?;
        match guard.as_mut() {
            Some(chain) => chain.write(buf),
            None => Err(WriteError::new(0, closed())),
        }
    }

    /// Flush every stage and detach from the sink.
    pub fn close(&self) -> io::Result<()> {
        let chain = self
            .chain
            .lock()
            .map_err(|_| io::Error::other("log stream lock poisoned"))?
            .take();
        match chain {
            Some(mut chain) => chain.close(),
            None => Ok(()),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.chain.lock().map(|g| g.is_none()).unwrap_or(true)
    }
}

fn closed() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "log stream closed")
}

impl io::Write for LogStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_bytes(buf).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl io::Write for &LogStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_bytes(buf).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for LogStream {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            debug!(error = %e, "log stream close on drop failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use super::*;

    #[derive(Clone, Default)]
    struct Capture(Arc<StdMutex<Vec<u8>>>);

    impl io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn logger(options: Options) -> (BuildLogger, Capture) {
        let capture = Capture::default();
        let logger = BuildLogger::new(SharedSink::new(capture.clone()), options);
        (logger, capture)
    }

    #[test]
    fn default_prefix_is_always_present() {
        let (logger, _) = logger(Options::default());
        assert_eq!(logger.token_prefixes(), ["glpat-".to_string()]);
    }

    #[test]
    fn close_is_idempotent_and_rejects_later_writes() {
        let (logger, capture) = logger(Options {
            timestamping: false,
            ..Options::default()
        });
        let stream = logger.stream(STREAM_WORK_LEVEL, StreamType::Stdout);

        stream.write_bytes(b"done").unwrap();
        stream.close().unwrap();
        stream.close().unwrap();
        assert!(stream.is_closed());

        let err = stream.write_bytes(b"late").unwrap_err();
        assert_eq!(err.source.kind(), io::ErrorKind::BrokenPipe);
        assert_eq!(&*capture.0.lock().unwrap(), b"01O done\n");
    }

    #[test]
    fn drop_flushes_buffered_line() {
        let (logger, capture) = logger(Options {
            timestamping: false,
            ..Options::default()
        });
        {
            let stream = logger.stream(STREAM_STARTING_SERVICE_LEVEL, StreamType::Stderr);
            stream.write_bytes(b"svc up").unwrap();
        }
        assert_eq!(&*capture.0.lock().unwrap(), b"0fE svc up\n");
    }

    #[test]
    fn options_from_job() {
        let job: JobResponse = serde_json::from_value(serde_json::json!({
            "id": 7,
            "token": "job-token-123",
            "variables": [
                {"key": "SECRET", "value": "s3cr3t", "masked": true},
                {"key": "PLAIN", "value": "visible"}
            ],
            "features": {"token_mask_prefixes": ["ghp_", "xoxb-"]}
        }))
        .unwrap();

        let opts = Options::from_job(&job);
        assert_eq!(opts.mask_phrases, vec!["s3cr3t", "job-token-123"]);
        assert_eq!(opts.mask_token_prefixes, vec!["ghp_", "xoxb-"]);
        assert!(opts.timestamping);
    }
}
