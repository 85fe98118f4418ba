use std::{io, sync::Arc, time::SystemTime};

use runr_observe::format_utc_micros;

use crate::{error::WriteError, sink::WriteCloser};

/// In-memory bound for an unterminated line. Not a line length limit.
const BUF_SIZE: usize = 8 * 1024;

const HEX: &[u8; 16] = b"0123456789abcdef";
const FULL_LINE: u8 = b' ';
const PARTIAL_LINE: u8 = b'+';

/// Which output of the producer a stream carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamType {
    Stdout,
    Stderr,
}

impl StreamType {
    /// Byte written into line headers.
    #[inline]
    pub fn as_byte(&self) -> u8 {
        match self {
            StreamType::Stdout => b'O',
            StreamType::Stderr => b'E',
        }
    }
}

/// Source of header timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Splits a byte stream into framed lines.
///
/// Every emitted line starts with a fixed-width header:
/// `<YYYY-MM-DDThh:mm:ss.ffffffZ> <stream id as 2 hex><O|E><' '|'+'>`.
/// The date and its trailing space are left out when timestamps are off.
///
/// A line is emitted for each `\n`. Without a newline, input up to the last
/// `\r` is flushed as a line of its own so progress bars stay live, and the
/// next line is flagged `+` as a continuation. Unterminated input is held
/// until it exceeds the buffer bound, at which point it is flushed as a
/// partial line.
pub struct Timestamper<W> {
    inner: W,
    buf: Vec<u8>,
    stream_id: u8,
    stream_type: StreamType,
    flag: u8,
    timestamps: bool,
    clock: Arc<dyn Clock>,
}

impl<W: WriteCloser> Timestamper<W> {
    /// Frame lines for stream `stream_id`, timestamped by the system clock.
    pub fn new(inner: W, stream_type: StreamType, stream_id: u8) -> Self {
        Self {
            inner,
            buf: Vec::new(),
            stream_id,
            stream_type,
            flag: FULL_LINE,
            timestamps: true,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Emit headers without the date.
    pub fn without_timestamps(mut self) -> Self {
        self.timestamps = false;
        self
    }

    /// Header width for this configuration.
    pub fn header_len(&self) -> usize {
        if self.timestamps { 27 + 1 + 4 } else { 4 }
    }

    fn header(&mut self) -> Vec<u8> {
        let mut h = Vec::with_capacity(self.header_len());
        if self.timestamps {
            h.extend_from_slice(format_utc_micros(self.clock.now()).as_bytes());
            h.push(b' ');
        }
        h.push(HEX[usize::from(self.stream_id >> 4)]);
        h.push(HEX[usize::from(self.stream_id & 0x0f)]);
        h.push(self.stream_type.as_byte());
        h.push(self.flag);
        self.flag = FULL_LINE;
        h
    }

    fn emit(&mut self, bytes: &[u8], accepted: usize) -> Result<(), WriteError> {
        self.inner.write(bytes).map(|_| ()).map_err(|e| e.at(accepted))
    }

    fn emit_header(&mut self, accepted: usize) -> Result<(), WriteError> {
        let header = self.header();
        self.emit(&header, accepted)
    }

    fn flush_buf(&mut self, accepted: usize) -> Result<(), WriteError> {
        let buf = std::mem::take(&mut self.buf);
        let res = self.emit(&buf, accepted);
        self.buf = buf;
        self.buf.clear();
        res
    }

    fn write_lines(&mut self, p: &[u8]) -> Result<usize, WriteError> {
        let Some(idx) = p.iter().position(|b| *b == b'\n') else {
            return Ok(0);
        };

        let mut n = 0;
        if !self.buf.is_empty() {
            self.flush_buf(0)?;
            self.emit(&p[..=idx], 0)?;
            n = idx + 1;
        }

        while let Some(idx) = p[n..].iter().position(|b| *b == b'\n') {
            self.emit_header(n)?;
            self.emit(&p[n..=n + idx], n)?;
            n += idx + 1;
        }
        Ok(n)
    }

    fn write_carriage_returns(&mut self, p: &[u8], base: usize) -> Result<usize, WriteError> {
        let Some(idx) = p.iter().rposition(|b| *b == b'\r') else {
            return Ok(0);
        };

        if self.buf.is_empty() {
            self.emit_header(base)?;
        } else {
            self.flush_buf(base)?;
        }

        self.flag = PARTIAL_LINE;
        self.emit(&p[..=idx], base)?;
        self.emit(b"\n", base + idx + 1)?;
        Ok(idx + 1)
    }

    fn buffer(&mut self, p: &[u8], base: usize) -> Result<usize, WriteError> {
        if p.is_empty() {
            return Ok(0);
        }

        if p.len() + self.buf.len() > BUF_SIZE {
            if self.buf.is_empty() {
                self.emit_header(base)?;
            } else {
                self.flush_buf(base)?;
            }
            self.flag = PARTIAL_LINE;
            self.emit(p, base)?;
            self.emit(b"\n", base + p.len())?;
            return Ok(p.len());
        }

        if self.buf.is_empty() {
            let header = self.header();
            self.buf.extend_from_slice(&header);
        }
        self.buf.extend_from_slice(p);
        Ok(p.len())
    }
}

impl<W: WriteCloser> WriteCloser for Timestamper<W> {
    fn write(&mut self, p: &[u8]) -> Result<usize, WriteError> {
        let mut n = self.write_lines(p)?;
        n += self.write_carriage_returns(&p[n..], n)?;
        n += self.buffer(&p[n..], n)?;
        Ok(n)
    }

    fn close(&mut self) -> io::Result<()> {
        if !self.buf.is_empty() {
            self.buf.push(b'\n');
            self.flush_buf(0)?;
        }
        self.inner.close()
    }
}
