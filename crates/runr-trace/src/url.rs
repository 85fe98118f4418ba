use std::io;

use crate::{MASK, emit::Emitter, error::WriteError, sink::WriteCloser};

/// Query parameters whose values never reach the log, matched case-insensitively.
pub const SENSITIVE_PARAMS: [&str; 6] = [
    "private_token",
    "authenticity_token",
    "rss_token",
    "x-amz-signature",
    "x-amz-credential",
    "x-amz-security-token",
];

const MAX_KEY_LEN: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Looking for `?` or `&`.
    Scan,
    /// Reading a parameter name.
    Key,
    /// Dropping a sensitive value.
    Mask,
}

#[inline]
fn ends_value(b: u8) -> bool {
    matches!(b, b'&' | b'?') || b.is_ascii_whitespace() || b.is_ascii_control()
}

/// Replaces the values of sensitive URL query parameters with `[MASKED]`.
///
/// `...?private_token=abcd&id=1` becomes `...?private_token=[MASKED]&id=1`.
/// A value ends at the next `&`, `?`, whitespace or control byte.
pub struct UrlSanitizer<W> {
    inner: W,
    state: State,
    key: Vec<u8>,
}

impl<W: WriteCloser> UrlSanitizer<W> {
    /// Scrub URLs written to `inner`.
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            state: State::Scan,
            key: Vec::with_capacity(MAX_KEY_LEN + 1),
        }
    }
}

fn is_sensitive(key: &[u8]) -> bool {
    SENSITIVE_PARAMS.iter().any(|p| p.as_bytes() == key)
}

impl<W: WriteCloser> WriteCloser for UrlSanitizer<W> {
    fn write(&mut self, buf: &[u8]) -> Result<usize, WriteError> {
        let mut out = Emitter::new(&mut self.inner);
        let mut i = 0;

        while i < buf.len() {
            match self.state {
                State::Scan => match buf[i..].iter().position(|b| matches!(b, b'?' | b'&')) {
                    Some(off) => {
                        out.plain(&buf[i..=i + off], i);
                        i += off + 1;
                        self.key.clear();
                        self.state = State::Key;
                    }
                    None => {
                        out.plain(&buf[i..], i);
                        i = buf.len();
                    }
                },
                State::Key => {
                    let c = buf[i];
                    if c == b'=' {
                        out.plain(&buf[i..=i], i);
                        i += 1;
                        self.state = if is_sensitive(&self.key) { State::Mask } else { State::Scan };
                    } else if c == b'?' || c == b'&' {
                        out.plain(&buf[i..=i], i);
                        i += 1;
                        self.key.clear();
                    } else if self.key.len() >= MAX_KEY_LEN {
                        self.state = State::Scan;
                    } else {
                        self.key.push(c.to_ascii_lowercase());
                        out.plain(&buf[i..=i], i);
                        i += 1;
                    }
                }
                State::Mask => {
                    i += buf[i..].iter().take_while(|b| !ends_value(**b)).count();
                    if i < buf.len() {
                        out.opaque(MASK, i)?;
                        self.state = State::Scan;
                    }
                }
            }
        }

        out.flush()?;
        Ok(buf.len())
    }

    fn write_opaque(&mut self, buf: &[u8]) -> Result<(), WriteError> {
        match self.state {
            State::Mask => Ok(()),
            State::Key | State::Scan => {
                self.state = State::Scan;
                self.inner.write_opaque(buf)
            }
        }
    }

    fn close(&mut self) -> io::Result<()> {
        if self.state == State::Mask {
            self.inner.write_opaque(MASK)?;
        }
        self.state = State::Scan;
        self.inner.close()
    }
}
