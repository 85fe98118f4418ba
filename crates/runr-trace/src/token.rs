use std::io;

use tracing::warn;

use crate::{
    MASK,
    emit::{Emitter, Matcher},
    error::WriteError,
    sink::WriteCloser,
};

/// Prefix of personal access tokens, always masked.
pub const DEFAULT_TOKEN_PREFIX: &str = "glpat-";

/// At most this many distinct prefixes get a stage.
pub const MAX_TOKEN_PREFIXES: usize = 10;

#[inline]
fn is_token_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'=')
}

/// Masks the body of every `<prefix><token alphabet>+` word.
///
/// The prefix itself is kept; the body, made of `[A-Za-z0-9._=-]`, becomes
/// `[MASKED]`. A prefix with an empty body is left untouched.
pub struct TokenSanitizer<W> {
    inner: W,
    matcher: Matcher,
    masking: bool,
    body_seen: bool,
}

impl<W: WriteCloser> TokenSanitizer<W> {
    /// `prefix` must not be empty.
    pub fn new(inner: W, prefix: &str) -> Self {
        Self {
            inner,
            matcher: Matcher::new(prefix.as_bytes()),
            masking: false,
            body_seen: false,
        }
    }
}

impl<W: WriteCloser> WriteCloser for TokenSanitizer<W> {
    fn write(&mut self, buf: &[u8]) -> Result<usize, WriteError> {
        let mut out = Emitter::new(&mut self.inner);
        let mut i = 0;

        while i < buf.len() {
            if self.masking {
                let body = buf[i..].iter().take_while(|b| is_token_byte(**b)).count();
                if body > 0 {
                    self.body_seen = true;
                    i += body;
                    continue;
                }
                self.masking = false;
                if std::mem::take(&mut self.body_seen) {
                    out.opaque(MASK, i)?;
                }
                continue;
            }

            if self.matcher.is_idle() {
                match self.matcher.skip(&buf[i..]) {
                    Some(off) => {
                        out.plain(&buf[i..i + off], i);
                        i += off;
                    }
                    None => {
                        out.plain(&buf[i..], i);
                        break;
                    }
                }
            }

            let step = self.matcher.step(buf[i]);
            out.plain(&self.matcher.pattern()[..step.released], i);
            if !step.consumed {
                out.plain(&buf[i..=i], i);
            }
            i += 1;

            if step.complete {
                out.plain(self.matcher.pattern(), i);
                self.masking = true;
            }
        }

        out.flush()?;
        Ok(buf.len())
    }

    fn write_opaque(&mut self, buf: &[u8]) -> Result<(), WriteError> {
        if self.masking {
            self.body_seen = true;
            return Ok(());
        }

        let held = self.matcher.take_held();
        let mut out = Emitter::new(&mut self.inner);
        out.plain(&self.matcher.pattern()[..held], 0);
        out.opaque(buf, 0)
    }

    fn close(&mut self) -> io::Result<()> {
        let held = self.matcher.take_held();
        let mut out = Emitter::new(&mut self.inner);
        if std::mem::take(&mut self.masking) && std::mem::take(&mut self.body_seen) {
            out.opaque(MASK, 0)?;
        }
        out.plain(&self.matcher.pattern()[..held], 0);
        out.flush()?;
        self.inner.close()
    }
}

/// Normalise configured prefixes: add the default, trim, drop empties and
/// duplicates, order shortest first and keep at most [`MAX_TOKEN_PREFIXES`].
pub fn token_prefixes<S: AsRef<str>>(configured: &[S]) -> Vec<String> {
    let mut all: Vec<&str> = configured
        .iter()
        .map(|p| p.as_ref().trim())
        .chain(std::iter::once(DEFAULT_TOKEN_PREFIX))
        .filter(|p| !p.is_empty())
        .collect();
    all.sort_by_key(|p| p.len());

    let mut unique: Vec<String> = Vec::new();
    for prefix in all {
        if unique.iter().any(|u| u == prefix) {
            continue;
        }
        if unique.len() == MAX_TOKEN_PREFIXES {
            warn!(prefix, limit = MAX_TOKEN_PREFIXES, "token prefix ignored, too many prefixes");
            continue;
        }
        unique.push(prefix.to_string());
    }
    unique
}

/// Stack one [`TokenSanitizer`] per prefix over `inner`, shortest innermost.
///
/// `prefixes` is expected in [`token_prefixes`] form.
pub fn mask_tokens<'a>(
    inner: Box<dyn WriteCloser + 'a>,
    prefixes: &[String],
) -> Box<dyn WriteCloser + 'a> {
    prefixes.iter().fold(inner, |w, prefix| {
        Box::new(TokenSanitizer::new(w, prefix)) as Box<dyn WriteCloser + 'a>
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::IoSink;

    fn run(prefix: &str, chunks: &[&str]) -> String {
        let mut s = TokenSanitizer::new(IoSink(Vec::new()), prefix);
        for c in chunks {
            s.write(c.as_bytes()).unwrap();
        }
        s.close().unwrap();
        String::from_utf8(s.inner.0).unwrap()
    }

    #[test]
    fn masks_token_body() {
        assert_eq!(run("glpat-", &["Lorem glpat-ipsum end"]), "Lorem glpat-[MASKED] end");
    }

    #[test]
    fn masks_across_write_boundaries() {
        assert_eq!(run("glpat-", &["Lorem glpat", "-ipsum end"]), "Lorem glpat-[MASKED] end");
        assert_eq!(run("glpat-", &["Lorem glpat-ip", "sum end"]), "Lorem glpat-[MASKED] end");
        assert_eq!(run("glpat-", &["g", "l", "p", "a", "t", "-", "x", " "]), "glpat-[MASKED] ");
    }

    #[test]
    fn close_mid_body_emits_mask() {
        assert_eq!(run("glpat-", &["token: glpat-abc"]), "token: glpat-[MASKED]");
    }

    #[test]
    fn close_mid_prefix_flushes_content() {
        assert_eq!(run("glpat-", &["see glpa"]), "see glpa");
    }

    #[test]
    fn empty_body_is_untouched() {
        assert_eq!(run("glpat-", &["glpat- and glpat-!"]), "glpat- and glpat-!");
    }

    #[test]
    fn self_overlapping_prefix_is_found() {
        assert_eq!(run("aab", &["xaaabzz!"]), "xaaab[MASKED]!");
    }

    #[test]
    fn opaque_inside_body_is_absorbed() {
        let mut s = TokenSanitizer::new(IoSink(Vec::new()), "glpat-");
        s.write(b"glpat-abc").unwrap();
        s.write_opaque(MASK).unwrap();
        s.write(b"def end").unwrap();
        s.close().unwrap();
        assert_eq!(s.inner.0, b"glpat-[MASKED] end");
    }

    #[test]
    fn opaque_releases_partial_prefix() {
        let mut s = TokenSanitizer::new(IoSink(Vec::new()), "glpat-");
        s.write(b"glp").unwrap();
        s.write_opaque(MASK).unwrap();
        s.close().unwrap();
        assert_eq!(s.inner.0, b"glp[MASKED]");
    }

    #[test]
    fn prefixes_are_normalised() {
        let got = token_prefixes(&[" ghp_ ", "", "glpat-", "a-very-long-prefix-"]);
        assert_eq!(got, vec!["ghp_", "glpat-", "a-very-long-prefix-"]);
    }

    #[test]
    fn prefixes_are_capped() {
        let many: Vec<String> = (0..15).map(|i| format!("p{i:02}_")).collect();
        let got = token_prefixes(&many);
        assert_eq!(got.len(), MAX_TOKEN_PREFIXES);
        assert!(got.iter().any(|p| p == "p00_"));
    }
}
