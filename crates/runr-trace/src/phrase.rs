use std::io;

use crate::{
    MASK,
    emit::{Emitter, Matcher},
    error::WriteError,
    sink::WriteCloser,
};

/// Replaces every occurrence of one literal phrase with `[MASKED]`.
pub struct PhraseMasker<W> {
    inner: W,
    matcher: Matcher,
}

impl<W: WriteCloser> PhraseMasker<W> {
    /// `phrase` must not be empty.
    pub fn new(inner: W, phrase: &str) -> Self {
        Self {
            inner,
            matcher: Matcher::new(phrase.as_bytes()),
        }
    }
}

impl<W: WriteCloser> WriteCloser for PhraseMasker<W> {
    fn write(&mut self, buf: &[u8]) -> Result<usize, WriteError> {
        let mut out = Emitter::new(&mut self.inner);
        let mut i = 0;

        while i < buf.len() {
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
                out.opaque(MASK, i)?;
            }
        }

        out.flush()?;
        Ok(buf.len())
    }

    fn write_opaque(&mut self, buf: &[u8]) -> Result<(), WriteError> {
        let held = self.matcher.take_held();
        let mut out = Emitter::new(&mut self.inner);
        out.plain(&self.matcher.pattern()[..held], 0);
        out.opaque(buf, 0)
    }

    fn close(&mut self) -> io::Result<()> {
        let held = self.matcher.take_held();
        let mut out = Emitter::new(&mut self.inner);
        out.plain(&self.matcher.pattern()[..held], 0);
        out.flush()?;
        self.inner.close()
    }
}

/// Stack one [`PhraseMasker`] per distinct non-empty phrase, longest outermost.
pub fn mask_phrases<'a, S: AsRef<str>>(
    inner: Box<dyn WriteCloser + 'a>,
    phrases: &[S],
) -> Box<dyn WriteCloser + 'a> {
    let mut unique: Vec<&str> = Vec::new();
    for phrase in phrases.iter().map(AsRef::as_ref) {
        if !phrase.is_empty() && !unique.contains(&phrase) {
            unique.push(phrase);
        }
    }
    unique.sort_by_key(|p| p.len());

    unique.into_iter().fold(inner, |w, phrase| {
        Box::new(PhraseMasker::new(w, phrase)) as Box<dyn WriteCloser + 'a>
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::IoSink;

    fn run(phrase: &str, chunks: &[&str]) -> String {
        let mut s = PhraseMasker::new(IoSink(Vec::new()), phrase);
        for c in chunks {
            s.write(c.as_bytes()).unwrap();
        }
        s.close().unwrap();
        String::from_utf8(s.inner.0).unwrap()
    }

    #[test]
    fn masks_phrase_anywhere() {
        assert_eq!(run("hunter2", &["pw=hunter2; again hunter2"]), "pw=[MASKED]; again [MASKED]");
    }

    #[test]
    fn masks_across_write_boundaries() {
        assert_eq!(run("hunter2", &["pw=hun", "te", "r2!"]), "pw=[MASKED]!");
    }

    #[test]
    fn partial_phrase_is_released_on_close() {
        assert_eq!(run("hunter2", &["hunt"]), "hunt");
    }

    #[test]
    fn overlapping_false_start() {
        assert_eq!(run("abab", &["aababab"]), "a[MASKED]ab");
    }
}
