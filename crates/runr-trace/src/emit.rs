use crate::{error::WriteError, sink::WriteCloser};

/// Collects plain output of one stage call and forwards it in order with
/// opaque regions.
///
/// Errors are reported at the input offset where the failed output started.
pub(crate) struct Emitter<'a, W: ?Sized> {
    inner: &'a mut W,
    pending: Vec<u8>,
    from: usize,
}

impl<'a, W: WriteCloser + ?Sized> Emitter<'a, W> {
    pub(crate) fn new(inner: &'a mut W) -> Self {
        Self {
            inner,
            pending: Vec::new(),
            from: 0,
        }
    }

    /// Queue content that originated at input offset `at`.
    pub(crate) fn plain(&mut self, bytes: &[u8], at: usize) {
        if bytes.is_empty() {
            return;
        }
        if self.pending.is_empty() {
            self.from = at;
        }
        self.pending.extend_from_slice(bytes);
    }

    pub(crate) fn opaque(&mut self, bytes: &[u8], at: usize) -> Result<(), WriteError> {
        self.flush()?;
        self.inner.write_opaque(bytes).map_err(|e| e.at(at))
    }

    pub(crate) fn flush(&mut self) -> Result<(), WriteError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let from = self.from;
        self.inner.write(&self.pending).map_err(|e| e.at(from))?;
        self.pending.clear();
        Ok(())
    }
}

/// Outcome of feeding one byte to a [`Matcher`].
pub(crate) struct Step {
    /// Leading pattern bytes no longer part of a candidate match.
    pub released: usize,
    /// Whether the byte extended the match.
    pub consumed: bool,
    /// Whether the whole pattern has now been seen.
    pub complete: bool,
}

/// Streaming single-pattern matcher.
///
/// The held bytes are always `pattern[..matched]`. On a mismatch the
/// longest border of the held bytes stays held and the rest is released,
/// so overlapping candidates such as `aab` inside `aaab` are not lost.
pub(crate) struct Matcher {
    pattern: Vec<u8>,
    fail: Vec<usize>,
    matched: usize,
}

impl Matcher {
    pub(crate) fn new(pattern: &[u8]) -> Self {
        Self {
            fail: failure_table(pattern),
            pattern: pattern.to_vec(),
            matched: 0,
        }
    }

    #[inline]
    pub(crate) fn pattern(&self) -> &[u8] {
        &self.pattern
    }

    #[inline]
    pub(crate) fn is_idle(&self) -> bool {
        self.matched == 0
    }

    /// Offset of the next byte in `buf` that could start a match.
    #[inline]
    pub(crate) fn skip(&self, buf: &[u8]) -> Option<usize> {
        let first = self.pattern[0];
        buf.iter().position(|b| *b == first)
    }

    pub(crate) fn step(&mut self, c: u8) -> Step {
        let mut released = 0;
        while self.matched > 0 && self.pattern[self.matched] != c {
            let border = self.fail[self.matched - 1];
            released += self.matched - border;
            self.matched = border;
        }

        if self.pattern[self.matched] != c {
            return Step {
                released,
                consumed: false,
                complete: false,
            };
        }

        self.matched += 1;
        let complete = self.matched == self.pattern.len();
        if complete {
            self.matched = 0;
        }
        Step {
            released,
            consumed: true,
            complete,
        }
    }

    /// Give up the current candidate; returns how many pattern bytes were held.
    pub(crate) fn take_held(&mut self) -> usize {
        std::mem::take(&mut self.matched)
    }
}

/// `fail[i]` is the length of the longest proper border of `pattern[..=i]`.
fn failure_table(pattern: &[u8]) -> Vec<usize> {
    let mut fail = vec![0; pattern.len()];
    let mut k = 0;
    for i in 1..pattern.len() {
        while k > 0 && pattern[i] != pattern[k] {
            k = fail[k - 1];
        }
        if pattern[i] == pattern[k] {
            k += 1;
        }
        fail[i] = k;
    }
    fail
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(m: &mut Matcher, input: &[u8]) -> (Vec<u8>, usize) {
        let mut out = Vec::new();
        let mut hits = 0;
        for &c in input {
            let step = m.step(c);
            out.extend_from_slice(&m.pattern()[..step.released]);
            if !step.consumed {
                out.push(c);
            }
            if step.complete {
                hits += 1;
                out.extend_from_slice(b"#");
            }
        }
        let held = m.take_held();
        out.extend_from_slice(&m.pattern()[..held]);
        (out, hits)
    }

    #[test]
    fn failure_table_for_self_overlapping_pattern() {
        assert_eq!(failure_table(b"aabaab"), vec![0, 1, 0, 1, 2, 3]);
        assert_eq!(failure_table(b"glpat-"), vec![0; 6]);
    }

    #[test]
    fn finds_match_after_overlapping_false_start() {
        let mut m = Matcher::new(b"aab");
        let (out, hits) = feed(&mut m, b"xaaab");
        assert_eq!(hits, 1);
        assert_eq!(out, b"xa#");
    }

    #[test]
    fn releases_partial_match_on_mismatch() {
        let mut m = Matcher::new(b"glpat-");
        let (out, hits) = feed(&mut m, b"glpa glp");
        assert_eq!(hits, 0);
        assert_eq!(out, b"glpa glp");
    }
}
