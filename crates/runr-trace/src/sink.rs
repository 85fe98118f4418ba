use std::{
    io,
    sync::{Arc, Mutex},
};

use crate::error::WriteError;

/// A pipeline stage or sink.
///
/// `write` either accepts the whole buffer or fails; there are no short
/// writes. `write_opaque` carries bytes that were produced by masking: they
/// are final, and later stages must forward them without scanning.
pub trait WriteCloser: Send {
    fn write(&mut self, buf: &[u8]) -> Result<usize, WriteError>;

    fn write_opaque(&mut self, buf: &[u8]) -> Result<(), WriteError> {
        self.write(buf).map(|_| ())
    }

    /// Flush held state downstream, then close the inner writer.
    fn close(&mut self) -> io::Result<()>;
}

impl<W: WriteCloser + ?Sized> WriteCloser for Box<W> {
    fn write(&mut self, buf: &[u8]) -> Result<usize, WriteError> {
        (**self).write(buf)
    }

    fn write_opaque(&mut self, buf: &[u8]) -> Result<(), WriteError> {
        (**self).write_opaque(buf)
    }

    fn close(&mut self) -> io::Result<()> {
        (**self).close()
    }
}

/// Adapts any [`io::Write`] into a terminal [`WriteCloser`]. Close flushes.
#[derive(Debug)]
pub struct IoSink<W>(pub W);

impl<W: io::Write + Send> WriteCloser for IoSink<W> {
    fn write(&mut self, buf: &[u8]) -> Result<usize, WriteError> {
        self.0.write_all(buf).map_err(|e| WriteError::new(0, e))?;
        Ok(buf.len())
    }

    fn close(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

/// Sink shared by several streams. Closing a handle only flushes.
#[derive(Clone)]
pub struct SharedSink {
    inner: Arc<Mutex<dyn io::Write + Send>>,
}

impl SharedSink {
    /// Share `w` between streams.
    pub fn new<W: io::Write + Send + 'static>(w: W) -> Self {
        Self {
            inner: Arc::new(Mutex::new(w)),
        }
    }

    fn with<T>(&self, f: impl FnOnce(&mut (dyn io::Write + Send)) -> io::Result<T>) -> io::Result<T> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| io::Error::other("log sink lock poisoned"))?;
        f(&mut *guard)
    }
}

impl WriteCloser for SharedSink {
    fn write(&mut self, buf: &[u8]) -> Result<usize, WriteError> {
        self.with(|w| w.write_all(buf))
            .map_err(|e| WriteError::new(0, e))?;
        Ok(buf.len())
    }

    fn close(&mut self) -> io::Result<()> {
        self.with(|w| w.flush())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Broken;

    impl io::Write for Broken {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "gone"))
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn io_sink_accepts_whole_buffer() {
        let mut sink = IoSink(Vec::new());
        assert_eq!(sink.write(b"hello").unwrap(), 5);
        sink.write_opaque(b"[MASKED]").unwrap();
        assert_eq!(sink.0, b"hello[MASKED]");
    }

    #[test]
    fn io_sink_reports_failure() {
        let mut sink = IoSink(Broken);
        let err = sink.write(b"x").unwrap_err();
        assert_eq!(err.accepted, 0);
        assert_eq!(err.source.kind(), io::ErrorKind::BrokenPipe);
    }

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn shared_sink_close_keeps_target_open() {
        let capture = Capture::default();
        let mut a = SharedSink::new(capture.clone());
        let mut b = a.clone();

        a.write(b"one ").unwrap();
        b.write(b"two").unwrap();
        b.close().unwrap();
        a.write(b"!").unwrap();

        assert_eq!(&*capture.0.lock().unwrap(), b"one two!");
    }
}
