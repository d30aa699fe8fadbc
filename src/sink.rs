use parking_lot::Mutex;
use std::io::{self, Write};
use std::sync::Arc;

/// Destination for formatted log lines.
///
/// Implementations must write each line atomically with respect to other
/// callers sharing the sink; the [`Logger`](crate::logger::Logger) does not
/// serialize writes itself.
pub trait LogSink: Send + Sync {
    /// Write one line. `line` carries no terminator; the sink appends `\n`.
    ///
    /// **Returns**
    /// - `Ok(())` once the full line was handed to the destination.
    /// - `Err(..)` if the destination failed; the error reaches the caller
    ///   of the logging call.
    fn write_line(&self, line: &str) -> io::Result<()>;

    /// Flush buffered output, if the destination buffers.
    ///
    /// Default implementation is a no-op.
    fn flush(&self) -> io::Result<()> {
        Ok(())
    }
}

fn terminated(line: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(line.len() + 1);
    buf.extend_from_slice(line.as_bytes());
    buf.push(b'\n');
    buf
}

/// Process standard error. Default sink of a new logger.
#[derive(Debug, Clone, Copy, Default)]
pub struct StderrSink;

impl LogSink for StderrSink {
    fn write_line(&self, line: &str) -> io::Result<()> {
        // `Stderr` locks internally, so one write_all is one line.
        io::stderr().write_all(&terminated(line))
    }

    fn flush(&self) -> io::Result<()> {
        io::stderr().flush()
    }
}

/// Any [`Write`] implementation behind a mutex.
pub struct WriterSink<W> {
    writer: Mutex<W>,
}

impl<W: Write + Send> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer: Mutex::new(writer) }
    }

    /// Consume the sink and return the wrapped writer.
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl<W: Write + Send> LogSink for WriterSink<W> {
    fn write_line(&self, line: &str) -> io::Result<()> {
        self.writer.lock().write_all(&terminated(line))
    }

    fn flush(&self) -> io::Result<()> {
        self.writer.lock().flush()
    }
}

/// Keeps every line in memory. Clones share the same buffer, so a test can
/// hand one clone to a logger and inspect the other.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the lines written so far, without terminators.
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    /// Remove and return the lines written so far.
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.lines.lock())
    }
}

impl LogSink for MemorySink {
    fn write_line(&self, line: &str) -> io::Result<()> {
        self.lines.lock().push(line.to_string());
        Ok(())
    }
}

impl<S: LogSink + ?Sized> LogSink for Arc<S> {
    fn write_line(&self, line: &str) -> io::Result<()> {
        (**self).write_line(line)
    }

    fn flush(&self) -> io::Result<()> {
        (**self).flush()
    }
}
