use crate::sink::LogSink;
use std::io;

/// A sink that simply drops all lines.
///
/// Useful for measuring the overhead of formatting without any I/O, and for
/// tests that only care about side effects such as error capture.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl LogSink for NoopSink {
    fn write_line(&self, _line: &str) -> io::Result<()> {
        Ok(())
    }
}
