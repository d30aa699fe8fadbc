//! Leveled key-value logger emitting one JSON record per line.
//!
//! A [`Logger`] merges its global fields into each call's data, drops calls
//! below its threshold, and writes the formatted record to a [`LogSink`].
//! [`ErrorCaptureLogger`] adds error capture: failures logged at error level
//! are forwarded to a [`CaptureClient`] (usually a [`SentryClient`]) and the
//! returned id is recorded as `sentry_event_id`.
//!
//! ```
//! use kayvee_log::{kv, KayveeFormatter, Level, Logger, LoggerConfig, MemorySink};
//!
//! let sink = MemorySink::new();
//! let mut logger = Logger::from_config(LoggerConfig::new("svc"));
//! logger.set_config("svc", Level::Debug, KayveeFormatter, sink.clone());
//!
//! logger.info_with("started", &kv! { "port" => 8080 }).unwrap();
//! assert!(sink.lines()[0].contains("\"port\":8080"));
//! ```

pub mod capture;
pub mod env;
pub mod error;
pub mod error_logger;
pub mod formatter;
pub mod init;
pub mod layer;
pub mod level;
pub mod logger;
pub mod noop_sink;
pub mod record;
pub mod sentry;
pub mod sink;

pub use capture::{CallSite, CaptureClient, CapturedEvent, Failure, FailureReport, NoopCapture};
pub use error::{CaptureError, LogError, UnknownLevel};
pub use error_logger::ErrorCaptureLogger;
pub use formatter::{format, format_log, Formatter, JsonFormatter, KayveeFormatter};
pub use level::Level;
pub use logger::{Logger, LoggerConfig};
pub use record::Record;
pub use crate::sentry::SentryClient;
pub use sink::{LogSink, MemorySink, StderrSink, WriterSink};

/// `tracing` target of this crate's own diagnostics. The tracing bridge
/// never turns these events into records.
pub const DIAGNOSTICS_TARGET: &str = "kayvee_log::diagnostics";

#[doc(hidden)]
pub mod __private {
    pub use serde_json;
}
