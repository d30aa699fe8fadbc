use std::io;

/// Error returned by the logging entry points.
///
/// Suppressed levels and capture failures are never errors; only a record
/// that cannot be produced or written surfaces here.
#[derive(thiserror::Error, Debug)]
pub enum LogError {
    #[error("failed to format log record: {0}")]
    Format(#[from] serde_json::Error),

    #[error("failed to write log line: {0}")]
    Io(#[from] io::Error),
}

/// Error returned by a [`CaptureClient`](crate::capture::CaptureClient).
#[derive(thiserror::Error, Debug)]
pub enum CaptureError {
    #[error("invalid DSN: {0}")]
    InvalidDsn(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("error capture is disabled")]
    Disabled,

    #[error("collector client dropped the event")]
    Dropped,
}

/// Returned by the strict `FromStr` parse of a [`Level`](crate::level::Level).
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown log level `{0}`")]
pub struct UnknownLevel(pub String);
