use crate::capture::{CallSite, CaptureClient, Failure, FailureReport, NoopCapture};
use crate::error::LogError;
use crate::level::Level;
use crate::logger::Logger;
use crate::record::{self, Record};
use crate::sentry::SentryClient;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// [`Logger`] that forwards failures logged at error level to a
/// [`CaptureClient`] and records the returned `sentry_event_id`.
///
/// Capture only ever adds the id field. A missing client, a disabled client
/// or a failing collector all produce the same line a plain
/// `Logger::log(Level::Error, ..)` would.
pub struct ErrorCaptureLogger {
    logger: Logger,
    client: Arc<dyn CaptureClient>,
}

impl ErrorCaptureLogger {
    pub fn new(logger: Logger, client: Arc<dyn CaptureClient>) -> Self {
        Self { logger, client }
    }

    /// Logger without a collector.
    pub fn without_capture(logger: Logger) -> Self {
        Self::new(logger, Arc::new(NoopCapture))
    }

    /// [`Logger::new`] for `source`, capturing to the Sentry project in
    /// `SENTRY_DSN` when it is set and valid.
    pub fn from_env(source: impl Into<String>) -> Self {
        let logger = Logger::new(source);
        match SentryClient::from_env() {
            Some(Ok(client)) => Self::new(logger, Arc::new(client)),
            Some(Err(e)) => {
                tracing::warn!(target: crate::DIAGNOSTICS_TARGET, error = %e, "ignoring invalid SENTRY_DSN");
                Self::without_capture(logger)
            }
            None => Self::without_capture(logger),
        }
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    pub fn logger_mut(&mut self) -> &mut Logger {
        &mut self.logger
    }

    pub fn set_client(&mut self, client: Arc<dyn CaptureClient>) {
        self.client = client;
    }

    /// Flush the log sink, then give the collector up to `timeout` to send
    /// queued events. Call before exiting.
    pub fn flush(&self, timeout: Duration) -> Result<(), LogError> {
        self.logger.flush()?;
        if !self.client.flush(timeout) {
            tracing::debug!(target: crate::DIAGNOSTICS_TARGET, ?timeout, "collector flush timed out");
        }
        Ok(())
    }

    /// Log `data` at error level, capturing `failure` first when there is
    /// one and a collector is configured. The reported frame is the caller.
    #[track_caller]
    pub fn error(&self, title: &str, data: &Record, failure: Option<Failure<'_>>) -> Result<(), LogError> {
        self.error_at(CallSite::caller(), title, data, failure)
    }

    /// [`error`](Self::error) with an explicit call site, see
    /// [`capture_error!`](crate::capture_error).
    pub fn error_at(
        &self,
        site: CallSite,
        title: &str,
        data: &Record,
        failure: Option<Failure<'_>>,
    ) -> Result<(), LogError> {
        if !self.logger.enabled(Level::Error) {
            return Ok(());
        }

        let mut record = data.clone();
        if let Some(failure) = failure {
            if let Some(event_id) = self.capture(&site, title, &failure) {
                record.insert(record::SENTRY_EVENT_ID.to_string(), Value::String(event_id));
            }
        }
        record.insert(record::TITLE.to_string(), Value::String(title.to_string()));
        self.logger.emit(Level::Error, record)
    }

    // Capture failures stay here: reporting them through `self.logger` could
    // loop, so they only go to the `tracing` diagnostics target.
    fn capture(&self, site: &CallSite, title: &str, failure: &Failure<'_>) -> Option<String> {
        if !self.client.is_enabled() {
            return None;
        }
        let report = FailureReport::new(title, Level::Error, failure, site);
        match self.client.capture(&report, &self.tags()) {
            Ok(event) => Some(event.event_id),
            Err(e) => {
                tracing::debug!(target: crate::DIAGNOSTICS_TARGET, error = %e, title, "error capture failed");
                None
            }
        }
    }

    fn tags(&self) -> BTreeMap<String, String> {
        let mut tags = BTreeMap::new();
        if let Some(source) = self.logger.source() {
            tags.insert(record::SOURCE.to_string(), source.to_string());
        }
        tags
    }

    pub fn debug(&self, title: &str) -> Result<(), LogError> {
        self.logger.debug(title)
    }

    pub fn info(&self, title: &str) -> Result<(), LogError> {
        self.logger.info(title)
    }

    pub fn warning(&self, title: &str) -> Result<(), LogError> {
        self.logger.warn(title)
    }

    pub fn critical(&self, title: &str) -> Result<(), LogError> {
        self.logger.critical(title)
    }

    pub fn debug_with(&self, title: &str, data: &Record) -> Result<(), LogError> {
        self.logger.debug_with(title, data)
    }

    pub fn info_with(&self, title: &str, data: &Record) -> Result<(), LogError> {
        self.logger.info_with(title, data)
    }

    pub fn warning_with(&self, title: &str, data: &Record) -> Result<(), LogError> {
        self.logger.warn_with(title, data)
    }

    pub fn critical_with(&self, title: &str, data: &Record) -> Result<(), LogError> {
        self.logger.critical_with(title, data)
    }
}

/// Log at error level through an [`ErrorCaptureLogger`], reporting the
/// enclosing function as the failing frame.
///
/// ```ignore
/// capture_error!(logger, "render-failed", &kv! { "format" => "png" }, &err)?;
/// ```
#[macro_export]
macro_rules! capture_error {
    ($logger:expr, $title:expr, $data:expr, $err:expr $(,)?) => {
        $logger.error_at(
            $crate::call_site!(),
            $title,
            $data,
            ::std::option::Option::Some($crate::capture::Failure::from($err)),
        )
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::CapturedEvent;
    use crate::error::CaptureError;
    use crate::formatter::KayveeFormatter;
    use crate::logger::LoggerConfig;
    use crate::sink::MemorySink;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct CountingClient {
        calls: Mutex<usize>,
    }

    impl CaptureClient for CountingClient {
        fn capture(
            &self,
            _report: &FailureReport,
            tags: &BTreeMap<String, String>,
        ) -> Result<CapturedEvent, CaptureError> {
            *self.calls.lock() += 1;
            assert_eq!(tags.get("source").map(String::as_str), Some("svc"));
            Ok(CapturedEvent::new("abc"))
        }
    }

    fn logger_at(level: Level) -> (Logger, MemorySink) {
        let sink = MemorySink::new();
        let mut logger = Logger::from_config(LoggerConfig::new("svc"));
        logger.set_config("svc", level, KayveeFormatter, sink.clone());
        (logger, sink)
    }

    #[test]
    fn suppressed_error_skips_capture() {
        let (logger, sink) = logger_at(Level::Critical);
        let client = Arc::new(CountingClient::default());
        let capture = ErrorCaptureLogger::new(logger, client.clone());
        let err = std::io::Error::new(std::io::ErrorKind::Other, "boom");

        capture.error("evt", &Record::new(), Some(Failure::from(&err))).unwrap();

        assert_eq!(*client.calls.lock(), 0);
        assert!(sink.lines().is_empty());
    }

    #[test]
    fn captured_id_lands_in_record() {
        let (logger, sink) = logger_at(Level::Debug);
        let client = Arc::new(CountingClient::default());
        let capture = ErrorCaptureLogger::new(logger, client.clone());
        let err = std::io::Error::new(std::io::ErrorKind::Other, "boom");

        capture.error("evt", &Record::new(), Some(Failure::from(&err))).unwrap();

        let line: Value = serde_json::from_str(&sink.lines()[0]).unwrap();
        assert_eq!(line["sentry_event_id"], "abc");
        assert_eq!(*client.calls.lock(), 1);
    }

    #[test]
    fn delegating_entry_points_use_inner_logger() {
        let (logger, sink) = logger_at(Level::Info);
        let capture = ErrorCaptureLogger::without_capture(logger);
        capture.debug("hidden").unwrap();
        capture.warning_with("shown", &crate::kv! { "k" => 1 }).unwrap();
        assert_eq!(sink.lines().len(), 1);
        assert_eq!(capture.logger().log_level(), Level::Info);
    }
}
