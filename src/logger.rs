use crate::env::{env_opt, KAYVEE_LOG_LEVEL_ENV};
use crate::error::LogError;
use crate::formatter::{Formatter, KayveeFormatter};
use crate::level::Level;
use crate::record::{self, merge_globals, Record};
use crate::sink::{LogSink, StderrSink};
use serde::ser::Error as _;
use serde_json::{Number, Value};
use std::sync::Arc;

/// Construction parameters for a [`Logger`].
///
/// **Fields**
/// - `source`: logger identity, emitted as the `source` global field.
/// - `level`: threshold; calls below it are dropped without formatting.
#[derive(Clone, Debug)]
pub struct LoggerConfig {
    pub source: String,
    pub level: Level,
}

impl LoggerConfig {
    pub fn new(source: impl Into<String>) -> Self {
        Self { source: source.into(), level: Level::default() }
    }

    /// Config for `source` with the threshold taken from `KAYVEE_LOG_LEVEL`.
    pub fn from_env(source: impl Into<String>) -> Self {
        let level = Level::parse_or_default(env_opt(KAYVEE_LOG_LEVEL_ENV).as_deref());
        Self { source: source.into(), level }
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }
}

/// Leveled key-value logger.
///
/// Every emitted record is the caller's data plus `title`, `level` and the
/// logger's global fields, formatted into one line and written to the sink.
/// Caller fields always win over globals.
///
/// Logging takes `&self`; reconfiguration takes `&mut self`, so it cannot
/// interleave with calls made through a shared reference.
pub struct Logger {
    globals: Record,
    level: Level,
    formatter: Arc<dyn Formatter>,
    sink: Arc<dyn LogSink>,
}

impl Logger {
    /// Logger for `source` writing to stderr with the log-oriented formatter.
    /// The threshold comes from `KAYVEE_LOG_LEVEL` and defaults to debug.
    pub fn new(source: impl Into<String>) -> Self {
        Self::from_config(LoggerConfig::from_env(source))
    }

    pub fn from_config(config: LoggerConfig) -> Self {
        let mut logger = Logger {
            globals: Record::new(),
            level: Level::default(),
            formatter: Arc::new(KayveeFormatter),
            sink: Arc::new(StderrSink),
        };
        logger.set_config(config.source, config.level, KayveeFormatter, StderrSink);
        logger
    }

    /// Replace source, threshold, formatter and sink in one step.
    pub fn set_config(
        &mut self,
        source: impl Into<String>,
        level: Level,
        formatter: impl Formatter + 'static,
        sink: impl LogSink + 'static,
    ) {
        self.globals
            .insert(record::SOURCE.to_string(), Value::String(source.into()));
        self.level = level;
        self.formatter = Arc::new(formatter);
        self.sink = Arc::new(sink);
    }

    pub fn set_log_level(&mut self, level: Level) {
        self.level = level;
    }

    pub fn set_formatter(&mut self, formatter: impl Formatter + 'static) {
        self.formatter = Arc::new(formatter);
    }

    pub fn set_output(&mut self, sink: impl LogSink + 'static) {
        self.sink = Arc::new(sink);
    }

    /// Attach a field to every subsequent record.
    pub fn set_global(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.globals.insert(key.into(), value.into());
    }

    pub fn globals(&self) -> &Record {
        &self.globals
    }

    pub fn source(&self) -> Option<&str> {
        self.globals.get(record::SOURCE).and_then(Value::as_str)
    }

    pub fn log_level(&self) -> Level {
        self.level
    }

    /// Whether a call at `level` would produce output.
    pub fn enabled(&self, level: Level) -> bool {
        level >= self.level
    }

    pub fn flush(&self) -> Result<(), LogError> {
        Ok(self.sink.flush()?)
    }

    /// Emit `data` titled `title` at `level`.
    ///
    /// Below the threshold this is a no-op: nothing is formatted or written.
    /// `data` is copied; the caller's mapping is left untouched.
    pub fn log(&self, level: Level, title: &str, data: &Record) -> Result<(), LogError> {
        if !self.enabled(level) {
            return Ok(());
        }
        let mut record = data.clone();
        record.insert(record::TITLE.to_string(), Value::String(title.to_string()));
        self.emit(level, record)
    }

    /// Final step shared by every entry point: level, globals, format, write.
    pub(crate) fn emit(&self, level: Level, mut record: Record) -> Result<(), LogError> {
        record.insert(record::LEVEL.to_string(), Value::String(level.as_str().to_string()));
        merge_globals(&mut record, &self.globals);
        let line = self.formatter.format(&record)?;
        self.sink.write_line(&line)?;
        Ok(())
    }

    pub fn debug(&self, title: &str) -> Result<(), LogError> {
        self.log(Level::Debug, title, &Record::new())
    }

    pub fn info(&self, title: &str) -> Result<(), LogError> {
        self.log(Level::Info, title, &Record::new())
    }

    pub fn warn(&self, title: &str) -> Result<(), LogError> {
        self.log(Level::Warning, title, &Record::new())
    }

    pub fn error(&self, title: &str) -> Result<(), LogError> {
        self.log(Level::Error, title, &Record::new())
    }

    pub fn critical(&self, title: &str) -> Result<(), LogError> {
        self.log(Level::Critical, title, &Record::new())
    }

    pub fn debug_with(&self, title: &str, data: &Record) -> Result<(), LogError> {
        self.log(Level::Debug, title, data)
    }

    pub fn info_with(&self, title: &str, data: &Record) -> Result<(), LogError> {
        self.log(Level::Info, title, data)
    }

    pub fn warn_with(&self, title: &str, data: &Record) -> Result<(), LogError> {
        self.log(Level::Warning, title, data)
    }

    pub fn error_with(&self, title: &str, data: &Record) -> Result<(), LogError> {
        self.log(Level::Error, title, data)
    }

    pub fn critical_with(&self, title: &str, data: &Record) -> Result<(), LogError> {
        self.log(Level::Critical, title, data)
    }

    /// Counter of 1 at info level.
    pub fn counter(&self, title: &str) -> Result<(), LogError> {
        self.counter_with(title, 1, &Record::new())
    }

    pub fn counter_with(&self, title: &str, value: i64, data: &Record) -> Result<(), LogError> {
        self.metric(title, "counter", Value::from(value), data)
    }

    pub fn gauge_int(&self, title: &str, value: i64) -> Result<(), LogError> {
        self.gauge_int_with(title, value, &Record::new())
    }

    pub fn gauge_int_with(&self, title: &str, value: i64, data: &Record) -> Result<(), LogError> {
        self.metric(title, "gauge", Value::from(value), data)
    }

    pub fn gauge_float(&self, title: &str, value: f64) -> Result<(), LogError> {
        self.gauge_float_with(title, value, &Record::new())
    }

    /// NaN and infinities have no JSON form and fail with
    /// [`LogError::Format`] instead of being written as `null`.
    pub fn gauge_float_with(&self, title: &str, value: f64, data: &Record) -> Result<(), LogError> {
        if !self.enabled(Level::Info) {
            return Ok(());
        }
        let number = Number::from_f64(value).ok_or_else(|| {
            LogError::Format(serde_json::Error::custom(format!(
                "gauge `{}` has non-finite value {}",
                title, value
            )))
        })?;
        self.metric(title, "gauge", Value::Number(number), data)
    }

    // `type` and `value` override whatever the caller passed under those keys.
    fn metric(&self, title: &str, kind: &str, value: Value, data: &Record) -> Result<(), LogError> {
        if !self.enabled(Level::Info) {
            return Ok(());
        }
        let mut record = data.clone();
        record.insert(record::TITLE.to_string(), Value::String(title.to_string()));
        record.insert(record::TYPE.to_string(), Value::String(kind.to_string()));
        record.insert(record::VALUE.to_string(), value);
        self.emit(Level::Info, record)
    }
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger")
            .field("globals", &self.globals)
            .field("level", &self.level)
            .finish_non_exhaustive()
    }
}
