use crate::error::LogError;
use crate::level::Level;
use crate::record::{self, Record};
use serde_json::Value;

/// Turns a [`Record`] into a single serialized line.
///
/// Implementations must be pure: the same record always yields output that
/// decodes to the same structure. Any `Fn(&Record) -> Result<String, LogError>`
/// closure is a formatter.
pub trait Formatter: Send + Sync {
    fn format(&self, record: &Record) -> Result<String, LogError>;
}

impl<F> Formatter for F
where
    F: Fn(&Record) -> Result<String, LogError> + Send + Sync,
{
    fn format(&self, record: &Record) -> Result<String, LogError> {
        self(record)
    }
}

/// Serialize every field of `data` as a JSON object.
pub fn format(data: &Record) -> Result<String, LogError> {
    Ok(serde_json::to_string(data)?)
}

/// Serialize `data` with the reserved `source`, `level` and `title` keys
/// filled in from the arguments when `data` does not set them.
pub fn format_log(source: &str, level: Level, title: &str, data: &Record) -> Result<String, LogError> {
    let mut record = data.clone();
    ensure(&mut record, record::SOURCE, source);
    ensure(&mut record, record::LEVEL, level.as_str());
    ensure(&mut record, record::TITLE, title);
    format(&record)
}

fn ensure(record: &mut Record, key: &str, value: &str) {
    if !record.contains_key(key) {
        record.insert(key.to_string(), Value::String(value.to_string()));
    }
}

/// Plain JSON formatter: the record as-is.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFormatter;

impl Formatter for JsonFormatter {
    fn format(&self, record: &Record) -> Result<String, LogError> {
        format(record)
    }
}

/// Log-oriented formatter used by [`Logger`](crate::logger::Logger) by default.
///
/// Guarantees `title`, `level` and `source` in every line; keys missing from
/// the record are emitted as empty strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct KayveeFormatter;

impl Formatter for KayveeFormatter {
    fn format(&self, record: &Record) -> Result<String, LogError> {
        let mut record = record.clone();
        for key in [record::SOURCE, record::LEVEL, record::TITLE] {
            ensure(&mut record, key, "");
        }
        format(&record)
    }
}
