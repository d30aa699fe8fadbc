use crate::level::Level;
use crate::logger::Logger;
use crate::record::Record;
use crate::DIAGNOSTICS_TARGET;
use serde_json::Value;
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// `tracing_subscriber` layer that emits every `tracing` event as a record
/// through a [`Logger`].
///
/// The event message becomes the `title`; the remaining fields become record
/// data. The logger's threshold and formatter apply as for direct calls.
pub struct KayveeLayer {
    logger: Arc<Logger>,
}

impl KayveeLayer {
    pub fn new(logger: Arc<Logger>) -> Self {
        Self { logger }
    }
}

impl<S> Layer<S> for KayveeLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        if meta.target() == DIAGNOSTICS_TARGET {
            return;
        }
        let level = Level::from(meta.level());
        if !self.logger.enabled(level) {
            return;
        }

        let mut fields = Record::new();
        let mut message: Option<String> = None;
        let mut visitor = FieldVisitor { fields: &mut fields, message: &mut message };
        event.record(&mut visitor);

        let title = message.unwrap_or_else(|| meta.name().to_string());
        // Reported on the diagnostics target, which this layer skips, so a
        // broken sink cannot feed back into itself.
        if let Err(e) = self.logger.log(level, &title, &fields) {
            tracing::warn!(target: DIAGNOSTICS_TARGET, error = %e, title = %title, "dropping bridged event");
        }
    }
}

/// Collects event fields into a [`Record`], splitting out `message`.
pub struct FieldVisitor<'a> {
    pub fields: &'a mut Record,
    pub message: &'a mut Option<String>,
}

impl<'a> FieldVisitor<'a> {
    fn insert(&mut self, field: &Field, value: Value) {
        self.fields.insert(field.name().to_string(), value);
    }
}

impl<'a> Visit for FieldVisitor<'a> {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            *self.message = Some(value.to_string());
        } else {
            self.insert(field, Value::String(value.to_string()));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, Value::from(value));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.insert(field, Value::String(value.to_string()));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            *self.message = Some(format!("{:?}", value));
        } else {
            self.insert(field, Value::String(format!("{:?}", value)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LogError;
    use crate::formatter::KayveeFormatter;
    use crate::logger::LoggerConfig;
    use crate::sink::MemorySink;
    use parking_lot::Mutex;
    use serde_json::json;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::Registry;

    fn bridged(level: Level) -> (Arc<Logger>, MemorySink) {
        let sink = MemorySink::new();
        let mut logger = Logger::from_config(LoggerConfig::new("svc"));
        logger.set_config("svc", level, KayveeFormatter, sink.clone());
        (Arc::new(logger), sink)
    }

    #[test]
    fn events_become_records() {
        let (logger, sink) = bridged(Level::Debug);
        let subscriber = Registry::default().with(KayveeLayer::new(logger));

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(user_id = 42, ratio = 0.5, ok = false, reason = "quota", "request-throttled");
        });

        let record: Value = serde_json::from_str(&sink.lines()[0]).unwrap();
        assert_eq!(
            record,
            json!({
                "title": "request-throttled",
                "level": "warning",
                "source": "svc",
                "user_id": 42,
                "ratio": 0.5,
                "ok": false,
                "reason": "quota",
            })
        );
    }

    #[test]
    fn threshold_and_internal_targets_are_respected() {
        let (logger, sink) = bridged(Level::Info);
        let subscriber = Registry::default().with(KayveeLayer::new(logger));

        tracing::subscriber::with_default(subscriber, || {
            tracing::debug!("below-threshold");
            tracing::error!(target: crate::DIAGNOSTICS_TARGET, "internal");
            tracing::info!("kept");
        });

        let lines = sink.lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("\"kept\""));
    }

    /// Records the message of every diagnostics event it sees.
    #[derive(Clone, Default)]
    struct Diagnostics(Arc<Mutex<Vec<String>>>);

    impl<S: Subscriber> Layer<S> for Diagnostics {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            if event.metadata().target() != DIAGNOSTICS_TARGET {
                return;
            }
            let mut fields = Record::new();
            let mut message = None;
            event.record(&mut FieldVisitor { fields: &mut fields, message: &mut message });
            self.0.lock().push(message.unwrap_or_default());
        }
    }

    #[test]
    fn failed_records_are_reported_on_the_diagnostics_target() {
        let sink = MemorySink::new();
        let mut logger = Logger::from_config(LoggerConfig::new("svc"));
        let failing = |_: &Record| -> Result<String, LogError> {
            Err(LogError::Io(std::io::Error::new(std::io::ErrorKind::Other, "sink gone")))
        };
        logger.set_config("svc", Level::Debug, failing, sink.clone());
        let diagnostics = Diagnostics::default();
        let subscriber = Registry::default()
            .with(KayveeLayer::new(Arc::new(logger)))
            .with(diagnostics.clone());

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("lost");
        });

        assert!(sink.lines().is_empty());
        assert_eq!(*diagnostics.0.lock(), vec!["dropping bridged event".to_string()]);
    }
}
