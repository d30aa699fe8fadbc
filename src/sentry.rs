use crate::capture::{CaptureClient, CapturedEvent, FailureReport};
use crate::env::{env_opt, SENTRY_DSN_ENV};
use crate::error::CaptureError;
use crate::level::Level;
use crate::record;
use sentry::protocol::{Event, Exception};
use sentry::types::Dsn;
use sentry::{Client, ClientOptions, Hub, Scope};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for [`SentryClient`].
///
/// **Fields**
/// - `dsn`: target project.
/// - `timeout`: how long [`SentryClient::flush`] callers should expect to
///   wait on shutdown.
/// - `environment`, `release`: optional event attributes.
#[derive(Clone, Debug)]
pub struct SentryConfig {
    pub dsn: Dsn,
    pub timeout: Duration,
    pub environment: Option<String>,
    pub release: Option<String>,
}

impl SentryConfig {
    pub fn new(dsn: Dsn) -> Self {
        Self {
            dsn,
            timeout: Duration::from_secs(5),
            environment: None,
            release: None,
        }
    }
}

/// [`CaptureClient`] handing events to a Sentry [`Hub`].
///
/// Events are queued on the hub's transport, so `capture` returns as soon as
/// the event id is assigned. Delivery failures after that point are the
/// transport's to report.
#[derive(Clone)]
pub struct SentryClient {
    // `None` captures through whatever hub is current on the calling thread.
    hub: Option<Arc<Hub>>,
}

impl SentryClient {
    /// Client with its own hub for the project named by `dsn`.
    pub fn new(dsn: &str) -> Result<Self, CaptureError> {
        let dsn: Dsn = dsn
            .trim()
            .parse()
            .map_err(|e| CaptureError::InvalidDsn(format!("{}: {}", e, dsn)))?;
        Ok(Self::with_config(SentryConfig::new(dsn)))
    }

    pub fn with_config(config: SentryConfig) -> Self {
        #[allow(unused_mut)]
        let mut options = ClientOptions {
            dsn: Some(config.dsn),
            environment: config.environment.map(Into::into),
            release: config.release.map(Into::into),
            shutdown_timeout: config.timeout,
            ..Default::default()
        };
        #[cfg(feature = "transport")]
        {
            options.transport = Some(Arc::new(sentry::transports::DefaultTransportFactory));
        }
        let client = Arc::new(Client::from_config(options));
        Self {
            hub: Some(Arc::new(Hub::new(Some(client), Arc::new(Scope::default())))),
        }
    }

    /// Client capturing through the calling thread's current hub, e.g. one
    /// set up by the application with `sentry::init`.
    pub fn current() -> Self {
        Self { hub: None }
    }

    /// `None` when `SENTRY_DSN` is unset or empty.
    pub fn from_env() -> Option<Result<Self, CaptureError>> {
        env_opt(SENTRY_DSN_ENV).map(|dsn| Self::new(&dsn))
    }

    fn hub(&self) -> Arc<Hub> {
        self.hub.clone().unwrap_or_else(Hub::current)
    }

    pub fn dsn(&self) -> Option<Dsn> {
        self.hub().client().and_then(|client| client.dsn().cloned())
    }

    /// Wait up to `timeout` for queued events to be sent. `false` if some
    /// were still pending.
    pub fn flush(&self, timeout: Duration) -> bool {
        self.hub()
            .client()
            .map_or(true, |client| client.flush(Some(timeout)))
    }

    fn build_event(report: &FailureReport, tags: &BTreeMap<String, String>) -> Event<'static> {
        // Sentry lists chained exceptions innermost first; the reported one
        // carries the stack trace.
        let mut values: Vec<Exception> = report
            .causes
            .iter()
            .rev()
            .map(|cause| Exception {
                ty: "Error".to_string(),
                value: Some(cause.clone()),
                ..Default::default()
            })
            .collect();
        values.push(Exception {
            ty: report.kind.clone(),
            value: Some(report.message.clone()),
            stacktrace: Some(report.stacktrace.clone()),
            ..Default::default()
        });

        Event {
            level: sentry_level(report.level),
            message: Some(report.title.clone()),
            logger: tags.get(record::SOURCE).cloned(),
            tags: tags.clone(),
            exception: values.into(),
            ..Default::default()
        }
    }
}

fn sentry_level(level: Level) -> sentry::Level {
    match level {
        Level::Debug => sentry::Level::Debug,
        Level::Info => sentry::Level::Info,
        Level::Warning => sentry::Level::Warning,
        Level::Error => sentry::Level::Error,
        Level::Critical => sentry::Level::Fatal,
    }
}

impl CaptureClient for SentryClient {
    fn capture(
        &self,
        report: &FailureReport,
        tags: &BTreeMap<String, String>,
    ) -> Result<CapturedEvent, CaptureError> {
        let hub = self.hub();
        if !hub.client().is_some_and(|client| client.is_enabled()) {
            return Err(CaptureError::Disabled);
        }
        let id = hub.capture_event(Self::build_event(report, tags));
        // A nil id means the client discarded the event (sampling, filters).
        if id.is_nil() {
            return Err(CaptureError::Dropped);
        }
        Ok(CapturedEvent {
            event_id: id.simple().to_string(),
            stacktrace: Some(report.stacktrace.clone()),
        })
    }

    fn is_enabled(&self) -> bool {
        self.hub().client().is_some_and(|client| client.is_enabled())
    }

    fn flush(&self, timeout: Duration) -> bool {
        SentryClient::flush(self, timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{CallSite, Failure};
    use std::io;

    #[test]
    fn accepts_project_dsn() {
        let client = SentryClient::new(" https://abc@sentry.example.com/42 ").unwrap();
        let dsn = client.dsn().unwrap();
        assert_eq!(dsn.public_key(), "abc");
        assert_eq!(dsn.host(), "sentry.example.com");
    }

    #[test]
    fn rejects_malformed_dsns() {
        for dsn in [
            "not a dsn",
            "https://sentry.example.com/42",
            "https://abc@sentry.example.com/",
            "ftp://abc@sentry.example.com/42",
        ] {
            assert!(
                matches!(SentryClient::new(dsn), Err(CaptureError::InvalidDsn(_))),
                "{dsn} should be rejected"
            );
        }
    }

    #[test]
    fn unbound_current_hub_is_disabled() {
        // Fresh thread: no hub has been bound and nothing called sentry::init.
        std::thread::spawn(|| {
            let client = SentryClient::current();
            assert!(!client.is_enabled());
            let report = FailureReport {
                title: "t".into(),
                level: Level::Error,
                kind: "Error".into(),
                message: "m".into(),
                causes: Vec::new(),
                stacktrace: Default::default(),
            };
            assert!(matches!(client.capture(&report, &BTreeMap::new()), Err(CaptureError::Disabled)));
        })
        .join()
        .unwrap();
    }

    #[test]
    fn captured_event_carries_exception_and_frame() {
        let err = io::Error::new(io::ErrorKind::Other, "testerror");
        let tags = BTreeMap::from([("source".to_string(), "svc".to_string())]);
        let mut outcome = None;

        let events = sentry::test::with_captured_events(|| {
            let report = FailureReport::new("render-failed", Level::Error, &Failure::from(&err), &CallSite::caller());
            outcome = Some(SentryClient::current().capture(&report, &tags));
        });

        let captured = outcome.unwrap().unwrap();
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(captured.event_id, event.event_id.simple().to_string());
        assert_eq!(event.level, sentry::Level::Error);
        assert_eq!(event.message.as_deref(), Some("render-failed"));
        assert_eq!(event.logger.as_deref(), Some("svc"));
        assert_eq!(event.tags.get("source").map(String::as_str), Some("svc"));

        let exception = event.exception.values.last().unwrap();
        assert_eq!(exception.ty, "Error");
        assert_eq!(exception.value.as_deref(), Some("testerror"));
        let frame = exception.stacktrace.as_ref().unwrap().frames.last().unwrap();
        assert_eq!(frame.filename.as_deref(), Some(file!()));
        assert_eq!(frame.function.as_deref(), Some("captured_event_carries_exception_and_frame"));
        assert_eq!((frame.pre_context.len(), frame.post_context.len()), (3, 3));
    }

    #[test]
    fn causes_come_first_and_critical_is_fatal() {
        let report = FailureReport {
            title: "t".into(),
            level: Level::Critical,
            kind: "Outer".into(),
            message: "outer".into(),
            causes: vec!["middle".into(), "root".into()],
            stacktrace: Default::default(),
        };
        let event = SentryClient::build_event(&report, &BTreeMap::new());
        assert_eq!(event.level, sentry::Level::Fatal);
        let values: Vec<_> = event.exception.values.iter().map(|e| e.value.as_deref()).collect();
        assert_eq!(values, vec![Some("root"), Some("middle"), Some("outer")]);
        assert!(event.logger.is_none());
    }
}
