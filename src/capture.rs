use crate::error::CaptureError;
use crate::level::Level;
use std::collections::BTreeMap;
use std::error::Error;
use std::panic::Location;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use sentry::protocol::{Frame, Stacktrace};

/// Source lines reported on each side of the failing line.
pub const CONTEXT_LINES: usize = 3;

/// Boundary to an external error-tracking collector.
///
/// `capture` is called synchronously from the logging call and its outcome
/// only ever adds to the emitted record: an `Err` leaves the log line as it
/// would have been without a collector.
pub trait CaptureClient: Send + Sync {
    /// Forward one failure and return the collector's tracking identifier.
    fn capture(
        &self,
        report: &FailureReport,
        tags: &BTreeMap<String, String>,
    ) -> Result<CapturedEvent, CaptureError>;

    /// `false` for clients that never forward anything. The logger skips
    /// building a report for them.
    fn is_enabled(&self) -> bool {
        true
    }

    /// Wait up to `timeout` for events still in flight. `false` if some were
    /// not delivered in time.
    fn flush(&self, _timeout: Duration) -> bool {
        true
    }
}

/// Client used when no collector is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCapture;

impl CaptureClient for NoopCapture {
    fn capture(
        &self,
        _report: &FailureReport,
        _tags: &BTreeMap<String, String>,
    ) -> Result<CapturedEvent, CaptureError> {
        Err(CaptureError::Disabled)
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

/// Result of a successful capture.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedEvent {
    pub event_id: String,
    pub stacktrace: Option<Stacktrace>,
}

impl CapturedEvent {
    pub fn new(event_id: impl Into<String>) -> Self {
        Self { event_id: event_id.into(), stacktrace: None }
    }
}

/// An error handed to [`ErrorCaptureLogger::error`](crate::error_logger::ErrorCaptureLogger::error),
/// together with its type name.
#[derive(Clone, Copy)]
pub struct Failure<'a> {
    error: &'a (dyn Error + 'static),
    kind: &'static str,
}

impl<'a> Failure<'a> {
    pub fn new(error: &'a (dyn Error + 'static), kind: &'static str) -> Self {
        Self { error, kind }
    }

    pub fn error(&self) -> &'a (dyn Error + 'static) {
        self.error
    }

    /// Short type name, e.g. `Error` for `std::io::Error`.
    pub fn kind(&self) -> &'static str {
        self.kind
    }
}

fn short_type_name(full: &'static str) -> &'static str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

impl<'a, E: Error + 'static> From<&'a E> for Failure<'a> {
    fn from(error: &'a E) -> Self {
        Failure::new(error, short_type_name(std::any::type_name::<E>()))
    }
}

impl<'a> From<&'a (dyn Error + 'static)> for Failure<'a> {
    fn from(error: &'a (dyn Error + 'static)) -> Self {
        Failure::new(error, "Error")
    }
}

impl<'a> From<&'a (dyn Error + Send + Sync + 'static)> for Failure<'a> {
    fn from(error: &'a (dyn Error + Send + Sync + 'static)) -> Self {
        Failure::new(error, "Error")
    }
}

impl std::fmt::Debug for Failure<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Failure")
            .field("kind", &self.kind)
            .field("error", &self.error.to_string())
            .finish()
    }
}

/// Where a failure was reported from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
    /// Path as the compiler saw it, usually relative to the package root.
    pub file: &'static str,
    pub line: u32,
    pub function: Option<String>,
    pub module: Option<String>,
    /// Absolute path of `file`, when it could be located.
    pub abs_path: Option<PathBuf>,
}

impl CallSite {
    /// Location of the caller. Inside a `#[track_caller]` function this is
    /// that function's caller. Function name and absolute path are filled
    /// in later by [`resolve`](Self::resolve).
    #[track_caller]
    pub fn caller() -> Self {
        let location = Location::caller();
        CallSite {
            file: location.file(),
            line: location.line(),
            function: None,
            module: None,
            abs_path: None,
        }
    }

    /// Build from the type path of a marker fn nested in the calling function,
    /// as produced by [`call_site!`](crate::call_site). `file` is looked up
    /// under `manifest_dir` and its parents, so workspace members resolve too.
    #[doc(hidden)]
    pub fn from_marker(file: &'static str, line: u32, marker_path: &str, manifest_dir: &str) -> Self {
        let mut path = marker_path.to_string();
        // Last segment is the marker fn itself.
        if let Some(end) = path.rfind("::") {
            path.truncate(end);
        }
        let (module, function) = split_symbol(&path);
        let abs_path = Path::new(manifest_dir)
            .ancestors()
            .map(|dir| dir.join(file))
            .find(|candidate| candidate.is_file());
        CallSite { file, line, function, module, abs_path }
    }

    /// Fill a missing function name and absolute path from the symbolized
    /// stack. Only finds the site while its frame is still live, i.e. when
    /// called below it on the same thread.
    pub fn resolve(&mut self) {
        if self.function.is_some() && self.abs_path.is_some() {
            return;
        }
        let Some((symbol, path)) = find_frame(self.file, self.line) else {
            return;
        };
        if self.function.is_none() {
            let (module, function) = split_symbol(&symbol);
            self.module = module;
            self.function = function;
        }
        if self.abs_path.is_none() {
            self.abs_path = Some(path);
        }
    }
}

/// `a::b::f::{{closure}}` -> (`a::b`, `f`).
fn split_symbol(path: &str) -> (Option<String>, Option<String>) {
    let mut segments: Vec<&str> = path
        .split("::")
        .filter(|segment| *segment != "{{closure}}")
        .collect();
    let function = segments.pop().map(str::to_string);
    let module = (!segments.is_empty()).then(|| segments.join("::"));
    (module, function)
}

/// Demangled symbol and source path of the innermost live frame at
/// `file:line`.
fn find_frame(file: &str, line: u32) -> Option<(String, PathBuf)> {
    let mut found = None;
    backtrace::trace(|frame| {
        backtrace::resolve_frame(frame, |symbol| {
            if found.is_some() {
                return;
            }
            if let (Some(path), Some(lineno), Some(name)) = (symbol.filename(), symbol.lineno(), symbol.name()) {
                if lineno == line && path.ends_with(file) {
                    // `{:#}` drops the trailing hash.
                    found = Some((format!("{:#}", name), path.to_path_buf()));
                }
            }
        });
        found.is_none()
    });
    found
}

/// [`CallSite`] of the invocation, including the enclosing function name.
#[macro_export]
macro_rules! call_site {
    () => {{
        fn __kayvee_here() {}
        fn __kayvee_type_name<T>(_: T) -> &'static str {
            ::std::any::type_name::<T>()
        }
        $crate::capture::CallSite::from_marker(
            ::std::file!(),
            ::std::line!(),
            __kayvee_type_name(__kayvee_here),
            ::std::env!("CARGO_MANIFEST_DIR"),
        )
    }};
}

/// Frame for `site` with source context read from disk, preferring the
/// absolute path. If the source cannot be read the context fields stay empty.
pub fn frame_for(site: &CallSite) -> Frame {
    let source = [site.abs_path.as_deref(), Some(Path::new(site.file))]
        .into_iter()
        .flatten()
        .find_map(|path| std::fs::read_to_string(path).ok());
    let (pre_context, context_line, post_context) = match &source {
        Some(text) => source_context(text, site.line, CONTEXT_LINES),
        None => (Vec::new(), None, Vec::new()),
    };
    Frame {
        filename: Some(site.file.to_string()),
        abs_path: site.abs_path.as_ref().map(|path| path.display().to_string()),
        function: site.function.clone(),
        module: site.module.clone(),
        lineno: Some(u64::from(site.line)),
        pre_context,
        context_line,
        post_context,
        in_app: Some(true),
        ..Default::default()
    }
}

/// Lines around the 1-based `line` of `text`: up to `window` before, the
/// line itself, up to `window` after.
pub fn source_context(
    text: &str,
    line: u32,
    window: usize,
) -> (Vec<String>, Option<String>, Vec<String>) {
    let lines: Vec<&str> = text.lines().collect();
    let Some(index) = (line as usize).checked_sub(1).filter(|i| *i < lines.len()) else {
        return (Vec::new(), None, Vec::new());
    };
    let start = index.saturating_sub(window);
    let end = (index + 1 + window).min(lines.len());
    let own = |slice: &[&str]| slice.iter().map(|l| l.to_string()).collect::<Vec<_>>();
    (
        own(&lines[start..index]),
        Some(lines[index].to_string()),
        own(&lines[index + 1..end]),
    )
}

/// Everything a [`CaptureClient`] receives about one failure.
#[derive(Debug, Clone, PartialEq)]
pub struct FailureReport {
    /// Title of the log call that carried the failure.
    pub title: String,
    pub level: Level,
    /// Short type name of the error.
    pub kind: String,
    /// `Display` of the error.
    pub message: String,
    /// `Display` of each error in the `source()` chain, outermost first.
    pub causes: Vec<String>,
    /// Frames ordered outermost first; the reporting frame is last.
    pub stacktrace: Stacktrace,
}

impl FailureReport {
    /// Must be called while `site`'s frame is on the stack so that a
    /// [`CallSite::caller`] site can still be resolved.
    pub fn new(title: &str, level: Level, failure: &Failure<'_>, site: &CallSite) -> Self {
        let mut causes = Vec::new();
        let mut source = failure.error().source();
        while let Some(cause) = source {
            causes.push(cause.to_string());
            source = cause.source();
        }
        let mut site = site.clone();
        site.resolve();
        FailureReport {
            title: title.to_string(),
            level,
            kind: failure.kind().to_string(),
            message: failure.error().to_string(),
            causes,
            stacktrace: Stacktrace {
                frames: vec![frame_for(&site)],
                ..Default::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_context_is_bounded_by_window() {
        let text = (1..=10).map(|n| format!("line {n}")).collect::<Vec<_>>().join("\n");
        let (pre, line, post) = source_context(&text, 5, 3);
        assert_eq!(pre, vec!["line 2", "line 3", "line 4"]);
        assert_eq!(line.as_deref(), Some("line 5"));
        assert_eq!(post, vec!["line 6", "line 7", "line 8"]);
    }

    #[test]
    fn source_context_clips_at_file_edges() {
        let text = "a\nb\nc";
        let (pre, line, post) = source_context(text, 1, 3);
        assert!(pre.is_empty());
        assert_eq!(line.as_deref(), Some("a"));
        assert_eq!(post, vec!["b", "c"]);

        let (pre, line, post) = source_context(text, 9, 3);
        assert!(pre.is_empty() && line.is_none() && post.is_empty());
    }

    #[test]
    fn call_site_macro_names_enclosing_function() {
        let site = crate::call_site!();
        assert_eq!(site.function.as_deref(), Some("call_site_macro_names_enclosing_function"));
        assert_eq!(site.module.as_deref(), Some("kayvee_log::capture::tests"));
        assert_eq!(site.file, file!());
        let abs_path = site.abs_path.expect("source located under the manifest dir");
        assert!(abs_path.is_absolute() && abs_path.ends_with(file!()));
    }

    #[test]
    fn split_symbol_skips_closures() {
        assert_eq!(
            split_symbol("app::jobs::run::{{closure}}::{{closure}}"),
            (Some("app::jobs".to_string()), Some("run".to_string()))
        );
        assert_eq!(split_symbol("main"), (None, Some("main".to_string())));
    }

    fn resolved(mut site: CallSite) -> CallSite {
        site.resolve();
        site
    }

    #[test]
    fn caller_site_resolves_function_from_stack() {
        let site = resolved(CallSite::caller());
        assert_eq!(site.function.as_deref(), Some("caller_site_resolves_function_from_stack"));
        assert_eq!(site.module.as_deref(), Some("kayvee_log::capture::tests"));
        assert!(site.abs_path.is_some_and(|path| path.is_absolute()));
    }

    #[test]
    fn failure_kind_uses_short_type_name() {
        let err = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let failure = Failure::from(&err);
        assert_eq!(failure.kind(), "Error");

        let parse_err = "x".parse::<i32>().unwrap_err();
        assert_eq!(Failure::from(&parse_err).kind(), "ParseIntError");
    }

    #[derive(Debug, thiserror::Error)]
    #[error("outer")]
    struct Outer(#[source] std::io::Error);

    #[test]
    fn report_collects_cause_chain() {
        let err = Outer(std::io::Error::new(std::io::ErrorKind::Other, "inner"));
        let report = FailureReport::new("evt", Level::Error, &Failure::from(&err), &CallSite::caller());
        assert_eq!(report.kind, "Outer");
        assert_eq!(report.message, "outer");
        assert_eq!(report.causes, vec!["inner".to_string()]);
        assert_eq!(report.stacktrace.frames.len(), 1);
        let frame = &report.stacktrace.frames[0];
        assert_eq!(frame.filename.as_deref(), Some(file!()));
        assert_eq!(frame.function.as_deref(), Some("report_collects_cause_chain"));
        assert_eq!((frame.pre_context.len(), frame.post_context.len()), (3, 3));
    }

    #[test]
    fn noop_capture_is_disabled() {
        assert!(!NoopCapture.is_enabled());
    }
}
