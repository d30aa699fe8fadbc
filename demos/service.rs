use kayvee_log::env::env_or;
use kayvee_log::init::{init_tracing_with_config, LayerConfig};
use kayvee_log::noop_sink::NoopSink;
use kayvee_log::{capture_error, kv, ErrorCaptureLogger, KayveeFormatter, Level, Logger, LoggerConfig};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Logs a few records to stderr, bridges `tracing` events into the same
/// format, and reports a failure to Sentry when `SENTRY_DSN` is set.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let source = env_or("SERVICE_NAME", "demo-service");

    let logger = ErrorCaptureLogger::from_env(source.clone());
    logger.info_with("request-started", &kv! { "method" => "POST", "path" => "/dot" })?;
    logger.logger().counter("requests")?;
    logger.logger().gauge_float_with("render-seconds", 0.042, &kv! { "format" => "png" })?;

    let err = std::io::Error::new(std::io::ErrorKind::NotFound, "renderer binary not found");
    capture_error!(logger, "render-failed", &kv! { "format" => "png" }, &err)?;
    logger.flush(Duration::from_secs(2))?;

    init_tracing_with_config(Arc::new(Logger::new(source)), LayerConfig::default())?;
    tracing::warn!(queue_depth = 17, "backlog-growing");

    // Formatting overhead without I/O.
    let mut quiet = Logger::from_config(LoggerConfig::new("load"));
    quiet.set_config("load", Level::Debug, KayveeFormatter, NoopSink);
    let n: u64 = 100_000;
    let start = Instant::now();
    for i in 0..n {
        quiet.info_with("tick", &kv! { "iteration" => i })?;
    }
    let elapsed = start.elapsed();
    println!(
        "formatted {} records in {:?} (~{:.0} rec/s)",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );

    Ok(())
}
