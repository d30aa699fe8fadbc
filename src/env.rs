//! Environment variable names read by this crate.
//!
//! Only constructors that say so touch the environment; the core types take
//! explicit configuration.

/// Threshold for loggers built with [`Logger::new`](crate::logger::Logger::new),
/// e.g. `warning`. Case-insensitive; unknown values mean `debug`.
pub const KAYVEE_LOG_LEVEL_ENV: &str = "KAYVEE_LOG_LEVEL";

/// Sentry DSN, e.g. `https://public@sentry.example.com/42`.
pub const SENTRY_DSN_ENV: &str = "SENTRY_DSN";

/// Read an environment variable or fall back to a provided default.
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Read an environment variable, treating unset and empty the same.
pub fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
