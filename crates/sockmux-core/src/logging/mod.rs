//! Structured logging with `tracing`.
//!
//! All sockmux crates log through `tracing` macros with structured fields
//! (`namespace`, `conn_seq`, `code`). The binary or embedding application
//! installs a subscriber once via [`init_subscriber`]; tests use
//! [`capture_logs`] to assert on what was emitted.

pub mod capture;

pub use capture::{CapturedEvent, CapturedLogs, capture_logs};

/// Effective `EnvFilter` directive: a non-empty `RUST_LOG` wins over the
/// configured `level`, and an empty `level` means `info`.
pub fn filter_directive(level: &str, rust_log: Option<&str>) -> String {
    let from_env = rust_log.map(str::trim).filter(|v| !v.is_empty());
    let level = level.trim();
    match from_env {
        Some(directive) => directive.to_owned(),
        None if level.is_empty() => "info".to_owned(),
        None => level.to_owned(),
    }
}

/// Initialize the global tracing subscriber with stderr output.
///
/// `RUST_LOG` takes precedence over `level` when set. An unparseable
/// directive falls back to `info`. Subsequent calls are no-ops. Returns the
/// directive that was requested.
pub fn init_subscriber(level: &str) -> String {
    use tracing_subscriber::EnvFilter;

    let directive = filter_directive(level, std::env::var("RUST_LOG").ok().as_deref());
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();

    // try_init fails if a global subscriber is already installed
    let _ = subscriber.try_init();
    directive
}
