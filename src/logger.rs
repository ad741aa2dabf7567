//! Logger setup for the reading marketplace core.
//!
//! Structured logging via `tracing`, with the level controlled by
//! `MARKETPLACE_LOG_LEVEL` (default `INFO`).

use std::env;
use std::sync::Once;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

static INIT: Once = Once::new();

/// Sets up the global `tracing` subscriber for the process. Safe to call more than once;
/// only the first call takes effect.
pub fn setup_logger() {
    INIT.call_once(|| {
        let log_level = env::var("MARKETPLACE_LOG_LEVEL")
            .unwrap_or_else(|_| "INFO".to_string())
            .to_uppercase();

        let level = match log_level.as_str() {
            "DEBUG" => Level::DEBUG,
            "ERROR" => Level::ERROR,
            "WARN" => Level::WARN,
            "TRACE" => Level::TRACE,
            _ => Level::INFO,
        };

        let subscriber = FmtSubscriber::builder().with_max_level(level).finish();

        tracing::subscriber::set_global_default(subscriber)
            .expect("setting default tracing subscriber should only happen once");

        tracing::debug!("log level set to: {}", level);
    });
}

#[cfg(test)]
mod tests {
    use super::setup_logger;

    #[test]
    fn setup_logger_does_not_panic_when_called_twice() {
        setup_logger();
        setup_logger();
    }
}
