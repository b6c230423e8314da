//! # Structured Logging Module
//!
//! Environment-aware `tracing` setup plus structured helpers for batch and
//! request-scope events. Library code only emits events; binaries and tests
//! decide whether to install a subscriber.

use crate::config::detect_environment;
use std::env;
use std::sync::OnceLock;
use std::time::Duration;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration.
///
/// `RUST_LOG` takes precedence over the environment default level. Set
/// `DATALOADER_LOG_FORMAT=json` for JSON lines. Safe to call repeatedly and
/// when another global subscriber is already installed.
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = detect_environment();
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(get_log_level(&environment)));

        let json = env::var("DATALOADER_LOG_FORMAT").is_ok_and(|format| format == "json");
        let layer = if json {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .json()
                .with_filter(filter)
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(true)
                .with_filter(filter)
                .boxed()
        };

        if tracing_subscriber::registry().with(layer).try_init().is_err() {
            tracing::debug!(
                "Global tracing subscriber already initialized - continuing with existing subscriber"
            );
        }

        tracing::info!(
            environment = %environment,
            json,
            "🔧 STRUCTURED LOGGING: Initialized"
        );
    });
}

/// Default log level for an environment
fn get_log_level(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        _ => "debug",
    }
}

/// Log a batch reaching the end of its lifecycle
pub fn log_batch_operation(
    loader: &str,
    batch_id: u64,
    key_count: usize,
    status: &str,
    elapsed: Duration,
) {
    tracing::debug!(
        loader = %loader,
        batch_id,
        key_count,
        status = %status,
        elapsed_ms = elapsed.as_millis() as u64,
        "📦 BATCH_OPERATION"
    );
}

/// Log the end of a request scope
pub fn log_request_scope(request_id: &str, loaders: usize, batches: u64, keys_fetched: u64) {
    tracing::debug!(
        request_id = %request_id,
        loaders,
        batches,
        keys_fetched,
        "🧾 REQUEST_SCOPE"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_production_logs_at_info() {
        assert_eq!(get_log_level("production"), "info");
        assert_eq!(get_log_level("test"), "debug");
        assert_eq!(get_log_level("development"), "debug");
    }

    #[test]
    fn test_init_is_idempotent() {
        init_structured_logging();
        init_structured_logging();
        log_batch_operation("bundle", 1, 3, "completed", Duration::from_millis(2));
    }
}
