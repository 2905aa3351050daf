//! Tracing subscriber setup.
//!
//! Development builds get human-readable, multi-line output; production builds emit one JSON
//! object per event. Both write through a non-blocking appender whose buffered records are
//! flushed when the returned [`LogFlusher`] is dropped.

use std::io;
use std::sync::Once;

use flowkit_config::Environment;
use thiserror::Error;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_log::LogTracer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Registry, fmt};

/// Directive used when `RUST_LOG` is not set.
const DEFAULT_LOG_DIRECTIVE: &str = "info";

/// Environment variable that turns on log output in tests.
const ENABLE_TRACING_ENV_NAME: &str = "ENABLE_TRACING";

/// Guards one-time initialization of test tracing across test binaries' threads.
static INIT_TEST_TRACING: Once = Once::new();

/// Errors that can occur while installing the global subscriber.
#[derive(Debug, Error)]
pub enum TracingError {
    /// Failed to determine the runtime environment.
    #[error("failed to determine environment: {0}")]
    Environment(#[from] io::Error),

    /// A `log` logger was already installed.
    #[error("failed to install log bridge: {0}")]
    LogBridge(#[from] tracing_log::log::SetLoggerError),

    /// A global tracing subscriber was already installed.
    #[error("failed to install tracing subscriber: {0}")]
    Subscriber(#[from] TryInitError),
}

/// Flushes buffered log records when dropped.
///
/// Keep it alive for the lifetime of the program, typically as `let _log_flusher = ...` in
/// `main`.
#[must_use = "dropping the flusher stops log output"]
#[derive(Debug)]
pub struct LogFlusher {
    _guard: WorkerGuard,
}

/// Installs the global tracing subscriber for `app_name`.
///
/// Reads `APP_ENVIRONMENT` to choose the output format and `RUST_LOG` for filtering, and
/// forwards records emitted through the `log` crate into tracing.
pub fn init_tracing(app_name: &str) -> Result<LogFlusher, TracingError> {
    let environment = Environment::load()?;
    init_tracing_for(app_name, environment)
}

/// Installs the global tracing subscriber for an explicit [`Environment`].
pub fn init_tracing_for(
    app_name: &str,
    environment: Environment,
) -> Result<LogFlusher, TracingError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_DIRECTIVE));
    let (writer, guard) = tracing_appender::non_blocking(io::stdout());

    LogTracer::init()?;

    match environment {
        Environment::Dev => Registry::default()
            .with(filter)
            .with(fmt::layer().pretty().with_writer(writer))
            .try_init()?,
        Environment::Prod => Registry::default()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_writer(writer),
            )
            .try_init()?,
    }

    info!(app = app_name, %environment, "tracing initialized");

    Ok(LogFlusher { _guard: guard })
}

/// Initializes tracing for tests.
///
/// Output is only produced when `ENABLE_TRACING` is set, and goes through the test writer so
/// that it is captured per test. Safe to call from every test.
pub fn init_test_tracing() {
    INIT_TEST_TRACING.call_once(|| {
        if std::env::var(ENABLE_TRACING_ENV_NAME).is_err() {
            return;
        }

        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

        // Another harness may already own the global subscriber.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}
