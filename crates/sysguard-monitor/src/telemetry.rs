//! Diagnostic logging for the monitor.
//!
//! Readings are the monitor's stdout, so every log record goes to stderr.
//! Records keep their target (`sysguard_agent::engine`,
//! `sysguard_monitor::poller` and so on) and the name of the thread that
//! emitted them: host workers and their readers are named after the host,
//! which is what tells two engaged daemons apart in the log.

use std::io::{self, IsTerminal};

use once_cell::sync::OnceCell;
use sysguard_config::{Config, LogFormat};
use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer};

static INSTALLED: OnceCell<()> = OnceCell::new();

/// Proof that logging is set up for this process.
#[derive(Debug, Default, Clone, Copy)]
pub struct TelemetryHandle;

/// Errors raised while setting up logging.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// The `log_filter` setting is not a valid filter directive.
    #[error("invalid log filter: {0}")]
    Filter(String),
    /// Some other code installed a global subscriber first.
    #[error("failed to install telemetry subscriber: {0}")]
    Subscriber(SetGlobalDefaultError),
}

/// Routes the process's log records to stderr.
///
/// Only the first call configures anything. In-process test runs call the
/// monitor many times, and later calls keep the first run's filter.
///
/// # Errors
///
/// Returns [`TelemetryError`] when `log_filter` does not parse or another
/// subscriber is already installed.
pub fn initialise(config: &Config) -> Result<TelemetryHandle, TelemetryError> {
    INSTALLED
        .get_or_try_init(|| install_subscriber(config))
        .map(|&()| TelemetryHandle)
}

fn install_subscriber(config: &Config) -> Result<(), TelemetryError> {
    let filter = parse_filter(config)?;
    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer(config.log_format()));

    tracing::subscriber::set_global_default(subscriber).map_err(TelemetryError::Subscriber)
}

fn parse_filter(config: &Config) -> Result<EnvFilter, TelemetryError> {
    EnvFilter::try_new(config.log_filter()).map_err(|error| TelemetryError::Filter(error.to_string()))
}

fn stderr_layer<S>(format: LogFormat) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'span> LookupSpan<'span>,
{
    let layer = fmt::layer()
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_target(true)
        .with_thread_names(true);

    match format {
        LogFormat::Json => layer.json().flatten_event(true).boxed(),
        LogFormat::Compact => layer.compact().boxed(),
    }
}
