use std::io;
use std::sync::Arc;

use ortho_config::OrthoError;
use sysguard_agent::ManagerError;
use thiserror::Error;

use crate::telemetry::TelemetryError;

/// Failures that end a monitoring run.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// Command-line arguments were rejected, or help was requested.
    #[error(transparent)]
    Usage(#[from] clap::Error),
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Configuration {
        /// Underlying loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {0}")]
    Telemetry(#[from] TelemetryError),
    /// The connection manager refused an operation.
    #[error(transparent)]
    Manager(#[from] ManagerError),
    /// The monitored host went away for good.
    #[error("lost connection to {host}: {reason}")]
    ConnectionLost {
        /// Host key.
        host: String,
        /// Offline reason reported by the agent.
        reason: String,
    },
    /// Answers were still missing when the final round timed out.
    #[error("{host} left {count} request(s) unanswered")]
    Unanswered {
        /// Host key.
        host: String,
        /// Number of requests without an answer.
        count: usize,
    },
    /// Writing readings to the output streams failed.
    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),
}
