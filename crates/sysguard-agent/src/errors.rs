//! Error types surfaced by the connection manager.

use std::io;

use thiserror::Error;

use crate::events::EngineId;
use crate::transport::TransportError;

/// Errors returned by [`crate::ConnectionManager`].
#[derive(Debug, Error)]
pub enum ManagerError {
    /// The host already has an engaged engine.
    #[error("host '{host}' is already engaged")]
    AlreadyEngaged {
        /// Host key requested by the caller.
        host: String,
    },

    /// No engine is engaged for the host.
    #[error("host '{host}' is not engaged")]
    UnknownHost {
        /// Host key requested by the caller.
        host: String,
    },

    /// The engine handle refers to an engine that was already torn down.
    #[error("{engine} is no longer engaged")]
    UnknownEngine {
        /// Identity of the stale engine.
        engine: EngineId,
    },

    /// The transport could not be started.
    #[error("failed to connect to host '{host}': {source}")]
    Transport {
        /// Host being engaged.
        host: String,
        /// Underlying transport failure.
        #[source]
        source: TransportError,
    },

    /// The host worker thread could not be started.
    #[error("failed to start worker for host '{host}': {source}")]
    Worker {
        /// Host being engaged.
        host: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The host worker stopped before the message could be delivered.
    #[error("worker for host '{host}' has stopped")]
    WorkerStopped {
        /// Host whose worker is gone.
        host: String,
    },
}
