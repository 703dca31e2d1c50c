//! Errors raised while starting, driving or recovering a daemon transport.

use std::io;

use thiserror::Error;

/// Transport-level failures.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The command line to start the daemon had no program.
    #[error("daemon command line is empty")]
    EmptyCommand,

    /// The daemon binary (or remote shell) was not found.
    #[error("daemon binary not found: {command}")]
    BinaryNotFound {
        /// Program that could not be found.
        command: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The daemon process could not be started.
    #[error("failed to start '{command}': {source}")]
    Spawn {
        /// Program that failed to start.
        command: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A standard stream of the child was not captured.
    #[error("daemon {stream} was not captured")]
    MissingPipe {
        /// Name of the missing stream.
        stream: &'static str,
    },

    /// Host name resolution failed.
    #[error("failed to resolve {host}:{port}: {source}")]
    Resolve {
        /// Host being resolved.
        host: String,
        /// Requested port.
        port: u16,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Host name resolution produced no addresses.
    #[error("{host}:{port} resolved to no addresses")]
    ResolveEmpty {
        /// Host being resolved.
        host: String,
        /// Requested port.
        port: u16,
    },

    /// No resolved address accepted the connection.
    #[error("failed to connect to {host}:{port}: {source}")]
    Connect {
        /// Host being connected to.
        host: String,
        /// Requested port.
        port: u16,
        /// Error from the last attempted address.
        #[source]
        source: io::Error,
    },

    /// Writing a command to the daemon failed.
    #[error("failed to write to daemon: {0}")]
    Write(#[source] io::Error),

    /// The transport has no running daemon to talk to.
    #[error("daemon is not running")]
    NotRunning,

    /// A reader thread could not be started.
    #[error("failed to start {stream} reader: {source}")]
    Reader {
        /// Stream the reader was meant to drain.
        stream: &'static str,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The daemon kept exiting and the restart budget is spent.
    #[error("daemon exited {attempts} times in a row: {reason}")]
    RestartsExhausted {
        /// Restarts attempted before giving up.
        attempts: u32,
        /// Reason for the last exit.
        reason: String,
    },

    /// The connection was closed and cannot be reopened in place.
    #[error("connection closed: {reason}")]
    Closed {
        /// What closed the connection.
        reason: String,
    },
}
