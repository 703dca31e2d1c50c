//! Byte channels to the daemon.
//!
//! Two transports exist: [`ProcessTransport`] runs the daemon as a child
//! process (locally, or on another machine through a remote shell) and
//! [`SocketTransport`] talks to a daemon listening on a TCP port. Both push
//! what they read into the host worker's inbox from background reader
//! threads and accept writes from the worker thread.

mod error;
mod lifecycle;
mod process;
mod reader;
mod socket;

use std::fmt;

pub use error::TransportError;
pub use process::{ProcessCommand, ProcessTransport, RESTART_BUDGET};
pub use socket::SocketTransport;

/// Log target for transport operations.
pub(crate) const TRANSPORT_TARGET: &str = "sysguard_agent::transport";

/// Destination for command bytes.
#[cfg_attr(test, mockall::automock)]
pub trait CommandSink: Send {
    /// Writes `bytes` in full and flushes them.
    ///
    /// # Errors
    ///
    /// Returns an error when the underlying channel rejects the write.
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError>;
}

/// Which kind of channel a transport uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// Spawned child process.
    Process,
    /// TCP connection.
    Socket,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::Process => "process",
            Self::Socket => "socket",
        })
    }
}

/// A running daemon channel owned by a host worker.
pub trait Transport: CommandSink {
    /// Kind of channel.
    fn kind(&self) -> TransportKind;

    /// Whether reader messages tagged `generation` come from the live channel.
    fn is_current(&self, generation: u64) -> bool;

    /// Records that the daemon produced output.
    fn note_activity(&mut self);

    /// Tries to bring the channel back after it closed for `reason`.
    ///
    /// # Errors
    ///
    /// Returns an error when the channel cannot be reopened; the host is then
    /// lost.
    fn recover(&mut self, reason: &str) -> Result<(), TransportError>;

    /// Closes the channel and releases its resources. Idempotent.
    fn shutdown(&mut self);
}

impl CommandSink for Box<dyn Transport> {
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        (**self).write(bytes)
    }
}
