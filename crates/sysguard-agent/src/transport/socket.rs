//! Daemon listening on a TCP port.

use std::io::{self, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::mpsc::Sender;
use std::time::Duration;

use tracing::{debug, info};

use super::reader::{StreamRole, spawn_reader};
use super::{CommandSink, TRANSPORT_TARGET, Transport, TransportError, TransportKind};
use crate::worker::HostInput;

const GENERATION: u64 = 1;

/// TCP connection to a network daemon.
///
/// The connection is never reopened in place; any close is final and the
/// manager decides whether to engage the host again.
#[derive(Debug)]
pub struct SocketTransport {
    host: String,
    port: u16,
    stream: TcpStream,
    open: bool,
}

impl SocketTransport {
    /// Connects to `host:port`, trying every resolved address in turn.
    ///
    /// # Errors
    ///
    /// Returns an error when the name does not resolve, no address accepts
    /// the connection within `timeout`, or the reader cannot be started.
    pub fn connect(
        host: &str,
        port: u16,
        timeout: Duration,
        inbox: Sender<HostInput>,
    ) -> Result<Self, TransportError> {
        let addresses: Vec<SocketAddr> = (host, port)
            .to_socket_addrs()
            .map_err(|source| TransportError::Resolve {
                host: host.to_owned(),
                port,
                source,
            })?
            .collect();
        if addresses.is_empty() {
            return Err(TransportError::ResolveEmpty {
                host: host.to_owned(),
                port,
            });
        }

        let stream = connect_any(&addresses, timeout).map_err(|source| TransportError::Connect {
            host: host.to_owned(),
            port,
            source,
        })?;
        if let Err(error) = stream.set_nodelay(true) {
            debug!(target: TRANSPORT_TARGET, host, %error, "failed to disable Nagle's algorithm");
        }

        let reader = stream.try_clone().map_err(|source| TransportError::Reader {
            stream: "socket",
            source,
        })?;
        spawn_reader(host, StreamRole::Socket, GENERATION, reader, inbox)?;

        info!(
            target: TRANSPORT_TARGET,
            host,
            port,
            peer = ?stream.peer_addr().ok(),
            "connected to daemon"
        );
        Ok(Self {
            host: host.to_owned(),
            port,
            stream,
            open: true,
        })
    }

    /// Remote port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }
}

fn connect_any(addresses: &[SocketAddr], timeout: Duration) -> io::Result<TcpStream> {
    let mut last_error = None;
    for address in addresses {
        match TcpStream::connect_timeout(address, timeout) {
            Ok(stream) => return Ok(stream),
            Err(error) => {
                debug!(target: TRANSPORT_TARGET, %address, %error, "connection attempt failed");
                last_error = Some(error);
            }
        }
    }
    Err(last_error.unwrap_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no address")))
}

impl CommandSink for SocketTransport {
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        if !self.open {
            return Err(TransportError::NotRunning);
        }
        self.stream
            .write_all(bytes)
            .and_then(|()| self.stream.flush())
            .map_err(TransportError::Write)
    }
}

impl Transport for SocketTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Socket
    }

    fn is_current(&self, generation: u64) -> bool {
        self.open && generation == GENERATION
    }

    fn note_activity(&mut self) {}

    fn recover(&mut self, reason: &str) -> Result<(), TransportError> {
        self.shutdown();
        Err(TransportError::Closed {
            reason: reason.to_owned(),
        })
    }

    fn shutdown(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;
        match self.stream.shutdown(Shutdown::Both) {
            Ok(()) => debug!(target: TRANSPORT_TARGET, host = %self.host, "connection closed"),
            Err(error) if error.kind() == io::ErrorKind::NotConnected => {}
            Err(error) => {
                debug!(target: TRANSPORT_TARGET, host = %self.host, %error, "failed to close connection");
            }
        }
    }
}

impl Drop for SocketTransport {
    fn drop(&mut self) {
        self.shutdown();
    }
}
