//! Background threads draining daemon output into a host worker's inbox.

use std::io::{ErrorKind, Read};
use std::sync::mpsc::Sender;
use std::thread::{self, JoinHandle};

use tracing::debug;

use super::{TRANSPORT_TARGET, TransportError};
use crate::worker::HostInput;

const READ_CHUNK: usize = 4096;

/// Which flavour of message a reader produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum StreamRole {
    /// Protocol bytes from a child's stdout; end of stream closes the
    /// connection.
    Output,
    /// Protocol bytes from a TCP stream; closes like [`Self::Output`].
    Socket,
    /// Free-form error text; end of stream is ignored.
    Diagnostic,
}

impl StreamRole {
    const fn label(self) -> &'static str {
        match self {
            Self::Output => "stdout",
            Self::Socket => "socket",
            Self::Diagnostic => "stderr",
        }
    }

    const fn closes_connection(self) -> bool {
        matches!(self, Self::Output | Self::Socket)
    }

    fn message(self, generation: u64, bytes: Vec<u8>) -> HostInput {
        match self {
            Self::Output | Self::Socket => HostInput::Output { generation, bytes },
            Self::Diagnostic => HostInput::Diagnostic { generation, bytes },
        }
    }
}

/// Spawns a thread forwarding everything read from `source` to `inbox`.
///
/// Messages are tagged with `generation` so the worker can drop output from
/// a daemon instance that has since been replaced.
pub(super) fn spawn_reader<R>(
    host: &str,
    role: StreamRole,
    generation: u64,
    source: R,
    inbox: Sender<HostInput>,
) -> Result<JoinHandle<()>, TransportError>
where
    R: Read + Send + 'static,
{
    let label = role.label();
    let owner = host.to_owned();
    thread::Builder::new()
        .name(format!("sysguard-{host}-{label}"))
        .spawn(move || pump(&owner, role, generation, source, &inbox))
        .map_err(|source_error| TransportError::Reader {
            stream: label,
            source: source_error,
        })
}

fn pump<R: Read>(host: &str, role: StreamRole, generation: u64, mut source: R, inbox: &Sender<HostInput>) {
    let mut buffer = [0_u8; READ_CHUNK];
    let reason = loop {
        match source.read(&mut buffer) {
            Ok(0) => break String::from("end of stream"),
            Ok(count) => {
                let bytes = buffer.get(..count).unwrap_or_default().to_vec();
                if inbox.send(role.message(generation, bytes)).is_err() {
                    debug!(target: TRANSPORT_TARGET, host, stream = role.label(), "worker gone, reader stopping");
                    return;
                }
            }
            Err(error) if error.kind() == ErrorKind::Interrupted => {}
            Err(error) => break error.to_string(),
        }
    };

    debug!(target: TRANSPORT_TARGET, host, stream = role.label(), generation, %reason, "reader finished");
    if role.closes_connection()
        && inbox
            .send(HostInput::Closed { generation, reason })
            .is_err()
    {
        debug!(target: TRANSPORT_TARGET, host, "worker gone before close was reported");
    }
}
