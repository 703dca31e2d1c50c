//! Per-host worker thread owning an engine and its transport.
//!
//! Reader threads and the manager talk to the worker through one inbox, so
//! every engine mutation happens on the worker thread in arrival order.

use std::sync::mpsc::Receiver;

use tracing::{debug, info, warn};

use crate::engine::Engine;
use crate::events::HostEventKind;
use crate::request::{ClientKey, Request};
use crate::transport::Transport;

const WORKER_TARGET: &str = "sysguard_agent::worker";

/// Message delivered to a host worker.
#[derive(Debug)]
pub enum HostInput {
    /// Protocol bytes read from the daemon.
    Output {
        /// Channel generation that produced the bytes.
        generation: u64,
        /// Bytes as read.
        bytes: Vec<u8>,
    },
    /// Error text the daemon wrote to its diagnostic stream.
    Diagnostic {
        /// Channel generation that produced the bytes.
        generation: u64,
        /// Bytes as read.
        bytes: Vec<u8>,
    },
    /// The daemon's output stream ended.
    Closed {
        /// Channel generation that closed.
        generation: u64,
        /// Why the stream ended.
        reason: String,
    },
    /// Queue a request on the engine.
    Send(Request),
    /// Stop delivering answers to a client.
    DisconnectClient(ClientKey),
    /// Tear down the transport and stop.
    Shutdown,
}

/// Runs the worker loop until shutdown, a closed inbox or a lost transport.
pub(crate) fn run(mut engine: Engine<Box<dyn Transport>>, inbox: &Receiver<HostInput>) {
    let host = engine.host_name().to_owned();
    debug!(
        target: WORKER_TARGET,
        host = %host,
        transport = %engine.sink().kind(),
        "host worker started"
    );

    while let Ok(message) = inbox.recv() {
        match message {
            HostInput::Output { generation, bytes } => {
                if is_stale(&engine, generation) {
                    continue;
                }
                engine.sink_mut().note_activity();
                engine.receive(&bytes);
            }
            HostInput::Diagnostic { generation, bytes } => {
                if is_stale(&engine, generation) {
                    continue;
                }
                let text = String::from_utf8_lossy(&bytes);
                warn!(
                    target: WORKER_TARGET,
                    host = %host,
                    text = %text.trim_end(),
                    "daemon wrote to its error stream"
                );
            }
            HostInput::Closed { generation, reason } => {
                if is_stale(&engine, generation) {
                    continue;
                }
                if !recover(&mut engine, &host, &reason) {
                    break;
                }
            }
            HostInput::Send(request) => {
                engine.send_request(request);
            }
            HostInput::DisconnectClient(client) => engine.disconnect_client(client),
            HostInput::Shutdown => break,
        }
    }

    engine.sink_mut().shutdown();
    debug!(
        target: WORKER_TARGET,
        host = %host,
        dropped = engine.queued() + engine.in_flight(),
        "host worker stopped"
    );
}

fn is_stale(engine: &Engine<Box<dyn Transport>>, generation: u64) -> bool {
    let stale = !engine.sink().is_current(generation);
    if stale {
        debug!(
            target: WORKER_TARGET,
            host = %engine.host_name(),
            generation,
            "ignoring message from a replaced channel"
        );
    }
    stale
}

fn recover(engine: &mut Engine<Box<dyn Transport>>, host: &str, reason: &str) -> bool {
    match engine.sink_mut().recover(reason) {
        Ok(()) => {
            info!(target: WORKER_TARGET, host, %reason, "daemon channel recovered");
            engine.restart_session();
            true
        }
        Err(error) => {
            let text = error.to_string();
            warn!(target: WORKER_TARGET, host, error = %text, "daemon channel lost");
            engine.set_offline(Some(text.clone()));
            engine.emit(HostEventKind::TransportFailed(text));
            false
        }
    }
}
