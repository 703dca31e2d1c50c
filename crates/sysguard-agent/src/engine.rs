//! Request queueing and answer correlation for one host.
//!
//! The engine keeps two FIFOs: requests waiting to be written and the single
//! request whose answer is awaited. A command is written only while the
//! daemon is online and nothing is awaiting an answer, so answers map onto
//! requests purely by order.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::events::{EngineEvents, HostEventKind, HostStatus};
use crate::framer::{Frame, Framer};
use crate::request::{ClientKey, Request, RequestKey};
use crate::transport::CommandSink;

const ENGINE_TARGET: &str = "sysguard_agent::engine";
const UNKNOWN_COMMAND: &[u8] = b"UNKNOWN COMMAND";

/// Protocol engine for a single daemon connection.
pub struct Engine<S: CommandSink> {
    sink: S,
    events: EngineEvents,
    status: Arc<HostStatus>,
    framer: Framer,
    input_queue: VecDeque<Request>,
    processing_queue: VecDeque<Request>,
    underway: HashSet<RequestKey>,
    online: bool,
}

impl<S: CommandSink> Engine<S> {
    /// Creates an offline engine writing commands to `sink`.
    #[must_use]
    pub fn new(sink: S, events: EngineEvents, status: Arc<HostStatus>) -> Self {
        Self {
            sink,
            events,
            status,
            framer: Framer::new(),
            input_queue: VecDeque::new(),
            processing_queue: VecDeque::new(),
            underway: HashSet::new(),
            online: false,
        }
    }

    /// Host key this engine serves.
    #[must_use]
    pub fn host_name(&self) -> &str {
        self.status.host()
    }

    /// Whether the daemon's first prompt has been seen.
    #[must_use]
    pub const fn is_online(&self) -> bool {
        self.online
    }

    /// Last recorded reason for going offline.
    #[must_use]
    pub fn offline_reason(&self) -> Option<String> {
        self.status.offline_reason()
    }

    /// Requests not yet written.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.input_queue.len()
    }

    /// Requests written and awaiting their answer.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.processing_queue.len()
    }

    /// Command sink.
    #[must_use]
    pub const fn sink(&self) -> &S {
        &self.sink
    }

    /// Mutable command sink.
    pub const fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Queues `request` unless an identical one is outstanding.
    ///
    /// Returns whether the request was accepted.
    pub fn send_request(&mut self, request: Request) -> bool {
        if self.underway.contains(request.key()) {
            debug!(
                target: ENGINE_TARGET,
                host = %self.host_name(),
                command = %request.text(),
                id = request.id(),
                "ignoring duplicate request"
            );
            return false;
        }

        self.underway.insert(request.key().clone());
        self.input_queue.push_back(request);
        self.dispatch();
        true
    }

    /// Consumes a chunk of daemon output.
    ///
    /// Client callbacks and host events for every frame the chunk completes
    /// run before this returns, in stream order.
    pub fn receive(&mut self, chunk: &[u8]) {
        trace!(
            target: ENGINE_TARGET,
            host = %self.host_name(),
            bytes = chunk.len(),
            "received daemon output"
        );
        for frame in self.framer.feed(chunk) {
            match frame {
                Frame::Prompt { lines } => self.complete_answer(lines),
                Frame::Message(text) => self.events.emit(HostEventKind::Notification(text)),
                Frame::Reconfigure => self.events.emit(HostEventKind::Reconfigure),
            }
        }
        self.dispatch();
    }

    /// Stops delivery to `client` for every outstanding request it issued.
    ///
    /// The requests keep their queue positions so other clients' answers are
    /// still matched correctly; their dedup keys are released at once.
    pub fn disconnect_client(&mut self, client: ClientKey) {
        let mut detached = 0_usize;
        for request in self
            .input_queue
            .iter_mut()
            .chain(self.processing_queue.iter_mut())
            .filter(|request| !request.is_detached() && request.client_key() == client)
        {
            self.underway.remove(request.key());
            request.detach();
            detached += 1;
        }
        if detached > 0 {
            debug!(
                target: ENGINE_TARGET,
                host = %self.host_name(),
                detached,
                "client disconnected"
            );
        }
    }

    /// Starts a fresh conversation after the daemon was restarted.
    ///
    /// The awaited answer died with the old daemon, so its request is
    /// dropped rather than replayed; queued requests are kept and written
    /// once the new daemon shows its first prompt.
    pub fn restart_session(&mut self) {
        self.set_offline(None);
        self.framer.reset();
        for request in self.processing_queue.drain(..) {
            if !request.is_detached() {
                self.underway.remove(request.key());
            }
            debug!(
                target: ENGINE_TARGET,
                host = %self.status.host(),
                command = %request.text(),
                id = request.id(),
                "dropping request lost with the daemon"
            );
        }
        debug!(
            target: ENGINE_TARGET,
            host = %self.host_name(),
            queued = self.input_queue.len(),
            "daemon session restarted"
        );
    }

    /// Marks the engine offline with `reason`.
    pub fn set_offline(&mut self, reason: Option<String>) {
        self.online = false;
        self.status.set_offline(reason);
    }

    /// Raises a host event tagged with this engine.
    pub(crate) fn emit(&self, kind: HostEventKind) {
        self.events.emit(kind);
    }

    fn complete_answer(&mut self, lines: Vec<Vec<u8>>) {
        if !self.online {
            self.online = true;
            self.status.set_online();
            debug!(
                target: ENGINE_TARGET,
                host = %self.host_name(),
                banner_lines = lines.len(),
                "daemon is ready"
            );
            return;
        }

        let Some(request) = self.processing_queue.pop_front() else {
            warn!(
                target: ENGINE_TARGET,
                host = %self.host_name(),
                lines = lines.len(),
                "discarding answer without a pending request"
            );
            return;
        };
        if !request.is_detached() {
            self.underway.remove(request.key());
        }

        let Some(client) = request.client() else {
            trace!(
                target: ENGINE_TARGET,
                host = %self.host_name(),
                id = request.id(),
                "discarding answer for departed client"
            );
            return;
        };
        match lines.as_slice() {
            [only] if only.as_slice() == UNKNOWN_COMMAND => {
                debug!(
                    target: ENGINE_TARGET,
                    host = %self.host_name(),
                    command = %request.text(),
                    id = request.id(),
                    "daemon does not know sensor"
                );
                client.sensor_lost(request.id());
            }
            _ => client.answer_received(request.id(), &lines),
        }
    }

    fn dispatch(&mut self) {
        if !self.online || !self.processing_queue.is_empty() {
            return;
        }
        let Some(request) = self.input_queue.pop_front() else {
            return;
        };

        let mut command = Vec::with_capacity(request.text().len() + 1);
        command.extend_from_slice(request.text().as_bytes());
        command.push(b'\n');
        let outcome = self.sink.write(&command);
        debug!(
            target: ENGINE_TARGET,
            host = %self.host_name(),
            command = %request.text(),
            id = request.id(),
            "dispatched command"
        );
        self.processing_queue.push_back(request);

        if let Err(error) = outcome {
            warn!(
                target: ENGINE_TARGET,
                host = %self.host_name(),
                %error,
                "failed to write command"
            );
            let reason = error.to_string();
            self.set_offline(Some(reason.clone()));
            self.events.emit(HostEventKind::WriteFailed(reason));
        }
    }
}

impl<S: CommandSink> std::fmt::Debug for Engine<S> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Engine")
            .field("host", &self.host_name())
            .field("online", &self.online)
            .field("queued", &self.input_queue.len())
            .field("in_flight", &self.processing_queue.len())
            .finish_non_exhaustive()
    }
}
