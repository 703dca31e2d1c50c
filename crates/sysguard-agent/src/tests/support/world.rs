//! Engine harness shared by unit tests and behaviour steps.

use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;

use crate::engine::Engine;
use crate::events::{EngineEvents, EngineId, HostEvent, HostEventKind, HostStatus};
use crate::request::{ClientKey, Request, SensorClient};

use super::recording::{RecordingClient, RecordingSink};

/// Banner a freshly started daemon prints before its first prompt.
pub const BANNER: &[u8] = b"ksysguardd 4.0.0\n(c) 1999-2024 sysguard test\nksysguardd> ";

/// Engine over a recording sink with named clients.
pub struct TestWorld {
    pub engine: Engine<RecordingSink>,
    events: Receiver<HostEvent>,
    clients: HashMap<String, Arc<RecordingClient>>,
}

impl TestWorld {
    /// Engine that has not seen its daemon's banner yet.
    pub fn offline() -> Self {
        let (sender, events) = mpsc::channel();
        let engine = Engine::new(
            RecordingSink::default(),
            EngineEvents::new(EngineId::new(1), "alpha", sender),
            HostStatus::new("alpha"),
        );
        Self {
            engine,
            events,
            clients: HashMap::new(),
        }
    }

    /// Engine whose daemon is ready for commands.
    pub fn ready() -> Self {
        let mut world = Self::offline();
        world.engine.receive(BANNER);
        world
    }

    /// Client registered under `name`, created on first use.
    pub fn client(&mut self, name: &str) -> Arc<RecordingClient> {
        Arc::clone(
            self.clients
                .entry(name.to_owned())
                .or_insert_with(RecordingClient::new),
        )
    }

    /// Sends `text` on behalf of client `name`.
    pub fn request(&mut self, name: &str, text: &str, id: i32) -> bool {
        let client: Arc<dyn SensorClient> = self.client(name);
        self.engine.send_request(Request::new(text, &client, id))
    }

    /// Disconnects client `name`.
    pub fn disconnect(&mut self, name: &str) {
        let client: Arc<dyn SensorClient> = self.client(name);
        self.engine.disconnect_client(ClientKey::of(&client));
    }

    /// Delivers a one-line answer followed by the prompt.
    pub fn reply(&mut self, line: &str) {
        self.engine
            .receive(format!("{line}\nksysguardd> ").as_bytes());
    }

    /// Commands the engine wrote.
    pub fn written(&self) -> Vec<String> {
        self.engine.sink().written()
    }

    /// Host events raised so far.
    pub fn host_events(&self) -> Vec<HostEventKind> {
        self.events.try_iter().map(|event| event.kind).collect()
    }
}
