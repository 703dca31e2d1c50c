//! Host-tagged events flowing from engines and workers to the manager.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};

use tracing::debug;

const EVENTS_TARGET: &str = "sysguard_agent::events";

/// Identity of one engaged engine; never reused within a manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EngineId(u64);

impl EngineId {
    /// Wraps a raw identifier.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw identifier value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EngineId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "engine-{}", self.0)
    }
}

/// What happened on a host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEventKind {
    /// The daemon announced a changed sensor set.
    Reconfigure,
    /// The daemon sent free text for the user.
    Notification(String),
    /// A command could not be written; the conversation is stalled.
    WriteFailed(String),
    /// The transport is gone and cannot be recovered.
    TransportFailed(String),
}

/// Event raised by the engine or worker of one host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostEvent {
    /// Engine that raised the event.
    pub engine: EngineId,
    /// Host key the engine serves.
    pub host: String,
    /// Event payload.
    pub kind: HostEventKind,
}

/// Sending half used by an engine to raise [`HostEvent`]s.
#[derive(Debug, Clone)]
pub struct EngineEvents {
    engine: EngineId,
    host: String,
    sender: Sender<HostEvent>,
}

impl EngineEvents {
    /// Creates a sender tagging every event with `engine` and `host`.
    #[must_use]
    pub fn new(engine: EngineId, host: impl Into<String>, sender: Sender<HostEvent>) -> Self {
        Self {
            engine,
            host: host.into(),
            sender,
        }
    }

    /// Engine the events are tagged with.
    #[must_use]
    pub const fn engine(&self) -> EngineId {
        self.engine
    }

    /// Emits `kind`; a closed receiver means the manager is gone.
    pub fn emit(&self, kind: HostEventKind) {
        let event = HostEvent {
            engine: self.engine,
            host: self.host.clone(),
            kind,
        };
        if let Err(error) = self.sender.send(event) {
            debug!(
                target: EVENTS_TARGET,
                host = %self.host,
                engine = %self.engine,
                event = ?error.0.kind,
                "event receiver closed, dropping host event"
            );
        }
    }
}

/// Connection state of a host, shared between its worker and its handles.
#[derive(Debug)]
pub struct HostStatus {
    host: String,
    online: AtomicBool,
    offline_reason: Mutex<Option<String>>,
}

impl HostStatus {
    /// Creates an offline status for `host`.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            host: host.into(),
            online: AtomicBool::new(false),
            offline_reason: Mutex::new(None),
        })
    }

    /// Host key.
    #[must_use]
    pub fn host(&self) -> &str {
        self.host.as_str()
    }

    /// Whether the daemon has shown its first prompt and is still reachable.
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    /// Last recorded reason for going offline.
    #[must_use]
    pub fn offline_reason(&self) -> Option<String> {
        self.offline_reason
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .clone()
    }

    /// Marks the daemon ready and clears any stale reason.
    pub fn set_online(&self) {
        *self
            .offline_reason
            .lock()
            .unwrap_or_else(|poison| poison.into_inner()) = None;
        self.online.store(true, Ordering::Release);
    }

    /// Marks the daemon unreachable, recording `reason` when given.
    pub fn set_offline(&self, reason: Option<String>) {
        self.online.store(false, Ordering::Release);
        if let Some(text) = reason {
            *self
                .offline_reason
                .lock()
                .unwrap_or_else(|poison| poison.into_inner()) = Some(text);
        }
    }
}
