//! Host-keyed ownership of engines and their transports.
//!
//! [`ConnectionManager`] engages one worker per host, routes requests to it
//! and turns the events workers raise into [`ManagerEvent`]s for its owner.
//! The owner drives event handling by calling [`ConnectionManager::process_events`]
//! or [`ConnectionManager::wait_event`]; self-disengagement after a lost
//! transport happens there, on the owner's thread.

use std::collections::{HashMap, VecDeque};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use sysguard_config::Config;
use tracing::{debug, info, warn};

use crate::engine::Engine;
use crate::errors::ManagerError;
use crate::events::{EngineEvents, EngineId, HostEvent, HostEventKind, HostStatus};
use crate::request::{ClientKey, Request, SensorClient};
use crate::transport::{
    ProcessCommand, ProcessTransport, SocketTransport, Transport, TransportError,
};
use crate::worker::{self, HostInput};

const MANAGER_TARGET: &str = "sysguard_agent::manager";

/// How a host's daemon is reached.
///
/// A port selects the socket transport. Otherwise the daemon is spawned from
/// `command` when given, or through `shell` on the remote host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionParams {
    shell: Option<String>,
    command: Option<String>,
    port: Option<u16>,
}

impl ConnectionParams {
    /// Runs `command` as the daemon.
    #[must_use]
    pub fn local(command: impl Into<String>) -> Self {
        Self {
            command: Some(command.into()),
            ..Self::default()
        }
    }

    /// Starts the daemon on the host through `shell`.
    #[must_use]
    pub fn remote_shell(shell: impl Into<String>) -> Self {
        Self {
            shell: Some(shell.into()),
            ..Self::default()
        }
    }

    /// Connects to a daemon listening on `port`.
    #[must_use]
    pub fn socket(port: u16) -> Self {
        Self {
            port: Some(port),
            ..Self::default()
        }
    }

    /// Remote execution shell.
    #[must_use]
    pub fn shell(&self) -> Option<&str> {
        self.shell.as_deref()
    }

    /// Literal daemon command line.
    #[must_use]
    pub fn command(&self) -> Option<&str> {
        self.command.as_deref()
    }

    /// TCP port.
    #[must_use]
    pub const fn port(&self) -> Option<u16> {
        self.port
    }
}

/// Manager-wide defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerSettings {
    /// Host key engaged on demand by [`ConnectionManager::send_request`].
    pub local_host: String,
    /// Daemon command used for the local host.
    pub local_command: String,
    /// Shell used when parameters name neither a command nor a shell.
    pub remote_shell: String,
    /// Time allowed to establish a TCP connection.
    pub connect_timeout: Duration,
}

impl From<&Config> for ManagerSettings {
    fn from(config: &Config) -> Self {
        Self {
            local_host: String::from("localhost"),
            local_command: config.local_command().to_owned(),
            remote_shell: config.remote_shell().to_owned(),
            connect_timeout: config.connect_timeout(),
        }
    }
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

/// Read-only view of an engaged engine.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    id: EngineId,
    status: Arc<HostStatus>,
}

impl EngineHandle {
    /// Engine identity.
    #[must_use]
    pub const fn id(&self) -> EngineId {
        self.id
    }

    /// Host key.
    #[must_use]
    pub fn host_name(&self) -> &str {
        self.status.host()
    }

    /// Whether the daemon is ready.
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.status.is_online()
    }

    /// Last recorded reason for going offline.
    #[must_use]
    pub fn offline_reason(&self) -> Option<String> {
        self.status.offline_reason()
    }
}

/// Notification for the owner of a [`ConnectionManager`].
#[derive(Debug, Clone)]
pub enum ManagerEvent {
    /// A host was engaged.
    HostAdded {
        /// Host key.
        host: String,
        /// Handle of the new engine.
        engine: EngineHandle,
    },
    /// A host was disengaged, on request or after its transport failed.
    HostConnectionLost {
        /// Host key.
        host: String,
        /// Why the host went offline, when known.
        reason: Option<String>,
    },
    /// A daemon's sensor set changed; clients should re-query it.
    Update {
        /// Host key.
        host: String,
    },
    /// Free text the daemon sent for the user.
    Notification {
        /// Host key.
        host: String,
        /// Message text.
        message: String,
    },
}

struct HostConnection {
    handle: EngineHandle,
    params: ConnectionParams,
    inbox: Sender<HostInput>,
    worker: Option<JoinHandle<()>>,
}

/// Owner of every engaged host.
pub struct ConnectionManager {
    settings: ManagerSettings,
    hosts: HashMap<String, HostConnection>,
    events_tx: Sender<HostEvent>,
    events_rx: Receiver<HostEvent>,
    pending: VecDeque<ManagerEvent>,
    next_engine: u64,
}

impl ConnectionManager {
    /// Creates a manager with no engaged hosts.
    #[must_use]
    pub fn new(settings: ManagerSettings) -> Self {
        let (events_tx, events_rx) = mpsc::channel();
        Self {
            settings,
            hosts: HashMap::new(),
            events_tx,
            events_rx,
            pending: VecDeque::new(),
            next_engine: 0,
        }
    }

    /// Active settings.
    #[must_use]
    pub const fn settings(&self) -> &ManagerSettings {
        &self.settings
    }

    /// Engaged host keys, in no particular order.
    pub fn hosts(&self) -> impl Iterator<Item = &str> {
        self.hosts.keys().map(String::as_str)
    }

    /// Whether `host` has an engaged engine.
    #[must_use]
    pub fn is_engaged(&self, host: &str) -> bool {
        self.hosts.contains_key(host)
    }

    /// Handle of the engine serving `host`.
    #[must_use]
    pub fn engine(&self, host: &str) -> Option<EngineHandle> {
        self.hosts.get(host).map(|connection| connection.handle.clone())
    }

    /// Starts a transport and worker for `host`.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::AlreadyEngaged`] when the host is mapped, or
    /// an error when the transport or worker cannot be started; nothing is
    /// registered in that case.
    pub fn engage(
        &mut self,
        host: &str,
        params: ConnectionParams,
    ) -> Result<EngineHandle, ManagerError> {
        if self.hosts.contains_key(host) {
            return Err(ManagerError::AlreadyEngaged {
                host: host.to_owned(),
            });
        }

        let (inbox, receiver) = mpsc::channel();
        let transport = self
            .open_transport(host, &params, inbox.clone())
            .map_err(|source| ManagerError::Transport {
                host: host.to_owned(),
                source,
            })?;

        self.next_engine += 1;
        let id = EngineId::new(self.next_engine);
        let status = HostStatus::new(host);
        let events = EngineEvents::new(id, host, self.events_tx.clone());
        let engine = Engine::new(transport, events, Arc::clone(&status));
        let worker = thread::Builder::new()
            .name(format!("sysguard-{host}"))
            .spawn(move || worker::run(engine, &receiver))
            .map_err(|source| ManagerError::Worker {
                host: host.to_owned(),
                source,
            })?;

        let handle = EngineHandle { id, status };
        info!(
            target: MANAGER_TARGET,
            host,
            engine = %id,
            "host engaged"
        );
        self.hosts.insert(
            host.to_owned(),
            HostConnection {
                handle: handle.clone(),
                params,
                inbox,
                worker: Some(worker),
            },
        );
        self.pending.push_back(ManagerEvent::HostAdded {
            host: host.to_owned(),
            engine: handle.clone(),
        });
        Ok(handle)
    }

    /// Tears down the engine serving `host`.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::UnknownHost`] when the host is not engaged.
    pub fn disengage(&mut self, host: &str) -> Result<(), ManagerError> {
        let connection = self
            .hosts
            .remove(host)
            .ok_or_else(|| ManagerError::UnknownHost {
                host: host.to_owned(),
            })?;
        let reason = Self::stop(host, connection);
        info!(target: MANAGER_TARGET, host, ?reason, "host disengaged");
        self.pending.push_back(ManagerEvent::HostConnectionLost {
            host: host.to_owned(),
            reason,
        });
        Ok(())
    }

    /// Tears down the engine behind `handle`.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::UnknownEngine`] when the engine is already gone.
    pub fn disengage_engine(&mut self, handle: &EngineHandle) -> Result<(), ManagerError> {
        let host = self
            .hosts
            .iter()
            .find(|(_, connection)| connection.handle.id == handle.id)
            .map(|(host, _)| host.clone())
            .ok_or(ManagerError::UnknownEngine { engine: handle.id })?;
        self.disengage(&host)
    }

    /// Disengages `host` and engages it again with the same parameters.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::UnknownHost`] when the host is not engaged,
    /// or the error of the new engagement; the host stays disengaged then.
    pub fn resynchronize(&mut self, host: &str) -> Result<EngineHandle, ManagerError> {
        let params = self
            .hosts
            .get(host)
            .map(|connection| connection.params.clone())
            .ok_or_else(|| ManagerError::UnknownHost {
                host: host.to_owned(),
            })?;
        self.disengage(host)?;
        self.engage(host, params)
    }

    /// Queues `text` for `host`, answering to `client` with `id`.
    ///
    /// The local host is engaged on demand with the configured local command.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::UnknownHost`] for any other unmapped host, or
    /// an error when the local host cannot be engaged or its worker is gone.
    pub fn send_request(
        &mut self,
        host: &str,
        text: &str,
        client: &Arc<dyn SensorClient>,
        id: i32,
    ) -> Result<(), ManagerError> {
        if !self.hosts.contains_key(host) {
            if host != self.settings.local_host {
                return Err(ManagerError::UnknownHost {
                    host: host.to_owned(),
                });
            }
            let params = ConnectionParams::local(self.settings.local_command.clone());
            self.engage(host, params)?;
        }
        self.deliver(host, HostInput::Send(Request::new(text, client, id)))
    }

    /// Stops answer delivery to `client` on every host.
    pub fn disconnect_client(&mut self, client: &Arc<dyn SensorClient>) {
        let key = ClientKey::of(client);
        for (host, connection) in &self.hosts {
            if connection.inbox.send(HostInput::DisconnectClient(key)).is_err() {
                debug!(target: MANAGER_TARGET, host = %host, "worker gone, skipping disconnect");
            }
        }
    }

    /// Handles every host event raised so far and returns the resulting
    /// manager events in order.
    pub fn process_events(&mut self) -> Vec<ManagerEvent> {
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_host_event(event);
        }
        self.pending.drain(..).collect()
    }

    /// Waits up to `timeout` for the next manager event.
    pub fn wait_event(&mut self, timeout: Duration) -> Option<ManagerEvent> {
        let deadline = Instant::now() + timeout;
        loop {
            while let Ok(event) = self.events_rx.try_recv() {
                self.handle_host_event(event);
            }
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.events_rx.recv_timeout(remaining) {
                Ok(event) => self.handle_host_event(event),
                Err(_) => return self.pending.pop_front(),
            }
        }
    }

    fn open_transport(
        &self,
        host: &str,
        params: &ConnectionParams,
        inbox: Sender<HostInput>,
    ) -> Result<Box<dyn Transport>, TransportError> {
        if let Some(port) = params.port {
            let transport =
                SocketTransport::connect(host, port, self.settings.connect_timeout, inbox)?;
            return Ok(Box::new(transport));
        }

        let command = match (params.command(), params.shell()) {
            (Some(line), _) => ProcessCommand::parse(line)?,
            (None, Some(shell)) => ProcessCommand::remote(shell, host)?,
            (None, None) => ProcessCommand::remote(&self.settings.remote_shell, host)?,
        };
        Ok(Box::new(ProcessTransport::spawn(host, command, inbox)?))
    }

    fn deliver(&self, host: &str, message: HostInput) -> Result<(), ManagerError> {
        let connection = self
            .hosts
            .get(host)
            .ok_or_else(|| ManagerError::UnknownHost {
                host: host.to_owned(),
            })?;
        connection
            .inbox
            .send(message)
            .map_err(|_| ManagerError::WorkerStopped {
                host: host.to_owned(),
            })
    }

    fn handle_host_event(&mut self, event: HostEvent) {
        let current = self
            .hosts
            .get(&event.host)
            .is_some_and(|connection| connection.handle.id == event.engine);
        if !current {
            debug!(
                target: MANAGER_TARGET,
                host = %event.host,
                engine = %event.engine,
                "ignoring event from a disengaged engine"
            );
            return;
        }

        let HostEvent { host, kind, .. } = event;
        match kind {
            HostEventKind::Reconfigure => self.pending.push_back(ManagerEvent::Update { host }),
            HostEventKind::Notification(message) => {
                self.pending
                    .push_back(ManagerEvent::Notification { host, message });
            }
            HostEventKind::WriteFailed(reason) => {
                warn!(target: MANAGER_TARGET, host = %host, %reason, "reconnecting after write failure");
                if let Err(error) = self.resynchronize(&host) {
                    warn!(target: MANAGER_TARGET, host = %host, %error, "reconnect failed");
                }
            }
            HostEventKind::TransportFailed(reason) => {
                warn!(target: MANAGER_TARGET, host = %host, %reason, "host lost");
                if let Err(error) = self.disengage(&host) {
                    debug!(target: MANAGER_TARGET, host = %host, %error, "host already gone");
                }
            }
        }
    }

    fn stop(host: &str, mut connection: HostConnection) -> Option<String> {
        if connection.inbox.send(HostInput::Shutdown).is_err() {
            debug!(target: MANAGER_TARGET, host, "worker already stopped");
        }
        if let Some(worker) = connection.worker.take()
            && worker.join().is_err()
        {
            warn!(target: MANAGER_TARGET, host, "host worker panicked");
        }
        connection.handle.offline_reason()
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        let hosts: Vec<String> = self.hosts.keys().cloned().collect();
        for host in hosts {
            if let Err(error) = self.disengage(&host) {
                debug!(target: MANAGER_TARGET, host = %host, %error, "failed to disengage on drop");
            }
        }
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut hosts: Vec<&str> = self.hosts().collect();
        hosts.sort_unstable();
        formatter
            .debug_struct("ConnectionManager")
            .field("settings", &self.settings)
            .field("hosts", &hosts)
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}
