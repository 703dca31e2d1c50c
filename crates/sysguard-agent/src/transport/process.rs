//! Daemon reached through a spawned child process.

use std::fmt;
use std::io::{ErrorKind, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::Sender;

use tracing::{debug, info, warn};

use super::lifecycle::terminate_child;
use super::reader::{StreamRole, spawn_reader};
use super::{CommandSink, TRANSPORT_TARGET, Transport, TransportError, TransportKind};
use crate::worker::HostInput;

/// Consecutive unexpected exits tolerated before the host is given up.
pub const RESTART_BUDGET: u32 = 3;

const REMOTE_DAEMON: &str = "ksysguardd";

/// Program and arguments used to start the daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessCommand {
    program: String,
    args: Vec<String>,
}

impl ProcessCommand {
    /// Splits a literal command line on whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::EmptyCommand`] when `line` has no words.
    pub fn parse(line: &str) -> Result<Self, TransportError> {
        let mut words = line.split_whitespace().map(str::to_owned);
        let program = words.next().ok_or(TransportError::EmptyCommand)?;
        Ok(Self {
            program,
            args: words.collect(),
        })
    }

    /// Builds `<shell> <host> ksysguardd`; `shell` may carry its own flags.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::EmptyCommand`] when `shell` is blank.
    pub fn remote(shell: &str, host: &str) -> Result<Self, TransportError> {
        let mut command = Self::parse(shell)?;
        command.args.push(host.to_owned());
        command.args.push(String::from(REMOTE_DAEMON));
        Ok(command)
    }

    /// Program to execute.
    #[must_use]
    pub fn program(&self) -> &str {
        self.program.as_str()
    }

    /// Arguments passed to the program.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }
}

impl fmt::Display for ProcessCommand {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.program)?;
        for arg in &self.args {
            write!(formatter, " {arg}")?;
        }
        Ok(())
    }
}

struct RunningDaemon {
    child: Child,
    stdin: ChildStdin,
}

/// Daemon child process with stdout, stderr and stdin piped.
///
/// Every (re)start bumps a generation counter that tags reader messages, so
/// output from a replaced daemon instance is recognisably stale.
pub struct ProcessTransport {
    host: String,
    command: ProcessCommand,
    inbox: Sender<HostInput>,
    running: Option<RunningDaemon>,
    generation: u64,
    restarts_left: u32,
}

impl ProcessTransport {
    /// Starts the daemon for `host` and its reader threads.
    ///
    /// # Errors
    ///
    /// Returns an error when the process cannot be spawned or its streams
    /// cannot be drained; nothing is left running in that case.
    pub fn spawn(
        host: impl Into<String>,
        command: ProcessCommand,
        inbox: Sender<HostInput>,
    ) -> Result<Self, TransportError> {
        let mut transport = Self {
            host: host.into(),
            command,
            inbox,
            running: None,
            generation: 0,
            restarts_left: RESTART_BUDGET,
        };
        transport.start()?;
        Ok(transport)
    }

    /// Process id of the running daemon.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.running.as_ref().map(|daemon| daemon.child.id())
    }

    /// Generation of the current daemon instance.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Restarts still allowed before the host is given up.
    #[must_use]
    pub const fn restarts_left(&self) -> u32 {
        self.restarts_left
    }

    fn start(&mut self) -> Result<(), TransportError> {
        self.generation += 1;
        debug!(
            target: TRANSPORT_TARGET,
            host = %self.host,
            command = %self.command,
            generation = self.generation,
            "spawning daemon"
        );

        let mut child = Command::new(self.command.program())
            .args(self.command.args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| {
                if source.kind() == ErrorKind::NotFound {
                    TransportError::BinaryNotFound {
                        command: self.command.program().to_owned(),
                        source,
                    }
                } else {
                    TransportError::Spawn {
                        command: self.command.to_string(),
                        source,
                    }
                }
            })?;

        match self.attach(&mut child) {
            Ok(stdin) => {
                info!(
                    target: TRANSPORT_TARGET,
                    host = %self.host,
                    pid = child.id(),
                    "daemon started"
                );
                self.running = Some(RunningDaemon { child, stdin });
                Ok(())
            }
            Err(error) => {
                terminate_child(&mut child, &self.host);
                Err(error)
            }
        }
    }

    fn attach(&self, child: &mut Child) -> Result<ChildStdin, TransportError> {
        let stdin = child
            .stdin
            .take()
            .ok_or(TransportError::MissingPipe { stream: "stdin" })?;
        let stdout = child
            .stdout
            .take()
            .ok_or(TransportError::MissingPipe { stream: "stdout" })?;
        let stderr = child
            .stderr
            .take()
            .ok_or(TransportError::MissingPipe { stream: "stderr" })?;

        spawn_reader(
            &self.host,
            StreamRole::Output,
            self.generation,
            stdout,
            self.inbox.clone(),
        )?;
        spawn_reader(
            &self.host,
            StreamRole::Diagnostic,
            self.generation,
            stderr,
            self.inbox.clone(),
        )?;
        Ok(stdin)
    }

    fn stop(&mut self) {
        if let Some(RunningDaemon { mut child, stdin }) = self.running.take() {
            drop(stdin);
            terminate_child(&mut child, &self.host);
        }
    }
}

impl CommandSink for ProcessTransport {
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let daemon = self.running.as_mut().ok_or(TransportError::NotRunning)?;
        daemon
            .stdin
            .write_all(bytes)
            .and_then(|()| daemon.stdin.flush())
            .map_err(TransportError::Write)
    }
}

impl Transport for ProcessTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Process
    }

    fn is_current(&self, generation: u64) -> bool {
        self.running.is_some() && generation == self.generation
    }

    fn note_activity(&mut self) {
        self.restarts_left = RESTART_BUDGET;
    }

    fn recover(&mut self, reason: &str) -> Result<(), TransportError> {
        self.stop();
        if self.restarts_left == 0 {
            warn!(
                target: TRANSPORT_TARGET,
                host = %self.host,
                %reason,
                "daemon restart budget exhausted"
            );
            return Err(TransportError::RestartsExhausted {
                attempts: RESTART_BUDGET,
                reason: reason.to_owned(),
            });
        }

        self.restarts_left -= 1;
        warn!(
            target: TRANSPORT_TARGET,
            host = %self.host,
            %reason,
            restarts_left = self.restarts_left,
            "daemon exited unexpectedly, restarting"
        );
        self.start()
    }

    fn shutdown(&mut self) {
        self.stop();
    }
}

impl Drop for ProcessTransport {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for ProcessTransport {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ProcessTransport")
            .field("host", &self.host)
            .field("command", &self.command)
            .field("pid", &self.pid())
            .field("generation", &self.generation)
            .field("restarts_left", &self.restarts_left)
            .finish_non_exhaustive()
    }
}
