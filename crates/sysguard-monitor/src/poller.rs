//! Polling loop that drives one host through the connection manager.
//!
//! Answers arrive on worker threads; [`ChannelClient`] forwards them to the
//! polling thread, which owns the output streams and prints them in arrival
//! order. Manager events are handled between readings.

use std::collections::BTreeSet;
use std::io::Write;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::{Duration, Instant};

use sysguard_agent::{ConnectionManager, ConnectionParams, ManagerEvent, SensorClient};
use sysguard_config::{Config, HostEndpoint};
use tracing::{debug, info};

use crate::IoStreams;
use crate::cli::Cli;
use crate::errors::MonitorError;

const POLLER_TARGET: &str = "sysguard_monitor::poller";

/// Longest single wait for manager events while readings may be pending.
const TICK: Duration = Duration::from_millis(50);

/// Request id of the sensor list query.
const MONITORS_ID: i32 = 0;
const MONITORS_COMMAND: &str = "monitors";

/// What to poll, where, and how often.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PollPlan {
    pub(crate) host: String,
    pub(crate) params: ConnectionParams,
    pub(crate) sensors: Vec<String>,
    pub(crate) rounds: u64,
    pub(crate) list_monitors: bool,
    pub(crate) interval: Duration,
    pub(crate) grace: Duration,
}

impl PollPlan {
    #[must_use]
    pub(crate) fn new(cli: Cli, config: &Config, local_host: &str) -> Self {
        Self {
            host: cli.host.host().to_owned(),
            params: connection_params(&cli.host, config, local_host, cli.socket),
            sensors: cli.sensors,
            rounds: cli.count,
            list_monitors: cli.monitors,
            interval: config.poll_interval(),
            grace: config.poll_interval().max(config.connect_timeout()),
        }
    }

    fn command(&self, id: i32) -> Option<&str> {
        if id == MONITORS_ID {
            return Some(MONITORS_COMMAND);
        }
        usize::try_from(id)
            .ok()
            .and_then(|position| position.checked_sub(1))
            .and_then(|index| self.sensors.get(index))
            .map(String::as_str)
    }
}

/// Chooses how the daemon behind `endpoint` is reached.
///
/// Explicit ports and `--socket` select the network transport. Otherwise the
/// local host runs the configured command and other hosts go through the
/// endpoint's shell, or the configured one.
#[must_use]
pub(crate) fn connection_params(
    endpoint: &HostEndpoint,
    config: &Config,
    local_host: &str,
    socket: bool,
) -> ConnectionParams {
    match endpoint {
        HostEndpoint::Tcp { port, .. } => ConnectionParams::socket(*port),
        HostEndpoint::Process { .. } if socket => ConnectionParams::socket(config.daemon_port),
        HostEndpoint::Process {
            shell: Some(shell), ..
        } => ConnectionParams::remote_shell(shell.clone()),
        HostEndpoint::Process { host, shell: None } if host == local_host => {
            ConnectionParams::local(config.local_command())
        }
        HostEndpoint::Process { shell: None, .. } => {
            ConnectionParams::remote_shell(config.remote_shell())
        }
    }
}

/// Answer or loss forwarded from a worker thread.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Reading {
    Answer { id: i32, lines: Vec<String> },
    Lost { id: i32 },
}

struct ChannelClient {
    readings: Sender<Reading>,
}

impl ChannelClient {
    fn forward(&self, reading: Reading) {
        if self.readings.send(reading).is_err() {
            debug!(target: POLLER_TARGET, "poller gone, dropping reading");
        }
    }
}

impl SensorClient for ChannelClient {
    fn answer_received(&self, id: i32, lines: &[Vec<u8>]) {
        let text = lines
            .iter()
            .map(|line| String::from_utf8_lossy(line).into_owned())
            .collect();
        self.forward(Reading::Answer { id, lines: text });
    }

    fn sensor_lost(&self, id: i32) {
        self.forward(Reading::Lost { id });
    }
}

/// Engages the plan's host and polls it until the rounds are done.
///
/// # Errors
///
/// Fails when the host cannot be engaged, when it is lost for good, when the
/// final round stays unanswered past the grace period, or when output cannot
/// be written.
pub(crate) fn poll<W: Write, E: Write>(
    manager: &mut ConnectionManager,
    plan: &PollPlan,
    io: &mut IoStreams<'_, W, E>,
) -> Result<(), MonitorError> {
    let (sender, readings) = mpsc::channel();
    let client: Arc<dyn SensorClient> = Arc::new(ChannelClient { readings: sender });
    let handle = manager.engage(&plan.host, plan.params.clone())?;
    info!(
        target: POLLER_TARGET,
        host = %plan.host,
        engine = %handle.id(),
        sensors = plan.sensors.len(),
        "polling"
    );

    let mut session = Session {
        plan,
        client,
        readings,
        outstanding: BTreeSet::new(),
    };
    let result = session.run(manager, io);
    manager.disconnect_client(&session.client);
    result
}

struct Session<'p> {
    plan: &'p PollPlan,
    client: Arc<dyn SensorClient>,
    readings: Receiver<Reading>,
    outstanding: BTreeSet<i32>,
}

impl Session<'_> {
    fn run<W: Write, E: Write>(
        &mut self,
        manager: &mut ConnectionManager,
        io: &mut IoStreams<'_, W, E>,
    ) -> Result<(), MonitorError> {
        if self.plan.list_monitors {
            self.send(manager, MONITORS_ID)?;
        }
        for round in 1_u64.. {
            for id in (1..).take(self.plan.sensors.len()) {
                self.send(manager, id)?;
            }
            if self.plan.rounds != 0 && round >= self.plan.rounds {
                break;
            }
            self.pump(manager, io, Instant::now() + self.plan.interval, false)?;
        }
        self.pump(manager, io, Instant::now() + self.plan.grace, true)?;
        if self.outstanding.is_empty() {
            Ok(())
        } else {
            Err(MonitorError::Unanswered {
                host: self.plan.host.clone(),
                count: self.outstanding.len(),
            })
        }
    }

    fn send(&mut self, manager: &mut ConnectionManager, id: i32) -> Result<(), MonitorError> {
        let Some(command) = self.plan.command(id) else {
            return Ok(());
        };
        manager.send_request(&self.plan.host, command, &self.client, id)?;
        self.outstanding.insert(id);
        Ok(())
    }

    /// Prints readings and handles events until `deadline`, or until nothing
    /// is outstanding when `until_idle` is set.
    fn pump<W: Write, E: Write>(
        &mut self,
        manager: &mut ConnectionManager,
        io: &mut IoStreams<'_, W, E>,
        deadline: Instant,
        until_idle: bool,
    ) -> Result<(), MonitorError> {
        loop {
            self.print_readings(io)?;
            if until_idle && self.outstanding.is_empty() {
                return Ok(());
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(());
            }
            if let Some(event) = manager.wait_event(remaining.min(TICK)) {
                self.handle_event(manager, io, event)?;
            }
        }
    }

    fn print_readings<W: Write, E: Write>(
        &mut self,
        io: &mut IoStreams<'_, W, E>,
    ) -> Result<(), MonitorError> {
        for reading in self.readings.try_iter() {
            match reading {
                Reading::Answer { id, lines } => {
                    self.outstanding.remove(&id);
                    let label = self.plan.command(id).unwrap_or("?");
                    for line in &lines {
                        writeln!(io.stdout, "{label}: {line}")?;
                    }
                }
                Reading::Lost { id } => {
                    self.outstanding.remove(&id);
                    let label = self.plan.command(id).unwrap_or("?");
                    writeln!(io.stdout, "{label}: lost")?;
                }
            }
        }
        io.stdout.flush()?;
        Ok(())
    }

    fn handle_event<W: Write, E: Write>(
        &mut self,
        manager: &mut ConnectionManager,
        io: &mut IoStreams<'_, W, E>,
        event: ManagerEvent,
    ) -> Result<(), MonitorError> {
        match event {
            ManagerEvent::HostAdded { host, engine } => {
                debug!(target: POLLER_TARGET, host = %host, engine = %engine.id(), "host added");
            }
            ManagerEvent::HostConnectionLost { host, reason } => {
                if host != self.plan.host {
                    return Ok(());
                }
                if !manager.is_engaged(&host) {
                    return Err(MonitorError::ConnectionLost {
                        host,
                        reason: reason.unwrap_or_else(|| String::from("disengaged")),
                    });
                }
                // The engine was replaced; its queued requests went with it.
                info!(
                    target: POLLER_TARGET,
                    host = %host,
                    pending = self.outstanding.len(),
                    "engine replaced, resending pending requests"
                );
                let pending: Vec<i32> = self.outstanding.iter().copied().collect();
                for id in pending {
                    self.send(manager, id)?;
                }
            }
            ManagerEvent::Update { host } => {
                writeln!(io.stderr, "{host}: sensor set changed, resynchronizing")?;
                manager.resynchronize(&host)?;
            }
            ManagerEvent::Notification { host, message } => {
                writeln!(io.stderr, "{host}: {message}")?;
            }
        }
        Ok(())
    }
}
