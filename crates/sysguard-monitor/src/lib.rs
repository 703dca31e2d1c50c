//! Command-line sensor monitor built on [`sysguard_agent`].
//!
//! The runtime loads configuration, installs telemetry, engages one host
//! through a [`ConnectionManager`] and polls the requested sensors, printing
//! `sensor: value` lines on stdout. Daemon notifications go to stderr.
//! Configuration loading and IO streams can be substituted so tests drive
//! the whole runtime in-process.

use std::ffi::OsString;
use std::io::Write;
use std::process::ExitCode;

use clap::Parser;
use sysguard_agent::{ConnectionManager, ManagerSettings};
use tracing::warn;

mod cli;
mod config;
mod errors;
mod poller;
mod telemetry;

pub use config::{ConfigLoader, SystemConfigLoader};
pub use errors::MonitorError;
pub use telemetry::{TelemetryError, TelemetryHandle, initialise as initialise_telemetry};

use cli::Cli;
use config::split_arguments;
use poller::PollPlan;

/// Bundles the output streams handed to the runtime.
pub(crate) struct IoStreams<'a, W: Write, E: Write> {
    pub(crate) stdout: &'a mut W,
    pub(crate) stderr: &'a mut E,
}

impl<'a, W: Write, E: Write> IoStreams<'a, W, E> {
    pub(crate) const fn new(stdout: &'a mut W, stderr: &'a mut E) -> Self {
        Self { stdout, stderr }
    }
}

/// Runs the monitor with the given arguments and IO handles.
#[must_use]
pub fn run<I, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    let mut io = IoStreams::new(stdout, stderr);
    run_with_loader(args, &mut io, &SystemConfigLoader)
}

/// Runs the monitor with a custom configuration loader.
pub(crate) fn run_with_loader<I, W, E, L>(
    args: I,
    io: &mut IoStreams<'_, W, E>,
    loader: &L,
) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
    L: ConfigLoader,
{
    match execute(args, io, loader) {
        Ok(()) => ExitCode::SUCCESS,
        // Help and version output is not an error.
        Err(MonitorError::Usage(error)) if !error.use_stderr() => {
            report(io.stdout, &error);
            ExitCode::SUCCESS
        }
        Err(error) => {
            report(io.stderr, &error);
            ExitCode::FAILURE
        }
    }
}

fn execute<I, W, E, L>(
    args: I,
    io: &mut IoStreams<'_, W, E>,
    loader: &L,
) -> Result<(), MonitorError>
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
    L: ConfigLoader,
{
    let arguments: Vec<OsString> = args.into_iter().collect();
    let split = split_arguments(&arguments);
    let cli = Cli::try_parse_from(&split.command_arguments)?;
    let config = loader
        .load(&split.config_arguments)
        .map_err(|source| MonitorError::Configuration { source })?;
    telemetry::initialise(&config)?;

    let settings = ManagerSettings::from(&config);
    let plan = PollPlan::new(cli, &config, &settings.local_host);
    let mut manager = ConnectionManager::new(settings);
    poller::poll(&mut manager, &plan, io)
}

fn report(stream: &mut impl Write, error: &dyn std::fmt::Display) {
    if let Err(write_error) = writeln!(stream, "{error}") {
        warn!(
            target: "sysguard_monitor",
            error = %write_error,
            "failed to report error"
        );
    }
}
