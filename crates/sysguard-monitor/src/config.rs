//! Configuration loading for the monitor.
//!
//! Flags that belong to [`Config`] are split from the command line and handed
//! to `ortho_config`; everything else is parsed by the monitor's own `clap`
//! arguments.

use std::ffi::{OsStr, OsString};
use std::sync::Arc;

use ortho_config::{OrthoConfig, OrthoError};
use sysguard_config::Config;

/// Flags consumed by the configuration loader. Each takes one value, either
/// inline (`--flag=value`) or as the next argument.
///
/// Keep in sync with the fields of [`Config`].
const CONFIG_CLI_FLAGS: &[&str] = &[
    "--config-path",
    "--log-filter",
    "--log-format",
    "--local-command",
    "--remote-shell",
    "--daemon-port",
    "--connect-timeout-ms",
    "--poll-interval-ms",
];

/// Source of the monitor configuration.
pub trait ConfigLoader {
    /// Loads configuration from the configuration flags in `args`.
    ///
    /// `args` starts with the program name.
    ///
    /// # Errors
    ///
    /// Returns the loader's error when a layer fails to parse or merge.
    fn load(&self, args: &[OsString]) -> Result<Config, Arc<OrthoError>>;
}

/// Loader backed by files, environment and flags through `ortho_config`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self, args: &[OsString]) -> Result<Config, Arc<OrthoError>> {
        Config::load_from_iter(args.iter().cloned())
    }
}

/// Command line split between the configuration loader and `clap`.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct ArgumentSplit {
    pub(crate) config_arguments: Vec<OsString>,
    pub(crate) command_arguments: Vec<OsString>,
}

/// Routes configuration flags, with their values, to the loader.
///
/// Both halves keep the program name. Scanning stops at `--`, after which
/// everything belongs to the command.
pub(crate) fn split_arguments(args: &[OsString]) -> ArgumentSplit {
    let mut split = ArgumentSplit::default();
    let mut remaining = args.iter();
    if let Some(program) = remaining.next() {
        split.config_arguments.push(program.clone());
        split.command_arguments.push(program.clone());
    }

    while let Some(argument) = remaining.next() {
        if argument == "--" {
            split.command_arguments.push(argument.clone());
            split.command_arguments.extend(remaining.by_ref().cloned());
            break;
        }
        match config_flag(argument) {
            Some(needs_value) => {
                split.config_arguments.push(argument.clone());
                if needs_value && let Some(value) = remaining.next() {
                    split.config_arguments.push(value.clone());
                }
            }
            None => split.command_arguments.push(argument.clone()),
        }
    }
    split
}

/// Returns whether a recognised configuration flag still needs its value.
fn config_flag(argument: &OsStr) -> Option<bool> {
    let text = argument.to_string_lossy();
    let (flag, inline_value) = match text.split_once('=') {
        Some((name, _)) => (name, true),
        None => (&*text, false),
    };
    CONFIG_CLI_FLAGS
        .contains(&flag)
        .then_some(!inline_value)
}
