//! Shared configuration for the sysguard agent and monitor.
//!
//! [`Config`] is assembled by `ortho_config` from, in increasing order of
//! precedence, built-in defaults, a TOML file (`--config-path` or
//! `SYSGUARD_CONFIG_PATH`), `SYSGUARD_*` environment variables and command
//! line flags.

mod defaults;
mod endpoint;
mod logging;

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_DAEMON_PORT, DEFAULT_LOCAL_COMMAND, DEFAULT_LOG_FILTER,
    DEFAULT_POLL_INTERVAL_MS, DEFAULT_REMOTE_SHELL, default_local_command, default_log_filter,
    default_log_filter_string, default_log_format, default_remote_shell,
};
pub use endpoint::{HostEndpoint, HostEndpointParseError};
pub use logging::{LogFormat, LogFormatParseError};

/// Resolved configuration shared by every sysguard binary.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "SYSGUARD")]
pub struct Config {
    /// `tracing` filter directive, for example `info` or `sysguard_agent=debug`.
    #[ortho_config(default = default_log_filter_string())]
    pub log_filter: String,
    /// Encoding of emitted log lines.
    #[ortho_config(default = default_log_format())]
    pub log_format: LogFormat,
    /// Command line that starts the daemon on this machine.
    #[ortho_config(default = default_local_command())]
    pub local_command: String,
    /// Shell used to start the daemon on other machines.
    #[ortho_config(default = default_remote_shell())]
    pub remote_shell: String,
    /// Port assumed for network daemons when an endpoint omits one.
    #[ortho_config(default = DEFAULT_DAEMON_PORT)]
    pub daemon_port: u16,
    /// Time allowed to establish a TCP connection, in milliseconds.
    #[ortho_config(default = DEFAULT_CONNECT_TIMEOUT_MS)]
    pub connect_timeout_ms: u64,
    /// Delay between two polling rounds, in milliseconds.
    #[ortho_config(default = DEFAULT_POLL_INTERVAL_MS)]
    pub poll_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
            local_command: default_local_command(),
            remote_shell: default_remote_shell(),
            daemon_port: DEFAULT_DAEMON_PORT,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl Config {
    /// Log filter directive.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_str()
    }

    /// Log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Local daemon command line.
    #[must_use]
    pub fn local_command(&self) -> &str {
        self.local_command.as_str()
    }

    /// Remote execution shell.
    #[must_use]
    pub fn remote_shell(&self) -> &str {
        self.remote_shell.as_str()
    }

    /// Connect timeout as a [`Duration`].
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Polling interval as a [`Duration`].
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
