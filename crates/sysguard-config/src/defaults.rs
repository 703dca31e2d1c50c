//! Default values applied when neither flags, environment nor files set them.

use crate::logging::LogFormat;

/// Log filter used when nothing else is configured.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Command line used to start the daemon on the local machine.
pub const DEFAULT_LOCAL_COMMAND: &str = "ksysguardd";

/// Remote execution shell used to reach the daemon on other machines.
pub const DEFAULT_REMOTE_SHELL: &str = "ssh";

/// Port the daemon listens on when started in network mode.
pub const DEFAULT_DAEMON_PORT: u16 = 3112;

/// Upper bound for establishing a TCP connection, in milliseconds.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5_000;

/// Delay between two sensor polling rounds, in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;

/// Default log filter expression.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter, for places that need an allocation (serde, derives).
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default log output format.
#[must_use]
pub const fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Owned default local daemon command.
#[must_use]
pub fn default_local_command() -> String {
    DEFAULT_LOCAL_COMMAND.to_owned()
}

/// Owned default remote shell.
#[must_use]
pub fn default_remote_shell() -> String {
    DEFAULT_REMOTE_SHELL.to_owned()
}
