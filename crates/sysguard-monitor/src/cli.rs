use clap::Parser;
use sysguard_config::HostEndpoint;

/// Polls sensors of one host through its `ksysguardd` daemon.
///
/// Configuration flags (`--log-filter`, `--remote-shell`, `--config-path`
/// and the other `SYSGUARD_*` settings) are accepted anywhere before `--`.
#[derive(Debug, Parser)]
#[command(name = "sysguard-monitor", version)]
pub(crate) struct Cli {
    /// Host to monitor: `localhost`, `host`, `host:port`, `tcp://host:port`
    /// or `shell://host`.
    pub(crate) host: HostEndpoint,
    /// Sensor names to poll, for example `cpu/system/load`.
    #[arg(required_unless_present = "monitors")]
    pub(crate) sensors: Vec<String>,
    /// Number of polling rounds; 0 polls until interrupted.
    #[arg(long, default_value_t = 1)]
    pub(crate) count: u64,
    /// Print the daemon's sensor list before polling.
    #[arg(long)]
    pub(crate) monitors: bool,
    /// Connect to the daemon's network port instead of starting it.
    #[arg(long)]
    pub(crate) socket: bool,
}
