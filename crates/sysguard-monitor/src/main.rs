//! Entrypoint for the `sysguard-monitor` binary.
//!
//! Everything happens in [`sysguard_monitor::run`]; the binary only hands it
//! the process arguments and the standard streams.

use std::io;
use std::process::ExitCode;

fn main() -> ExitCode {
    // Unlocked handles: worker threads log to stderr while the poller writes.
    let mut stdout = io::stdout();
    let mut stderr = io::stderr();
    sysguard_monitor::run(std::env::args_os(), &mut stdout, &mut stderr)
}
