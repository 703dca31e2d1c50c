//! Termination of daemon child processes.

use std::process::Child;
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use super::TRANSPORT_TARGET;

const GRACE_PERIOD: Duration = Duration::from_millis(200);

/// Reaps `child`, giving it a short grace period before killing it.
///
/// The caller is expected to have closed the daemon's stdin already, which
/// asks a well-behaved daemon to exit on its own.
pub(super) fn terminate_child(child: &mut Child, host: &str) {
    match child.try_wait() {
        Ok(Some(status)) => {
            debug!(target: TRANSPORT_TARGET, host, ?status, "daemon exited");
        }
        Ok(None) => {
            debug!(
                target: TRANSPORT_TARGET,
                host,
                pid = child.id(),
                "daemon still running, waiting before killing"
            );
            reap_after_grace(child, host);
        }
        Err(error) => {
            warn!(
                target: TRANSPORT_TARGET,
                host,
                %error,
                "failed to check daemon status, waiting before killing"
            );
            reap_after_grace(child, host);
        }
    }
}

fn reap_after_grace(child: &mut Child, host: &str) {
    thread::sleep(GRACE_PERIOD);
    match child.try_wait() {
        Ok(Some(status)) => {
            debug!(
                target: TRANSPORT_TARGET,
                host,
                ?status,
                "daemon exited during grace period"
            );
        }
        Ok(None) | Err(_) => kill_and_wait(child, host),
    }
}

fn kill_and_wait(child: &mut Child, host: &str) {
    if let Err(error) = child.kill() {
        warn!(target: TRANSPORT_TARGET, host, %error, "failed to kill daemon");
    }
    match child.wait() {
        Ok(status) => debug!(target: TRANSPORT_TARGET, host, ?status, "daemon killed"),
        Err(error) => warn!(target: TRANSPORT_TARGET, host, %error, "failed to reap daemon"),
    }
}
