//! Shared fixtures and doubles for agent tests.

#[cfg(unix)]
mod daemon;
mod recording;
mod world;

use std::time::Duration;

use rstest::fixture;

#[cfg(unix)]
pub use daemon::{NetworkDaemon, ScriptedDaemon};
pub use recording::{Delivery, RecordingClient, RecordingSink};
pub use world::{BANNER, TestWorld};

/// Upper bound for anything that crosses a thread or a process boundary.
pub const PATIENCE: Duration = Duration::from_secs(10);

/// Engine whose daemon is ready for commands.
#[fixture]
pub fn ready_world() -> TestWorld {
    TestWorld::ready()
}
