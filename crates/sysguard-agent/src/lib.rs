//! Client side of the `ksysguardd` monitoring protocol.
//!
//! The crate multiplexes named sensor requests onto one serial command
//! channel per monitored host and correlates the daemon's line-oriented
//! answers back to the client that asked. Each host is served by a dedicated
//! worker thread that owns its [`Engine`] and transport; the
//! [`ConnectionManager`] owns those workers and turns their failures into
//! [`ManagerEvent`]s.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use sysguard_agent::{ConnectionManager, ManagerSettings, SensorClient};
//!
//! struct Printer;
//! impl SensorClient for Printer {
//!     fn answer_received(&self, id: i32, lines: &[Vec<u8>]) {
//!         tracing::info!(id, lines = lines.len(), "answer");
//!     }
//! }
//!
//! let mut manager = ConnectionManager::new(ManagerSettings::default());
//! let client: Arc<dyn SensorClient> = Arc::new(Printer);
//! manager.send_request("localhost", "cpu/system/load", &client, 1)?;
//! ```

mod engine;
mod errors;
mod events;
mod framer;
mod manager;
mod request;
mod transport;
mod worker;

pub use engine::Engine;
pub use errors::ManagerError;
pub use events::{EngineEvents, EngineId, HostEvent, HostEventKind, HostStatus};
pub use framer::{Frame, Framer};
pub use manager::{ConnectionManager, ConnectionParams, EngineHandle, ManagerEvent, ManagerSettings};
pub use request::{ClientKey, Request, RequestKey, SensorClient};
pub use transport::{
    CommandSink, ProcessCommand, ProcessTransport, RESTART_BUDGET, SocketTransport, Transport,
    TransportError, TransportKind,
};
pub use worker::HostInput;
