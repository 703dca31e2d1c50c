//! Recording doubles for the client and command sink seams.

use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use crate::request::SensorClient;
use crate::transport::{CommandSink, TransportError};

/// Callback observed by a [`RecordingClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// `answer_received` with the lines decoded as UTF-8.
    Answer {
        /// Request id.
        id: i32,
        /// Answer lines.
        lines: Vec<String>,
    },
    /// `sensor_lost`.
    Lost(i32),
}

impl Delivery {
    /// Shorthand for an answer built from string slices.
    pub fn answer(id: i32, lines: &[&str]) -> Self {
        Self::Answer {
            id,
            lines: lines.iter().map(|line| (*line).to_owned()).collect(),
        }
    }
}

/// Client recording every callback in arrival order.
#[derive(Debug, Default)]
pub struct RecordingClient {
    deliveries: Mutex<Vec<Delivery>>,
    arrived: Condvar,
}

impl RecordingClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Callbacks observed so far.
    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().expect("lock deliveries").clone()
    }

    /// Blocks until `count` callbacks arrived or `timeout` passed.
    pub fn wait_for(&self, count: usize, timeout: Duration) -> Vec<Delivery> {
        let guard = self.deliveries.lock().expect("lock deliveries");
        let (guard, _) = self
            .arrived
            .wait_timeout_while(guard, timeout, |deliveries| deliveries.len() < count)
            .expect("wait for deliveries");
        guard.clone()
    }

    fn record(&self, delivery: Delivery) {
        self.deliveries
            .lock()
            .expect("lock deliveries")
            .push(delivery);
        self.arrived.notify_all();
    }
}

impl SensorClient for RecordingClient {
    fn answer_received(&self, id: i32, lines: &[Vec<u8>]) {
        self.record(Delivery::Answer {
            id,
            lines: lines
                .iter()
                .map(|line| String::from_utf8_lossy(line).into_owned())
                .collect(),
        });
    }

    fn sensor_lost(&self, id: i32) {
        self.record(Delivery::Lost(id));
    }
}

/// Sink recording written commands, one entry per write.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    writes: Arc<Mutex<Vec<String>>>,
}

impl RecordingSink {
    /// Commands written so far, without their trailing newline.
    pub fn written(&self) -> Vec<String> {
        self.writes.lock().expect("lock writes").clone()
    }
}

impl CommandSink for RecordingSink {
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let text = String::from_utf8_lossy(bytes);
        self.writes
            .lock()
            .expect("lock writes")
            .push(text.trim_end_matches('\n').to_owned());
        Ok(())
    }
}
