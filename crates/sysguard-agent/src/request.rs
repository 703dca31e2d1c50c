//! Sensor requests and the client capability answers are delivered to.

use std::fmt;
use std::sync::{Arc, Weak};

/// Receiver of answers for requests it issued.
///
/// Callbacks run on the worker thread of the host that produced the answer,
/// in the order the requests were dispatched to that host. Both default to
/// doing nothing.
pub trait SensorClient: Send + Sync {
    /// Delivers the lines of a completed answer for request `id`.
    fn answer_received(&self, _id: i32, _lines: &[Vec<u8>]) {}

    /// Reports that the daemon does not know the sensor requested as `id`.
    fn sensor_lost(&self, _id: i32) {}
}

/// Address identity of a client allocation.
///
/// Two handles to the same client share a key; keys of dropped clients may
/// be reused by later allocations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientKey(usize);

impl ClientKey {
    /// Key of requests issued without a client.
    pub const ANONYMOUS: Self = Self(0);

    /// Returns the key identifying `client`.
    #[must_use]
    pub fn of(client: &Arc<dyn SensorClient>) -> Self {
        Self(Arc::as_ptr(client).cast::<()>().addr())
    }

    fn of_weak(client: &Weak<dyn SensorClient>) -> Self {
        Self(Weak::as_ptr(client).cast::<()>().addr())
    }
}

/// Composite identity used to reject duplicate outstanding requests.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    text: String,
    client: ClientKey,
    id: i32,
}

impl RequestKey {
    /// Command text.
    #[must_use]
    pub fn text(&self) -> &str {
        self.text.as_str()
    }

    /// Issuing client.
    #[must_use]
    pub const fn client(&self) -> ClientKey {
        self.client
    }

    /// Caller-chosen id.
    #[must_use]
    pub const fn id(&self) -> i32 {
        self.id
    }
}

/// A command queued for a host, together with who asked for it.
pub struct Request {
    key: RequestKey,
    client: Option<Weak<dyn SensorClient>>,
    detached: bool,
}

impl Request {
    /// Builds a request whose answer goes to `client`.
    ///
    /// Only a weak reference is retained: dropping the last strong handle
    /// suppresses delivery without disturbing queue order.
    #[must_use]
    pub fn new(text: impl Into<String>, client: &Arc<dyn SensorClient>, id: i32) -> Self {
        let weak = Arc::downgrade(client);
        Self {
            key: RequestKey {
                text: text.into(),
                client: ClientKey::of_weak(&weak),
                id,
            },
            client: Some(weak),
            detached: false,
        }
    }

    /// Builds a request whose answer is consumed and discarded.
    #[must_use]
    pub fn anonymous(text: impl Into<String>, id: i32) -> Self {
        Self {
            key: RequestKey {
                text: text.into(),
                client: ClientKey::ANONYMOUS,
                id,
            },
            client: None,
            detached: false,
        }
    }

    /// Command text written to the daemon, without the trailing newline.
    #[must_use]
    pub fn text(&self) -> &str {
        self.key.text()
    }

    /// Caller-chosen id passed back with the answer.
    #[must_use]
    pub const fn id(&self) -> i32 {
        self.key.id
    }

    /// Dedup identity of the request.
    #[must_use]
    pub const fn key(&self) -> &RequestKey {
        &self.key
    }

    /// Key of the client that issued the request.
    #[must_use]
    pub const fn client_key(&self) -> ClientKey {
        self.key.client
    }

    /// Live client handle, when one is still attached and alive.
    #[must_use]
    pub fn client(&self) -> Option<Arc<dyn SensorClient>> {
        self.client.as_ref().and_then(Weak::upgrade)
    }

    /// Whether the client was explicitly disconnected.
    #[must_use]
    pub const fn is_detached(&self) -> bool {
        self.detached
    }

    /// Drops the client reference; the slot stays queued but delivers nothing.
    pub fn detach(&mut self) {
        self.client = None;
        self.detached = true;
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Request")
            .field("text", &self.key.text)
            .field("client", &self.key.client)
            .field("id", &self.key.id)
            .field("detached", &self.detached)
            .finish()
    }
}
