use std::fmt;
use uuid::Uuid;

use crate::models::DocHandle;

/// Identity of one connection. Events carry it so that a superseded
/// connection's late events can be told apart from the current one's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a transport reports about one connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A connect attempt is starting (first try or retry)
    Connecting,
    /// The broker acknowledged the connection and the topic is subscribed
    Connected,
    /// A message arrived on the document topic
    Message { destination: String, body: String },
    /// The transport dropped; a retry follows after the fixed delay
    Disconnected { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelEvent {
    pub connection: ConnectionId,
    pub event: TransportEvent,
}

/// Publish/subscribe transport that opens connections scoped to one document.
pub trait Channel {
    type Connection: Connection;

    /// Start connecting for `handle`. Must not block; progress is reported
    /// as [`ChannelEvent`]s tagged with `id`.
    fn open(&mut self, id: ConnectionId, handle: &DocHandle) -> Self::Connection;
}

pub trait Connection {
    /// Queue a message for `destination`. Dropped silently when not connected.
    fn publish(&self, destination: &str, body: String);

    /// Fire-and-forget shutdown. Never waits for the transport.
    fn deactivate(self);
}
