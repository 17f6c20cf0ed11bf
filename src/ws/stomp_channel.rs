use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

use crate::config::Config;
use crate::models::DocHandle;
use crate::sync::{Channel, ChannelEvent, Connection, ConnectionId};
use crate::ws::connection_task;

/// Settings shared by every connection a channel opens
#[derive(Clone, Debug)]
pub struct ChannelConfig {
    pub url: String,
    pub token: Option<String>,
    pub reconnect_delay: Duration,
    pub heartbeat_outgoing: Duration,
    pub heartbeat_incoming: Duration,
}

impl ChannelConfig {
    pub fn from_config(config: &Config, token: Option<String>) -> Self {
        Self {
            url: config.websocket_url(),
            token,
            reconnect_delay: config.reconnect_delay(),
            heartbeat_outgoing: config.heartbeat_outgoing(),
            heartbeat_incoming: config.heartbeat_incoming(),
        }
    }
}

pub(crate) enum Outbound {
    Publish { destination: String, body: String },
    Shutdown,
}

/// STOMP-over-WebSocket channel. Each opened connection runs as its own
/// task and reports back through the receiver returned by [`StompChannel::new`].
pub struct StompChannel {
    config: Arc<ChannelConfig>,
    events: mpsc::UnboundedSender<ChannelEvent>,
}

impl StompChannel {
    pub fn new(config: ChannelConfig) -> (Self, mpsc::UnboundedReceiver<ChannelEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        (Self { config: Arc::new(config), events }, rx)
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }
}

impl Channel for StompChannel {
    type Connection = StompConnection;

    fn open(&mut self, id: ConnectionId, handle: &DocHandle) -> StompConnection {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        tokio::spawn(connection_task::run(
            id,
            handle.clone(),
            self.config.clone(),
            self.events.clone(),
            outbound_rx,
        ));
        StompConnection { id, outbound }
    }
}

/// Handle to one connection task. Dropping it also ends the task.
pub struct StompConnection {
    id: ConnectionId,
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl Connection for StompConnection {
    fn publish(&self, destination: &str, body: String) {
        let cmd = Outbound::Publish { destination: destination.to_string(), body };
        if self.outbound.send(cmd).is_err() {
            debug!("Connection {} already stopped, publish dropped", self.id);
        }
    }

    fn deactivate(self) {
        let _ = self.outbound.send(Outbound::Shutdown);
    }
}
