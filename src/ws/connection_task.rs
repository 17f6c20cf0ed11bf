use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, info, warn};

use crate::models::{BrokerErrorMessage, DocHandle};
use crate::stomp::{Command, Frame, FrameError};
use crate::sync::{ChannelEvent, ConnectionId, TransportEvent};
use crate::ws::stomp_channel::{ChannelConfig, Outbound};

const TOPIC_SUBSCRIPTION: &str = "sub-0";
const ERRORS_SUBSCRIPTION: &str = "sub-1";
const ERROR_QUEUE: &str = "/user/queue/errors";

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("websocket error: {0}")]
    Socket(#[from] tungstenite::Error),

    #[error("bad frame: {0}")]
    Frame(#[from] FrameError),

    #[error("broker refused connection: {0}")]
    Refused(String),
}

enum Exit {
    Shutdown,
    Dropped(String),
}

/// Connection loop: connect, subscribe, pump, and on any drop wait the fixed
/// delay and start over. Ends only on shutdown or when its owner is gone.
pub(crate) async fn run(
    id: ConnectionId,
    handle: DocHandle,
    config: Arc<ChannelConfig>,
    events: mpsc::UnboundedSender<ChannelEvent>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
) {
    let emit = |event: TransportEvent| {
        let _ = events.send(ChannelEvent { connection: id, event });
    };

    loop {
        if events.is_closed() {
            debug!("Connection {}: nobody listening, stopping", id);
            return;
        }

        emit(TransportEvent::Connecting);
        match session(&handle, &config, &emit, &mut outbound).await {
            Ok(Exit::Shutdown) => {
                info!("Connection {} deactivated", id);
                return;
            }
            Ok(Exit::Dropped(reason)) => emit(TransportEvent::Disconnected { reason }),
            Err(e) => emit(TransportEvent::Disconnected { reason: e.to_string() }),
        }

        info!("Connection {}: reconnecting in {:?}", id, config.reconnect_delay);
        tokio::select! {
            _ = tokio::time::sleep(config.reconnect_delay) => {}
            _ = until_shutdown(&mut outbound) => {
                info!("Connection {} deactivated while waiting to reconnect", id);
                return;
            }
        }
    }
}

async fn session(
    handle: &DocHandle,
    config: &ChannelConfig,
    emit: &impl Fn(TransportEvent),
    outbound: &mut mpsc::UnboundedReceiver<Outbound>,
) -> Result<Exit, TransportError> {
    debug!("Opening {}", config.url);
    let socket = tokio::select! {
        res = connect_async(config.url.as_str()) => res?.0,
        _ = until_shutdown(outbound) => return Ok(Exit::Shutdown),
    };
    let (mut sink, mut stream) = socket.split();

    let connect = Frame::connect(
        &host_of(&config.url),
        config.token.as_deref(),
        config.heartbeat_outgoing,
        config.heartbeat_incoming,
    );
    sink.send(Message::text(connect.encode())).await?;

    // Wait for CONNECTED
    let connected = 'handshake: loop {
        let msg = tokio::select! {
            msg = stream.next() => msg,
            _ = until_shutdown(outbound) => return Ok(Exit::Shutdown),
        };
        let Some(msg) = msg else {
            return Ok(Exit::Dropped("closed during handshake".to_string()));
        };
        match msg? {
            Message::Text(text) => {
                for frame in Frame::decode_all(text.as_str())? {
                    match frame.command {
                        Command::Connected => break 'handshake frame,
                        Command::Error => return Err(TransportError::Refused(describe_error(&frame))),
                        other => debug!("Ignoring {} before CONNECTED", other),
                    }
                }
            }
            Message::Close(_) => return Ok(Exit::Dropped("closed during handshake".to_string())),
            _ => {}
        }
    };

    let topic = handle.topic();
    sink.send(Message::text(Frame::subscribe(TOPIC_SUBSCRIPTION, &topic).encode())).await?;
    sink.send(Message::text(Frame::subscribe(ERRORS_SUBSCRIPTION, ERROR_QUEUE).encode())).await?;
    info!("Subscribed to {}", topic);
    emit(TransportEvent::Connected);

    let mut heartbeat = heartbeat_interval(config);
    let deadline = read_deadline(config.heartbeat_incoming, connected.get("heart-beat"));
    let mut last_read = Instant::now();
    loop {
        tokio::select! {
            msg = stream.next() => {
                last_read = Instant::now();
                let Some(msg) = msg else {
                    return Ok(Exit::Dropped("connection closed".to_string()));
                };
                match msg? {
                    Message::Text(text) => {
                        if let Some(exit) = dispatch(text.as_str(), &topic, emit) {
                            return Ok(exit);
                        }
                    }
                    Message::Close(frame) => {
                        return Ok(Exit::Dropped(format!("closed by broker: {:?}", frame)));
                    }
                    _ => {}
                }
            }
            cmd = outbound.recv() => match cmd {
                Some(Outbound::Publish { destination, body }) => {
                    debug!("Publishing {} bytes to {}", body.len(), destination);
                    sink.send(Message::text(Frame::send(&destination, body).encode())).await?;
                }
                Some(Outbound::Shutdown) | None => {
                    let _ = sink.send(Message::text(Frame::disconnect().encode())).await;
                    let _ = sink.close().await;
                    return Ok(Exit::Shutdown);
                }
            },
            _ = tick(&mut heartbeat) => {
                sink.send(Message::text("\n".to_string())).await?;
            }
            _ = silence(deadline, last_read) => {
                return Ok(Exit::Dropped("no heart-beat from broker".to_string()));
            }
        }
    }
}

/// Route the frames of one socket message. Returns an exit when the broker
/// reported an error, which ends the session.
fn dispatch(text: &str, topic: &str, emit: &impl Fn(TransportEvent)) -> Option<Exit> {
    let frames = match Frame::decode_all(text) {
        Ok(frames) => frames,
        Err(e) => {
            warn!("Skipping undecodable socket message: {}", e);
            return None;
        }
    };
    for frame in frames {
        match frame.command {
            Command::Message => match frame.get("subscription") {
                Some(ERRORS_SUBSCRIPTION) => log_broker_error(&frame.body),
                _ => emit(TransportEvent::Message {
                    destination: frame.get("destination").unwrap_or(topic).to_string(),
                    body: frame.body,
                }),
            },
            Command::Error => return Some(Exit::Dropped(format!("broker error: {}", describe_error(&frame)))),
            other => debug!("Ignoring {} frame", other),
        }
    }
    None
}

fn log_broker_error(body: &str) {
    match serde_json::from_str::<BrokerErrorMessage>(body) {
        Ok(err) => warn!(
            "Broker error: {}",
            err.message.or(err.details).unwrap_or_else(|| body.to_string())
        ),
        Err(_) => warn!("Broker error: {}", body),
    }
}

fn describe_error(frame: &Frame) -> String {
    match frame.get("message") {
        Some(message) if frame.body.is_empty() => message.to_string(),
        Some(message) => format!("{} ({})", message, frame.body.trim()),
        None => frame.body.trim().to_string(),
    }
}

/// Resolves once the owner asked for shutdown or went away. Publishes queued
/// while not connected are dropped.
async fn until_shutdown(outbound: &mut mpsc::UnboundedReceiver<Outbound>) {
    loop {
        match outbound.recv().await {
            None | Some(Outbound::Shutdown) => return,
            Some(Outbound::Publish { destination, .. }) => {
                debug!("Not connected, dropping publish to {}", destination);
            }
        }
    }
}

fn heartbeat_interval(config: &ChannelConfig) -> Option<Interval> {
    if config.heartbeat_outgoing.is_zero() {
        return None;
    }
    let period = config.heartbeat_outgoing;
    Some(tokio::time::interval_at(Instant::now() + period, period))
}

async fn tick(heartbeat: &mut Option<Interval>) {
    match heartbeat {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// How long the broker may stay silent before the connection counts as dead.
///
/// Heart-beats flow only when both sides ask for them: we requested `requested`,
/// the broker's CONNECTED `heart-beat: sx,sy` promises one every `sx` ms.
/// The agreed interval is the larger of the two; twice that is tolerated.
fn read_deadline(requested: Duration, connected: Option<&str>) -> Option<Duration> {
    let promised = connected
        .and_then(|value| value.split_once(','))
        .and_then(|(sx, _)| sx.trim().parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or_default();
    if requested.is_zero() || promised.is_zero() {
        return None;
    }
    Some(requested.max(promised) * 2)
}

async fn silence(deadline: Option<Duration>, last_read: Instant) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(last_read + deadline).await,
        None => std::future::pending::<()>().await,
    }
}

fn host_of(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| "localhost".to_string())
}
