use std::cell::Cell;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::models::{ContentMessage, DocHandle};
use crate::sync::{Channel, ChannelEvent, Connection, ConnectionId, EditorError, EditorModel, TransportEvent};

/// Connection state as seen by callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Whether a remote update is being written into the editor right now
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyState {
    Idle,
    ApplyingRemote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Connecting,
    Connected,
    /// Dropped by the transport, waiting out the reconnect delay
    Retrying,
}

struct ActiveConnection<K> {
    id: ConnectionId,
    conn: K,
    phase: Phase,
}

/// Result of feeding one event or message to the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// Belonged to a superseded connection or another topic
    Ignored,
    StateChanged(ConnectionState),
    /// Remote content was written into the editor
    Applied,
    /// Remote content equals the editor's content
    Unchanged,
    /// Payload unusable, dropped
    Discarded,
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("document is read-only for this user")]
    ReadOnly,

    #[error(transparent)]
    Editor(#[from] EditorError),
}

/// Holds `ApplyState::ApplyingRemote` for its lifetime; dropping it releases
/// the state even when the replacement panics.
struct ApplyGuard<'a>(&'a Cell<ApplyState>);

impl<'a> ApplyGuard<'a> {
    fn enter(state: &'a Cell<ApplyState>) -> Self {
        state.set(ApplyState::ApplyingRemote);
        Self(state)
    }
}

impl Drop for ApplyGuard<'_> {
    fn drop(&mut self) {
        self.0.set(ApplyState::Idle);
    }
}

/// Binds one editor to one document's channel topic.
///
/// Local edits are published whole; remote messages replace the editor's
/// content. Last received write wins. Replacements made on behalf of the
/// channel run under [`ApplyState::ApplyingRemote`] so the change hook they
/// trigger is mirrored to the view but never re-broadcast.
pub struct SyncController<E, C: Channel> {
    editor: E,
    channel: C,
    handle: Option<DocHandle>,
    link: Option<ActiveConnection<C::Connection>>,
    apply: Cell<ApplyState>,
    editable: bool,
    view: watch::Sender<String>,
}

impl<E: EditorModel, C: Channel> SyncController<E, C> {
    pub fn new(editor: E, channel: C) -> Self {
        let (view, _) = watch::channel(editor.html().to_string());
        Self {
            editor,
            channel,
            handle: None,
            link: None,
            apply: Cell::new(ApplyState::Idle),
            editable: true,
            view,
        }
    }

    /// Mirror of the editor content for the view layer
    pub fn subscribe_view(&self) -> watch::Receiver<String> {
        self.view.subscribe()
    }

    pub fn html(&self) -> &str {
        self.editor.html()
    }

    pub fn handle(&self) -> Option<&DocHandle> {
        self.handle.as_ref()
    }

    pub fn editor(&self) -> &E {
        &self.editor
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn is_applying_remote(&self) -> bool {
        self.apply.get() == ApplyState::ApplyingRemote
    }

    pub fn set_editable(&mut self, editable: bool) {
        self.editable = editable;
    }

    pub fn is_editable(&self) -> bool {
        self.editable
    }

    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.link.as_ref().map(|l| l.id)
    }

    pub fn state(&self) -> ConnectionState {
        match self.link.as_ref().map(|l| l.phase) {
            None | Some(Phase::Retrying) => ConnectionState::Disconnected,
            Some(Phase::Connecting) => ConnectionState::Connecting,
            Some(Phase::Connected) => ConnectionState::Connected,
        }
    }

    /// Bind to `handle` and seed the editor without broadcasting the seed.
    /// Switching to another handle tears the previous connection down first.
    pub fn initialize(&mut self, handle: DocHandle, initial: &str) -> Result<(), EditorError> {
        if self.handle.as_ref() != Some(&handle) {
            self.teardown();
        }
        info!("Initializing document {}", handle);
        self.handle = Some(handle);
        self.replace_remote(initial)
    }

    /// Change hook of the editor: mirror to the view, then publish unless
    /// the change came from applying a remote update.
    pub fn on_local_change(&self, html: String) -> bool {
        self.view.send_replace(html.clone());
        if self.is_applying_remote() {
            return false;
        }
        self.publish(html)
    }

    /// A user edit: replace the editor content and let the hook publish it.
    /// Returns whether the edit was broadcast.
    pub fn edit(&mut self, html: &str) -> Result<bool, SyncError> {
        if !self.editable {
            return Err(SyncError::ReadOnly);
        }
        match self.editor.set_content(html)? {
            Some(changed) => Ok(self.on_local_change(changed)),
            None => Ok(false),
        }
    }

    /// Broadcast the editor's current content, used by explicit saves.
    pub fn publish_current(&self) -> bool {
        if self.is_applying_remote() {
            return false;
        }
        self.publish(self.editor.html().to_string())
    }

    /// Apply a payload received on the subscribed topic.
    pub fn on_remote_message(&mut self, payload: &str) -> EventOutcome {
        let incoming = match ContentMessage::parse(payload) {
            Ok(Some(content)) => content,
            Ok(None) => {
                debug!("Discarding remote message without content");
                return EventOutcome::Discarded;
            }
            Err(e) => {
                warn!("Discarding malformed remote message: {}", e);
                return EventOutcome::Discarded;
            }
        };
        self.apply_incoming(&incoming)
    }

    /// Apply content fetched after a (re)connect. Ignored if the connection
    /// that triggered the fetch has since been replaced.
    pub fn apply_reseed(&mut self, id: ConnectionId, content: &str) -> EventOutcome {
        if self.connection_id() != Some(id) {
            debug!("Ignoring reseed for superseded connection {}", id);
            return EventOutcome::Ignored;
        }
        self.apply_incoming(content)
    }

    /// Open a fresh connection for `handle`, tearing down any previous one first.
    pub fn connect(&mut self, handle: DocHandle) -> ConnectionId {
        self.teardown();
        let id = ConnectionId::new();
        info!("Connecting to {} (connection {})", handle.topic(), id);
        let conn = self.channel.open(id, &handle);
        self.handle = Some(handle);
        self.link = Some(ActiveConnection { id, conn, phase: Phase::Connecting });
        id
    }

    /// Deactivate the current connection without waiting for it.
    pub fn teardown(&mut self) {
        if let Some(active) = self.link.take() {
            info!("Tearing down connection {}", active.id);
            active.conn.deactivate();
        }
    }

    pub fn handle_event(&mut self, event: ChannelEvent) -> EventOutcome {
        let Some(active) = self.link.as_mut().filter(|l| l.id == event.connection) else {
            debug!("Ignoring event of superseded connection {}", event.connection);
            return EventOutcome::Ignored;
        };

        match event.event {
            TransportEvent::Connecting => {
                active.phase = Phase::Connecting;
                EventOutcome::StateChanged(ConnectionState::Connecting)
            }
            TransportEvent::Connected => {
                active.phase = Phase::Connected;
                info!("Connection {} established", active.id);
                EventOutcome::StateChanged(ConnectionState::Connected)
            }
            TransportEvent::Disconnected { reason } => {
                active.phase = Phase::Retrying;
                warn!("Connection {} dropped: {}", active.id, reason);
                EventOutcome::StateChanged(ConnectionState::Disconnected)
            }
            TransportEvent::Message { destination, body } => {
                let subscribed = self.handle.as_ref().map(|h| h.topic());
                if subscribed.as_deref() != Some(destination.as_str()) {
                    debug!("Ignoring message for {}", destination);
                    return EventOutcome::Ignored;
                }
                self.on_remote_message(&body)
            }
        }
    }

    fn apply_incoming(&mut self, incoming: &str) -> EventOutcome {
        if incoming == self.editor.html() {
            return EventOutcome::Unchanged;
        }
        match self.replace_remote(incoming) {
            Ok(()) => {
                debug!("Applied remote update ({} bytes)", incoming.len());
                EventOutcome::Applied
            }
            Err(e) => {
                warn!("Failed to apply remote update: {}", e);
                EventOutcome::Discarded
            }
        }
    }

    fn replace_remote(&mut self, html: &str) -> Result<(), EditorError> {
        let _guard = ApplyGuard::enter(&self.apply);
        if let Some(changed) = self.editor.set_content(html)? {
            self.on_local_change(changed);
        }
        Ok(())
    }

    fn publish(&self, html: String) -> bool {
        let (Some(active), Some(handle)) = (self.link.as_ref(), self.handle.as_ref()) else {
            debug!("No connection, edit not broadcast");
            return false;
        };
        if active.phase != Phase::Connected {
            debug!("Connection {} not established, edit not broadcast", active.id);
            return false;
        }
        active
            .conn
            .publish(&handle.destination(), ContentMessage::new(html).to_json());
        true
    }
}
