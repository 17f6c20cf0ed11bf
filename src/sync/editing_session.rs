use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::clients::ApiClient;
use crate::config::Config;
use crate::models::{ApiError, DocHandle, DocumentView};
use crate::sync::{ChannelEvent, ConnectionId, ConnectionState, EditorModel, EventOutcome, SyncController, SyncError};
use crate::ws::{ChannelConfig, StompChannel};

#[derive(Debug, thiserror::Error)]
pub enum EditingError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("no document open")]
    NoDocument,
}

/// Outcome of an explicit save. The live broadcast and the durable write
/// are independent; either can succeed without the other.
#[derive(Debug)]
pub struct SaveOutcome {
    pub published: bool,
    pub stored: Result<(), ApiError>,
}

/// One editor on one document: fetches the seed, drives the channel and
/// stores the content on request.
pub struct EditingSession<E: EditorModel> {
    api: Arc<ApiClient>,
    controller: SyncController<E, StompChannel>,
    events: mpsc::UnboundedReceiver<ChannelEvent>,
    reseed_on_connect: bool,
    document: Option<DocumentView>,
}

impl<E: EditorModel> EditingSession<E> {
    pub fn new(api: Arc<ApiClient>, editor: E, channel: ChannelConfig, reseed_on_connect: bool) -> Self {
        let (channel, events) = StompChannel::new(channel);
        Self {
            api,
            controller: SyncController::new(editor, channel),
            events,
            reseed_on_connect,
            document: None,
        }
    }

    pub fn from_config(config: &Config, api: Arc<ApiClient>, editor: E) -> Self {
        let channel = ChannelConfig::from_config(config, api.token().map(str::to_string));
        Self::new(api, editor, channel, config.reseed_on_connect)
    }

    /// Fetch the document, seed the editor and connect to its topic.
    /// A failed fetch returns the error and leaves the channel untouched.
    pub async fn open(&mut self, handle: DocHandle) -> Result<&DocumentView, EditingError> {
        let doc = match self.api.fetch_document(&handle).await {
            Ok(doc) => doc,
            Err(e) => {
                warn!("Cannot open {}: {} (redirect: {:?})", handle, e, e.redirect());
                return Err(e.into());
            }
        };

        self.controller.set_editable(doc.can_edit());
        self.controller
            .initialize(handle.clone(), &doc.content)
            .map_err(SyncError::from)?;
        self.controller.connect(handle);
        info!(
            "Opened '{}' ({:?}, {})",
            doc.display_title(),
            doc.access_level,
            if doc.can_edit() { "editable" } else { "read-only" }
        );
        Ok(self.document.insert(doc))
    }

    /// Wait for the next transport event and process it
    pub async fn step(&mut self) -> Option<EventOutcome> {
        let event = self.next_event().await?;
        Some(self.process(event).await)
    }

    /// Next transport event, unprocessed. Cancel-safe, for use in `select!`.
    pub async fn next_event(&mut self) -> Option<ChannelEvent> {
        self.events.recv().await
    }

    pub async fn process(&mut self, event: ChannelEvent) -> EventOutcome {
        let id = event.connection;
        let outcome = self.controller.handle_event(event);
        if outcome == EventOutcome::StateChanged(ConnectionState::Connected) && self.reseed_on_connect {
            self.reseed(id).await;
        }
        outcome
    }

    /// Process events until the channel reports connected
    pub async fn until_connected(&mut self) -> Option<()> {
        while self.controller.state() != ConnectionState::Connected {
            self.step().await?;
        }
        Some(())
    }

    pub fn edit(&mut self, html: &str) -> Result<bool, SyncError> {
        self.controller.edit(html)
    }

    pub async fn save(&mut self) -> Result<SaveOutcome, EditingError> {
        let handle = self.controller.handle().cloned().ok_or(EditingError::NoDocument)?;
        if !self.controller.is_editable() {
            return Err(SyncError::ReadOnly.into());
        }
        let published = self.controller.publish_current();
        let stored = self.api.save_document(&handle, self.controller.html()).await;
        if let Err(e) = &stored {
            warn!("Durable save of {} failed: {}", handle, e);
        }
        Ok(SaveOutcome { published, stored })
    }

    pub fn close(&mut self) {
        self.controller.teardown();
        self.document = None;
    }

    pub fn html(&self) -> &str {
        self.controller.html()
    }

    pub fn state(&self) -> ConnectionState {
        self.controller.state()
    }

    pub fn document(&self) -> Option<&DocumentView> {
        self.document.as_ref()
    }

    pub fn subscribe_view(&self) -> watch::Receiver<String> {
        self.controller.subscribe_view()
    }

    pub fn controller(&self) -> &SyncController<E, StompChannel> {
        &self.controller
    }

    async fn reseed(&mut self, id: ConnectionId) {
        let Some(handle) = self.controller.handle().cloned() else {
            return;
        };
        match self.api.fetch_document(&handle).await {
            Ok(doc) => {
                let outcome = self.controller.apply_reseed(id, &doc.content);
                debug!("Reseed of {} after connect: {:?}", handle, outcome);
                if outcome != EventOutcome::Ignored {
                    self.controller.set_editable(doc.can_edit());
                    self.document = Some(doc);
                }
            }
            Err(e) => warn!("Reseed of {} failed: {}", handle, e),
        }
    }
}
