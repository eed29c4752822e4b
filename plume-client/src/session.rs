//! SyncSession - the main interface for Plume.
//!
//! This module provides [`SyncSession`], which connects one editor widget
//! to a shared document and to the other participants' cursors.
//!
//! # Architecture
//!
//! SyncSession uses the pure [`Session`] from plume-core for all policy and
//! interprets the actions it produces against three collaborators:
//!
//! ```text
//!                 ┌── DocumentService (edits)
//! Editor ⇄ SyncSession
//!                 └── Transport (cursors)
//!                       ↓
//!              plume-core (pure state machines)
//! ```
//!
//! Events from all three are handled one at a time, each to completion,
//! so the replica and the cursor registry never see interleaved updates.
//!
//! # Example
//!
//! ```ignore
//! use plume_client::{MemoryDocumentHub, MockEditor, MockTransport, SessionConfig, SyncSession};
//!
//! let hub = MemoryDocumentHub::new();
//! let mut session = SyncSession::start(
//!     &SessionConfig::default(),
//!     hub.connect(),
//!     MockTransport::new(),
//!     MockEditor::new(),
//! )
//! .await?;
//!
//! session.run(shutdown_signal).await?;
//! let core = session.shutdown().await?;
//! ```

use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;

use plume_core::{
    Action, Bootstrap, BootstrapAction, BootstrapError, BootstrapEvent, ConnectionEvent,
    ConnectionNotice, ConnectionState, Event, Lifecycle, RemoteOperation, ReplicaError, Session,
    SessionError, SessionEvent,
};
use plume_types::{Delta, DocumentKey, ParticipantId, Rgb};
use thiserror::Error;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::{ConfigError, SessionConfig};
use crate::document::{DocumentError, DocumentService};
use crate::editor::{Editor, EditorEvent};
use crate::transport::{Transport, TransportError, TransportEvent};

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Configuration error.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Document service error.
    #[error("document service error: {0}")]
    Document(#[from] DocumentError),

    /// Transport error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Bootstrap could not produce a usable document.
    #[error("bootstrap failed: {0}")]
    Bootstrap(#[from] BootstrapError),

    /// The core session refused an event.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl ClientError {
    /// True if the replica was corrupted and the session has halted.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            ClientError::Session(SessionError::Replica(ReplicaError::Corruption(_)))
                | ClientError::Session(SessionError::Halted)
        )
    }
}

/// Event streams a running session listens to.
#[derive(Debug)]
pub struct Subscriptions {
    /// Editor text and selection changes.
    pub editor: UnboundedReceiver<EditorEvent>,
    /// Operations from the document service.
    pub operations: UnboundedReceiver<RemoteOperation>,
    /// Transport lifecycle and data; `None` if connecting failed or the
    /// stream ended.
    pub transport: Option<UnboundedReceiver<TransportEvent>>,
}

/// A live collaborative editing session.
pub struct SyncSession<D: DocumentService, T: Transport, E: Editor> {
    key: DocumentKey,
    sweep_interval: Duration,
    core: Session,
    docs: D,
    transport: T,
    editor: E,
    subscriptions: Option<Subscriptions>,
}

impl<D: DocumentService, T: Transport, E: Editor> SyncSession<D, T, E> {
    /// Subscribe, bootstrap, connect the transport and go live.
    pub async fn start(
        config: &SessionConfig,
        docs: D,
        transport: T,
        editor: E,
    ) -> Result<Self, ClientError> {
        Self::start_as(ParticipantId::generate(), config, docs, transport, editor).await
    }

    /// Like [`SyncSession::start`], with an externally issued participant id.
    pub async fn start_as(
        participant_id: ParticipantId,
        config: &SessionConfig,
        docs: D,
        transport: T,
        editor: E,
    ) -> Result<Self, ClientError> {
        config.validate()?;
        let key = config.document_key();
        tracing::info!("Starting session {} on {}", participant_id, key);

        // Subscribe before the first fetch; ops already in the snapshot are
        // recognised by version and skipped.
        let operations = docs.subscribe(&key).await?;
        let editor_events = editor.subscribe();

        let (content, version) = bootstrap(&docs, &key, &config.document.doc_type).await?;

        let mut session = Self {
            key,
            sweep_interval: config.sweep_interval(),
            core: Session::new(participant_id, config.session_settings()),
            docs,
            transport,
            editor,
            subscriptions: None,
        };

        session.editor.set_contents(&content);
        let actions = session.core.bootstrap_from_snapshot(content, version)?;
        let mut pending = VecDeque::new();
        session.perform(actions, &mut pending).await;

        pending.push_back(Event::Connection(ConnectionEvent::ConnectRequested));
        session.drive(pending).await?;

        let transport_events = session.connect_transport().await?;

        session.subscriptions = Some(Subscriptions {
            editor: editor_events,
            operations,
            transport: transport_events,
        });
        Ok(session)
    }

    /// Feed one event to the core and carry out the resulting actions.
    pub async fn handle(&mut self, event: Event) -> Result<(), ClientError> {
        self.drive(VecDeque::from([event])).await
    }

    /// Handle every event already waiting, without blocking.
    ///
    /// Returns the number of events handled.
    pub async fn process_pending(&mut self) -> Result<usize, ClientError> {
        let mut subs = self
            .subscriptions
            .take()
            .ok_or_else(|| ClientError::Protocol("session is not subscribed".into()))?;

        let mut handled = 0;
        let result = loop {
            let Some(event) = next_ready(&mut subs) else {
                break Ok(handled);
            };
            handled += 1;
            if let Err(e) = self.handle(event).await {
                break Err(e);
            }
        };

        self.subscriptions = Some(subs);
        result
    }

    /// Connect the transport again if it has no event stream.
    ///
    /// A transport only reconnects by itself once it has connected; when
    /// `connect()` itself failed, or the stream ended, the session has to
    /// ask again. [`SyncSession::run`] calls this on every sweep tick.
    /// Returns true if a connection attempt was made.
    pub async fn retry_transport(&mut self) -> Result<bool, ClientError> {
        let mut subs = self
            .subscriptions
            .take()
            .ok_or_else(|| ClientError::Protocol("session is not subscribed".into()))?;
        let result = self.reconnect(&mut subs.transport).await;
        self.subscriptions = Some(subs);
        result
    }

    /// Handle events until `shutdown` resolves.
    ///
    /// Returns early with the error if the replica is corrupted.
    pub async fn run(&mut self, shutdown: impl Future<Output = ()>) -> Result<(), ClientError> {
        let mut subs = self
            .subscriptions
            .take()
            .ok_or_else(|| ClientError::Protocol("session is not subscribed".into()))?;
        tokio::pin!(shutdown);

        let mut sweep = tokio::time::interval(self.sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let result = loop {
            // Editor events first, so a render never lands on an edit the
            // replica has not captured
            let event = tokio::select! {
                biased;
                _ = &mut shutdown => break Ok(()),
                Some(event) = subs.editor.recv() => editor_event(event),
                Some(op) = subs.operations.recv() => Event::RemoteOperation(op),
                Some(event) = recv_transport(&mut subs.transport) => transport_event(event),
                now = sweep.tick() => Event::Tick { now: now.into_std() },
            };

            let tick = matches!(event, Event::Tick { .. });
            if let Err(e) = self.handle(event).await {
                break Err(e);
            }
            if tick {
                if let Err(e) = self.reconnect(&mut subs.transport).await {
                    break Err(e);
                }
            }
        };

        self.subscriptions = Some(subs);
        result
    }

    /// Stop the session and hand back the core for inspection.
    ///
    /// Announces our departure while the transport is still open, then
    /// unsubscribes from the document and closes the transport.
    pub async fn shutdown(mut self) -> Result<Session, ClientError> {
        self.handle(Event::Shutdown).await?;
        self.subscriptions = None;

        if let Err(e) = self.docs.unsubscribe(&self.key).await {
            tracing::warn!("Unsubscribe from {} failed: {}", self.key, e);
        }
        if let Err(e) = self.transport.close().await {
            tracing::warn!("Transport close failed: {}", e);
        }

        tracing::info!("Session {} shut down", self.core.participant_id());
        Ok(self.core)
    }

    /// Change the name shown next to our cursor.
    pub fn set_display_name(&mut self, name: impl Into<String>) {
        self.core.set_display_name(name);
    }

    /// Change our cursor colour.
    pub fn set_colour(&mut self, colour: Rgb) {
        self.core.set_colour(colour);
    }

    /// Turn local cursor broadcast on or off.
    pub async fn set_cursor_enabled(&mut self, enabled: bool) -> Result<(), ClientError> {
        let actions = self.core.set_cursor_enabled(enabled);
        let mut pending = VecDeque::new();
        self.perform(actions, &mut pending).await;
        self.drive(pending).await
    }

    /// The core session.
    pub fn core(&self) -> &Session {
        &self.core
    }

    /// Our participant id.
    pub fn participant_id(&self) -> &ParticipantId {
        self.core.participant_id()
    }

    /// The document being edited.
    pub fn document_key(&self) -> &DocumentKey {
        &self.key
    }

    /// Current replica content.
    pub fn content(&self) -> &Delta {
        self.core.replica().current_content()
    }

    /// Get a reference to the editor (for testing).
    pub fn editor(&self) -> &E {
        &self.editor
    }

    /// Get a reference to the underlying transport (for testing).
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Get a reference to the document service (for testing).
    pub fn docs(&self) -> &D {
        &self.docs
    }

    /// Call `connect()`; a failure is reported to the core, not returned.
    async fn connect_transport(
        &mut self,
    ) -> Result<Option<UnboundedReceiver<TransportEvent>>, ClientError> {
        match self.transport.connect().await {
            Ok(events) => Ok(Some(events)),
            Err(e) => {
                tracing::warn!("Presence transport failed to connect: {}", e);
                self.handle(Event::Connection(ConnectionEvent::Failed {
                    error: e.to_string(),
                }))
                .await?;
                Ok(None)
            }
        }
    }

    async fn reconnect(
        &mut self,
        events: &mut Option<UnboundedReceiver<TransportEvent>>,
    ) -> Result<bool, ClientError> {
        let stranded = events.is_none()
            && matches!(self.core.connection(), ConnectionState::Erred { .. })
            && self.core.lifecycle() != &Lifecycle::Closed;
        if !stranded {
            return Ok(false);
        }

        tracing::debug!("Retrying presence transport connect");
        self.handle(Event::Connection(ConnectionEvent::Reconnecting))
            .await?;
        *events = self.connect_transport().await?;
        Ok(true)
    }

    async fn drive(&mut self, mut pending: VecDeque<Event>) -> Result<(), ClientError> {
        while let Some(event) = pending.pop_front() {
            tracing::debug!("Dispatching {} event", event.kind());
            let actions = self.core.on_event(event).map_err(|e| {
                if let SessionError::Replica(ReplicaError::Corruption(reason)) = &e {
                    tracing::error!("Replica corrupted, halting session: {}", reason);
                }
                e
            })?;
            self.perform(actions, &mut pending).await;
        }
        Ok(())
    }

    /// Execute actions in order; failures that the core must hear about are
    /// queued as follow-up events.
    async fn perform(&mut self, actions: Vec<Action>, pending: &mut VecDeque<Event>) {
        for action in actions {
            match action {
                Action::SubmitOperation(op) => {
                    match self
                        .docs
                        .submit_op(&self.key, op.delta(), op.base_version())
                        .await
                    {
                        Ok(version) => tracing::debug!(
                            "Submitted operation against version {} as version {}",
                            op.base_version(),
                            version
                        ),
                        Err(e) => {
                            tracing::warn!("Submit failed: {}", e);
                            pending.push_back(Event::SubmitRejected {
                                error: e.to_string(),
                            });
                        }
                    }
                }
                Action::RenderOperation(delta) => self.editor.update_contents(&delta),
                Action::SendPresence(msg) => {
                    let bytes = match msg.to_bytes() {
                        Ok(bytes) => bytes,
                        Err(e) => {
                            tracing::warn!("Dropping unencodable presence: {}", e);
                            continue;
                        }
                    };
                    if let Err(e) = self.transport.send(&bytes).await {
                        tracing::warn!("Presence send failed: {}", e);
                        pending.push_back(Event::Connection(ConnectionEvent::Failed {
                            error: e.to_string(),
                        }));
                    }
                }
                Action::SetCursor(cursor) => self.editor.set_cursor(&cursor),
                Action::RemoveCursor(id) => self.editor.remove_cursor(&id),
                Action::EmitEvent(event) => report(&event),
            }
        }
    }
}

/// Run the bootstrap machine against the document service.
async fn bootstrap<D: DocumentService>(
    docs: &D,
    key: &DocumentKey,
    doc_type: &str,
) -> Result<(Delta, u64), ClientError> {
    let mut machine = Bootstrap::new(doc_type);
    let mut actions: VecDeque<BootstrapAction> = machine.start().into();

    while let Some(action) = actions.pop_front() {
        let event = match action {
            BootstrapAction::FetchSnapshot => BootstrapEvent::Fetched(docs.fetch(key).await?),
            BootstrapAction::CreateDocument { doc_type, initial } => {
                match docs.create(key, &doc_type, &initial).await {
                    Ok(()) => {
                        tracing::info!("Created {} as {}", key, doc_type);
                        BootstrapEvent::Created
                    }
                    Err(DocumentError::CreateConflict(_)) => {
                        tracing::debug!("{} was created concurrently, refetching", key);
                        BootstrapEvent::CreateConflict
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            BootstrapAction::LoadSnapshot { content, version } => {
                tracing::info!("Loaded {} at version {}", key, version);
                return Ok((content, version));
            }
        };
        actions.extend(machine.on_event(event)?);
    }

    Err(ClientError::Protocol("bootstrap ended without a snapshot".into()))
}

fn editor_event(event: EditorEvent) -> Event {
    match event {
        EditorEvent::TextChange { delta, source } => Event::LocalEdit { delta, source },
        EditorEvent::SelectionChange(selection) => Event::LocalSelection(selection),
    }
}

fn transport_event(event: TransportEvent) -> Event {
    match event {
        TransportEvent::Open => Event::Connection(ConnectionEvent::Opened),
        TransportEvent::Data(data) => Event::PresenceReceived {
            data,
            received_at: Instant::now().into_std(),
        },
        TransportEvent::Error(error) => Event::Connection(ConnectionEvent::Failed { error }),
        TransportEvent::Reconnecting => Event::Connection(ConnectionEvent::Reconnecting),
        TransportEvent::Closed => Event::Connection(ConnectionEvent::Closed),
    }
}

async fn recv_transport(
    events: &mut Option<UnboundedReceiver<TransportEvent>>,
) -> Option<TransportEvent> {
    let Some(receiver) = events.as_mut() else {
        return std::future::pending().await;
    };
    let event = receiver.recv().await;
    if event.is_none() {
        *events = None;
    }
    event
}

fn next_ready(subs: &mut Subscriptions) -> Option<Event> {
    if let Ok(event) = subs.editor.try_recv() {
        return Some(editor_event(event));
    }
    if let Ok(op) = subs.operations.try_recv() {
        return Some(Event::RemoteOperation(op));
    }
    if let Some(events) = subs.transport.as_mut() {
        match events.try_recv() {
            Ok(event) => return Some(transport_event(event)),
            Err(TryRecvError::Disconnected) => subs.transport = None,
            Err(TryRecvError::Empty) => {}
        }
    }
    None
}

fn report(event: &SessionEvent) {
    match event {
        SessionEvent::Live { version } => tracing::info!("Session live at version {}", version),
        SessionEvent::EchoConfirmed { version } => {
            tracing::debug!("Own operation confirmed as version {}", version)
        }
        SessionEvent::StaleOperationSkipped { version } => {
            tracing::debug!("Skipped operation {} already in snapshot", version)
        }
        SessionEvent::PresenceDropped { reason } => {
            tracing::warn!("Cursor update dropped: {}", reason)
        }
        SessionEvent::PresenceRejected { reason } => {
            tracing::warn!("Cursor message rejected: {}", reason)
        }
        SessionEvent::ParticipantLeft { id } => tracing::debug!("Participant {} left", id),
        SessionEvent::CursorsEvicted { ids } => {
            tracing::debug!("Evicted {} stale cursors", ids.len())
        }
        SessionEvent::Connection(ConnectionNotice::Opened) => {
            tracing::info!("Presence transport open")
        }
        SessionEvent::Connection(ConnectionNotice::Failed { error }) => {
            tracing::warn!("Presence transport error: {}", error)
        }
        SessionEvent::Connection(ConnectionNotice::Closed) => {
            tracing::info!("Presence transport closed")
        }
        SessionEvent::Closed => tracing::debug!("Core session closed"),
    }
}
