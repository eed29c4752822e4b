//! Sync session for Plume.
//!
//! The session merges four independent event streams into one consistent
//! view of the document and of remote cursors:
//!
//! | Event                     | Result                                              |
//! |---------------------------|-----------------------------------------------------|
//! | local edit (user)         | captured into the replica, submitted to the service |
//! | remote operation          | rebased, applied and rendered; echoes are not       |
//! | local selection           | broadcast as a cursor message while the link is open|
//! | remote cursor message     | remove then upsert in the registry, redraw          |
//!
//! Like the other machines in this crate it performs no I/O. Each call to
//! [`Session::on_event`] runs to completion and returns the [`Action`]s the
//! client must carry out. Feeding every event through one `Session` from one
//! task is what serializes all mutation of the replica and the registry.

use std::time::{Duration, Instant};

use plume_types::{CursorPayload, Delta, LeavePayload, ParticipantId, PresenceMessage, Rgb};
use thiserror::Error;

use crate::connection::{ConnectionAction, ConnectionEvent, ConnectionNotice, ConnectionState};
use crate::operation::{ChangeSource, LocalOperation, OpOrigin, RemoteOperation};
use crate::outbox::{Offer, OutboundPolicy, Outbox};
use crate::registry::{CursorRegistry, CursorState};
use crate::replica::{DocumentReplica, EchoApplied, RemoteApplied, ReplicaError};

/// Default time after which a silent remote cursor is evicted.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(10);

/// Errors returned by [`Session::on_event`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Bootstrap has not completed yet.
    #[error("session is not live yet")]
    NotLive,

    /// An earlier operation corrupted the replica; restart the session.
    #[error("session halted after replica corruption")]
    Halted,

    /// The session was shut down.
    #[error("session closed")]
    Closed,

    /// The replica rejected an operation or the snapshot.
    #[error(transparent)]
    Replica(#[from] ReplicaError),
}

/// Where the session is in its life.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lifecycle {
    /// Waiting for the snapshot.
    Bootstrapping,
    /// Accepting and producing edit and cursor traffic.
    Live,
    /// Stopped after replica corruption.
    Halted {
        /// What went wrong.
        reason: String,
    },
    /// Shut down by its owner.
    Closed,
}

/// A selection in the local editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    /// Selection start.
    pub start: usize,
    /// Selection end (equal to start for a caret).
    pub end: usize,
}

impl Selection {
    /// A selection from `start` to `end`.
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// A caret at `at`.
    pub fn caret(at: usize) -> Self {
        Self { start: at, end: at }
    }
}

/// How the local cursor is presented to others.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalPresence {
    /// Whether the local cursor is broadcast at all.
    pub enabled: bool,
    /// Name shown next to our cursor.
    pub name: String,
    /// Our cursor colour.
    pub colour: Rgb,
}

impl Default for LocalPresence {
    fn default() -> Self {
        Self {
            enabled: true,
            name: String::new(),
            colour: Rgb::default(),
        }
    }
}

/// Tunables for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    /// Remote cursors silent for longer than this are evicted.
    pub stale_after: Duration,
    /// What happens to outbound presence while the transport is not open.
    pub outbound: OutboundPolicy,
    /// Local cursor presentation.
    pub presence: LocalPresence,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            stale_after: DEFAULT_STALE_AFTER,
            outbound: OutboundPolicy::default(),
            presence: LocalPresence::default(),
        }
    }
}

/// Inputs to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// The editor's content changed.
    LocalEdit {
        /// The change.
        delta: Delta,
        /// Whether the user or the session caused it.
        source: ChangeSource,
    },
    /// The document service delivered an operation.
    RemoteOperation(RemoteOperation),
    /// The document service refused our in-flight operation.
    SubmitRejected {
        /// Why the service refused it.
        error: String,
    },
    /// The local selection changed; `None` when the editor lost focus.
    LocalSelection(Option<Selection>),
    /// Presence bytes arrived from the transport.
    PresenceReceived {
        /// Raw message.
        data: Vec<u8>,
        /// Arrival time, recorded as the cursor's last update.
        received_at: Instant,
    },
    /// The transport's lifecycle changed.
    Connection(ConnectionEvent),
    /// Periodic housekeeping.
    Tick {
        /// Current time.
        now: Instant,
    },
    /// The owner is tearing the session down.
    Shutdown,
}

impl Event {
    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::LocalEdit { .. } => "local-edit",
            Event::RemoteOperation(_) => "remote-operation",
            Event::SubmitRejected { .. } => "submit-rejected",
            Event::LocalSelection(_) => "local-selection",
            Event::PresenceReceived { .. } => "presence",
            Event::Connection(_) => "connection",
            Event::Tick { .. } => "tick",
            Event::Shutdown => "shutdown",
        }
    }
}

/// Actions to be executed by the client.
///
/// These are instructions, not side effects.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Submit a local operation to the document service.
    SubmitOperation(LocalOperation),
    /// Apply a remote operation to the editor widget.
    RenderOperation(Delta),
    /// Write a presence message to the transport.
    SendPresence(PresenceMessage),
    /// Draw (or redraw) a remote cursor.
    SetCursor(CursorState),
    /// Clear a remote cursor's marker.
    RemoveCursor(ParticipantId),
    /// Report something to the application.
    EmitEvent(SessionEvent),
}

/// Events reported to the application layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The snapshot was loaded; edits and cursors now flow.
    Live {
        /// Snapshot version.
        version: u64,
    },
    /// The service acknowledged one of our operations.
    EchoConfirmed {
        /// Version the operation was assigned.
        version: u64,
    },
    /// An operation already contained in the snapshot was skipped.
    StaleOperationSkipped {
        /// Version of the skipped operation.
        version: u64,
    },
    /// Outbound presence was discarded.
    PresenceDropped {
        /// Why it was discarded.
        reason: String,
    },
    /// Inbound presence could not be used.
    PresenceRejected {
        /// Why it was rejected.
        reason: String,
    },
    /// A participant announced it was leaving.
    ParticipantLeft {
        /// Who left.
        id: ParticipantId,
    },
    /// Silent cursors were evicted.
    CursorsEvicted {
        /// Evicted participants.
        ids: Vec<ParticipantId>,
    },
    /// The transport's lifecycle changed.
    Connection(ConnectionNotice),
    /// The session was shut down.
    Closed,
}

/// The synchronization core for one participant.
#[derive(Debug)]
pub struct Session {
    participant_id: ParticipantId,
    settings: SessionSettings,
    replica: DocumentReplica,
    registry: CursorRegistry,
    connection: ConnectionState,
    outbox: Outbox,
    lifecycle: Lifecycle,
}

impl Session {
    /// Create a session waiting for its snapshot.
    pub fn new(participant_id: ParticipantId, settings: SessionSettings) -> Self {
        let outbox = Outbox::new(settings.outbound);
        Self {
            participant_id,
            settings,
            replica: DocumentReplica::new(),
            registry: CursorRegistry::new(),
            connection: ConnectionState::new(),
            outbox,
            lifecycle: Lifecycle::Bootstrapping,
        }
    }

    /// Load the bootstrap snapshot and go live.
    pub fn bootstrap_from_snapshot(
        &mut self,
        content: Delta,
        version: u64,
    ) -> Result<Vec<Action>, SessionError> {
        if self.lifecycle == Lifecycle::Closed {
            return Err(SessionError::Closed);
        }
        self.replica.bootstrap_from_snapshot(content, version)?;
        self.lifecycle = Lifecycle::Live;
        Ok(vec![Action::EmitEvent(SessionEvent::Live { version })])
    }

    /// Process one event to completion.
    pub fn on_event(&mut self, event: Event) -> Result<Vec<Action>, SessionError> {
        match event {
            Event::Shutdown => Ok(self.shutdown()),
            Event::Connection(event) => {
                self.ensure_open()?;
                Ok(self.on_connection(event))
            }
            Event::Tick { now } => {
                self.ensure_open()?;
                Ok(self.on_tick(now))
            }
            Event::LocalEdit { delta, source } => {
                self.ensure_live()?;
                self.on_local_edit(delta, source)
            }
            Event::RemoteOperation(op) => {
                self.ensure_live()?;
                self.on_remote_operation(op)
            }
            Event::SubmitRejected { error } => {
                self.ensure_live()?;
                // The replica holds an edit the service will never have
                let reason = format!("submission rejected: {error}");
                self.guard(Err(ReplicaError::Corruption(reason)))
            }
            Event::LocalSelection(selection) => {
                self.ensure_live()?;
                Ok(self.on_local_selection(selection))
            }
            Event::PresenceReceived { data, received_at } => {
                self.ensure_live()?;
                Ok(self.on_presence(&data, received_at))
            }
        }
    }

    fn on_local_edit(
        &mut self,
        delta: Delta,
        source: ChangeSource,
    ) -> Result<Vec<Action>, SessionError> {
        match source {
            // Our own RenderOperation coming back from the widget
            ChangeSource::Api => Ok(vec![]),
            ChangeSource::User => {
                let result = self.replica.capture_local_operation(delta);
                let submit = self.guard(result)?;
                Ok(submit.map(Action::SubmitOperation).into_iter().collect())
            }
        }
    }

    fn on_remote_operation(&mut self, op: RemoteOperation) -> Result<Vec<Action>, SessionError> {
        let RemoteOperation {
            delta,
            origin,
            version,
        } = op;

        match origin {
            // The widget already shows our own edit; only the version moves
            OpOrigin::LocalEcho => {
                let result = self.replica.confirm_local_echo(version);
                Ok(match self.guard(result)? {
                    EchoApplied::Confirmed(next) => {
                        let mut actions =
                            vec![Action::EmitEvent(SessionEvent::EchoConfirmed { version })];
                        actions.extend(next.map(Action::SubmitOperation));
                        actions
                    }
                    EchoApplied::Stale => stale(version),
                })
            }
            OpOrigin::Remote => {
                let result = self.replica.apply_remote_operation(&delta, version);
                Ok(match self.guard(result)? {
                    RemoteApplied::Applied(rebased) => vec![Action::RenderOperation(rebased)],
                    RemoteApplied::Stale => stale(version),
                })
            }
        }
    }

    fn on_local_selection(&mut self, selection: Option<Selection>) -> Vec<Action> {
        let Some(selection) = selection else {
            return vec![];
        };
        if !self.settings.presence.enabled {
            return vec![];
        }

        let msg = PresenceMessage::Cursor(CursorPayload {
            id: self.participant_id.clone(),
            start: selection.start,
            end: selection.end,
            name: self.settings.presence.name.clone(),
            colour: self.settings.presence.colour,
        });

        if self.connection.accepts_outbound() {
            return vec![Action::SendPresence(msg)];
        }
        match self.outbox.offer(msg) {
            Offer::Queued => vec![],
            Offer::Displaced(_) => dropped("outbox full, oldest cursor update discarded"),
            Offer::Dropped(_) => dropped("transport not open"),
        }
    }

    fn on_presence(&mut self, data: &[u8], received_at: Instant) -> Vec<Action> {
        if !self.connection.accepts_inbound() {
            return rejected("transport disconnected".into());
        }
        let msg = match PresenceMessage::from_bytes(data) {
            Ok(msg) => msg,
            Err(e) => return rejected(e.to_string()),
        };
        // Our own broadcast reflected back by the transport
        if msg.participant() == &self.participant_id {
            return vec![];
        }

        match msg {
            PresenceMessage::Cursor(cursor) => {
                let (range_start, range_end) = cursor.ordered_range();
                let state = CursorState {
                    participant_id: cursor.id.clone(),
                    range_start,
                    range_end,
                    display_name: cursor.name,
                    colour: cursor.colour,
                    last_updated: received_at,
                };
                // Remove first so a moved cursor never leaves its old marker behind
                self.registry.remove(&cursor.id);
                self.registry.upsert(cursor.id.clone(), state.clone());
                vec![Action::RemoveCursor(cursor.id), Action::SetCursor(state)]
            }
            PresenceMessage::Leave(LeavePayload { id }) => {
                if self.registry.remove(&id).is_none() {
                    return vec![];
                }
                vec![
                    Action::RemoveCursor(id.clone()),
                    Action::EmitEvent(SessionEvent::ParticipantLeft { id }),
                ]
            }
        }
    }

    fn on_connection(&mut self, event: ConnectionEvent) -> Vec<Action> {
        let (next, transitions) = std::mem::take(&mut self.connection).on_event(event);
        self.connection = next;

        let mut actions = Vec::new();
        for transition in transitions {
            match transition {
                ConnectionAction::FlushOutbox => actions.extend(
                    self.outbox
                        .drain()
                        .into_iter()
                        .map(Action::SendPresence),
                ),
                ConnectionAction::Emit(notice) => {
                    actions.push(Action::EmitEvent(SessionEvent::Connection(notice)))
                }
            }
        }
        actions
    }

    fn on_tick(&mut self, now: Instant) -> Vec<Action> {
        let ids = self.registry.evict_stale(now, self.settings.stale_after);
        if ids.is_empty() {
            return vec![];
        }
        let mut actions: Vec<Action> = ids.iter().cloned().map(Action::RemoveCursor).collect();
        actions.push(Action::EmitEvent(SessionEvent::CursorsEvicted { ids }));
        actions
    }

    fn shutdown(&mut self) -> Vec<Action> {
        if self.lifecycle == Lifecycle::Closed {
            return vec![];
        }
        let mut actions = Vec::new();
        if self.connection.accepts_outbound() && self.settings.presence.enabled {
            actions.push(Action::SendPresence(self.leave_message()));
        }
        self.lifecycle = Lifecycle::Closed;
        self.outbox.clear();
        actions.push(Action::EmitEvent(SessionEvent::Closed));
        actions
    }

    /// Turn a replica failure into a halt when it is corruption.
    fn guard<T>(&mut self, result: Result<T, ReplicaError>) -> Result<T, SessionError> {
        result.map_err(|err| {
            if let ReplicaError::Corruption(reason) = &err {
                self.lifecycle = Lifecycle::Halted {
                    reason: reason.clone(),
                };
            }
            SessionError::Replica(err)
        })
    }

    fn ensure_live(&self) -> Result<(), SessionError> {
        match self.lifecycle {
            Lifecycle::Live => Ok(()),
            Lifecycle::Bootstrapping => Err(SessionError::NotLive),
            Lifecycle::Halted { .. } => Err(SessionError::Halted),
            Lifecycle::Closed => Err(SessionError::Closed),
        }
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        match self.lifecycle {
            Lifecycle::Closed => Err(SessionError::Closed),
            _ => Ok(()),
        }
    }

    fn leave_message(&self) -> PresenceMessage {
        PresenceMessage::Leave(LeavePayload {
            id: self.participant_id.clone(),
        })
    }

    /// Change the name shown next to our cursor.
    pub fn set_display_name(&mut self, name: impl Into<String>) {
        self.settings.presence.name = name.into();
    }

    /// Change our cursor colour.
    pub fn set_colour(&mut self, colour: Rgb) {
        self.settings.presence.colour = colour;
    }

    /// Turn local cursor broadcast on or off.
    ///
    /// Turning it off while connected tells the others to drop our marker.
    pub fn set_cursor_enabled(&mut self, enabled: bool) -> Vec<Action> {
        let was_enabled = self.settings.presence.enabled;
        self.settings.presence.enabled = enabled;
        if was_enabled && !enabled && self.connection.accepts_outbound() {
            return vec![Action::SendPresence(self.leave_message())];
        }
        vec![]
    }

    /// This participant's id.
    pub fn participant_id(&self) -> &ParticipantId {
        &self.participant_id
    }

    /// The local replica.
    pub fn replica(&self) -> &DocumentReplica {
        &self.replica
    }

    /// Remote cursors currently tracked.
    pub fn registry(&self) -> &CursorRegistry {
        &self.registry
    }

    /// Transport state.
    pub fn connection(&self) -> &ConnectionState {
        &self.connection
    }

    /// Lifecycle state.
    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    /// Local presence settings.
    pub fn presence(&self) -> &LocalPresence {
        &self.settings.presence
    }

    /// Number of presence messages waiting for the transport.
    pub fn queued_presence(&self) -> usize {
        self.outbox.len()
    }

    /// Check if edits and cursors are flowing.
    pub fn is_live(&self) -> bool {
        self.lifecycle == Lifecycle::Live
    }
}

fn stale(version: u64) -> Vec<Action> {
    vec![Action::EmitEvent(SessionEvent::StaleOperationSkipped {
        version,
    })]
}

fn dropped(reason: &str) -> Vec<Action> {
    vec![Action::EmitEvent(SessionEvent::PresenceDropped {
        reason: reason.to_string(),
    })]
}

fn rejected(reason: String) -> Vec<Action> {
    vec![Action::EmitEvent(SessionEvent::PresenceRejected { reason })]
}
