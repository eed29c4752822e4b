//! Presence transport state machine for Plume.
//!
//! This module provides a pure, side-effect-free state machine for the
//! presence transport's lifecycle. It takes events as input and produces a
//! new state plus a list of actions to execute.
//!
//! Reconnection is the transport's own capability: this machine only follows
//! what the transport reports and never schedules retries itself.

/// Transport connection state - NO I/O, just state transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection, and none requested.
    Disconnected,
    /// Connection (or reconnection) in progress.
    Connecting,
    /// Connected; outbound presence may be sent.
    Open,
    /// The transport reported an error and is not usable until it reconnects.
    Erred {
        /// Last error reported by the transport.
        error: String,
    },
}

impl ConnectionState {
    /// Create a new state machine in the Disconnected state.
    pub fn new() -> Self {
        Self::Disconnected
    }

    /// Process an event and return the new state plus actions to execute.
    ///
    /// This is a pure function - no side effects.
    pub fn on_event(self, event: ConnectionEvent) -> (Self, Vec<ConnectionAction>) {
        match (self, event) {
            // Closing is valid from anywhere
            (Self::Disconnected, ConnectionEvent::Closed) => (Self::Disconnected, vec![]),
            (_, ConnectionEvent::Closed) => (
                Self::Disconnected,
                vec![ConnectionAction::Emit(ConnectionNotice::Closed)],
            ),

            // From Disconnected
            (Self::Disconnected, ConnectionEvent::ConnectRequested) => (Self::Connecting, vec![]),

            // From Connecting
            (Self::Connecting, ConnectionEvent::Opened) => (
                Self::Open,
                vec![
                    ConnectionAction::Emit(ConnectionNotice::Opened),
                    ConnectionAction::FlushOutbox,
                ],
            ),
            (Self::Connecting, ConnectionEvent::Failed { error }) => (
                Self::Erred {
                    error: error.clone(),
                },
                vec![ConnectionAction::Emit(ConnectionNotice::Failed { error })],
            ),

            // From Open
            (Self::Open, ConnectionEvent::Failed { error }) => (
                Self::Erred {
                    error: error.clone(),
                },
                vec![ConnectionAction::Emit(ConnectionNotice::Failed { error })],
            ),

            // From Erred
            (Self::Erred { .. }, ConnectionEvent::Reconnecting) => (Self::Connecting, vec![]),
            (Self::Erred { .. }, ConnectionEvent::Opened) => (
                Self::Open,
                vec![
                    ConnectionAction::Emit(ConnectionNotice::Opened),
                    ConnectionAction::FlushOutbox,
                ],
            ),
            (Self::Erred { .. }, ConnectionEvent::Failed { error }) => (
                Self::Erred {
                    error: error.clone(),
                },
                vec![ConnectionAction::Emit(ConnectionNotice::Failed { error })],
            ),

            // Invalid transitions - stay in current state
            (state, _) => (state, vec![]),
        }
    }

    /// Outbound presence is only sent while open.
    pub fn accepts_outbound(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// Inbound presence is accepted in every state except Disconnected.
    pub fn accepts_inbound(&self) -> bool {
        !matches!(self, Self::Disconnected)
    }

    /// Check if currently open.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new()
    }
}

/// Events in the transport lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The session asked the transport to connect.
    ConnectRequested,
    /// The transport reported the connection is open.
    Opened,
    /// The transport reported an error (or a send failed).
    Failed {
        /// Error message describing the failure.
        error: String,
    },
    /// The transport started reconnecting on its own.
    Reconnecting,
    /// The connection was closed.
    Closed,
}

/// Actions produced by a connection transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionAction {
    /// Send everything held in the outbox.
    FlushOutbox,
    /// Report a lifecycle change to the application.
    Emit(ConnectionNotice),
}

/// Lifecycle changes worth reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionNotice {
    /// The connection is open.
    Opened,
    /// The transport failed.
    Failed {
        /// Error message describing the failure.
        error: String,
    },
    /// The connection was closed.
    Closed,
}
