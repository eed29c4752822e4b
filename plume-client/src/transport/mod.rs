//! Presence transport abstraction for Plume.
//!
//! The transport is a bidirectional message channel carrying cursor
//! traffic between participants. It is not involved in document edits.
//!
//! # Design
//!
//! The transport trait is async and event-oriented:
//! - `connect()` starts connecting and returns the stream of lifecycle and
//!   data events
//! - `send()` transmits presence bytes
//! - `close()` gracefully terminates
//!
//! Reconnecting after an error is the transport's job. It reports
//! [`TransportEvent::Reconnecting`] and then [`TransportEvent::Open`] again
//! on the same event stream.
//!
//! # Example
//!
//! ```ignore
//! let transport = MockTransport::new();
//! let mut events = transport.connect().await?;
//! assert_eq!(events.recv().await, Some(TransportEvent::Open));
//! transport.send(&presence_bytes).await?;
//! ```

mod mock;

pub use mock::MockTransport;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedReceiver;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Not connected.
    #[error("not connected")]
    NotConnected,

    /// Connection closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// Send failed.
    #[error("send failed: {0}")]
    SendFailed(String),
}

/// Something the transport reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The connection is open.
    Open,
    /// A message arrived.
    Data(Vec<u8>),
    /// The connection failed.
    Error(String),
    /// The transport is reconnecting on its own.
    Reconnecting,
    /// The connection closed for good.
    Closed,
}

/// Transport trait for exchanging presence messages.
///
/// Implementations handle the underlying connection mechanism
/// (WebSocket, in-process, mock, etc).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Start connecting.
    ///
    /// Returns the event stream; [`TransportEvent::Open`] arrives on it
    /// once the connection is usable.
    async fn connect(&self) -> Result<UnboundedReceiver<TransportEvent>, TransportError>;

    /// Send bytes over the connection.
    async fn send(&self, data: &[u8]) -> Result<(), TransportError>;

    /// Check if currently connected.
    fn is_connected(&self) -> bool;

    /// Close the connection gracefully.
    async fn close(&self) -> Result<(), TransportError>;
}
