//! Mock transport for testing.
//!
//! Allows injecting transport events and capturing sent messages for
//! verification.

use super::{Transport, TransportError, TransportEvent};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Mock transport for testing.
///
/// By default `connect()` opens immediately. Turn that off with
/// [`MockTransport::set_auto_open`] to hold the connection in the
/// connecting state until [`MockTransport::emit`] reports `Open`.
#[derive(Debug)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

#[derive(Debug)]
struct MockTransportInner {
    connected: bool,
    auto_open: bool,
    connect_calls: usize,
    events: Option<UnboundedSender<TransportEvent>>,
    sent_messages: Vec<Vec<u8>>,
    fail_next_connect: Option<String>,
    fail_next_send: Option<String>,
}

impl Default for MockTransportInner {
    fn default() -> Self {
        Self {
            connected: false,
            auto_open: true,
            connect_calls: 0,
            events: None,
            sent_messages: Vec::new(),
            fail_next_connect: None,
            fail_next_send: None,
        }
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Create a new mock transport.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MockTransportInner::default())),
        }
    }

    /// Whether `connect()` reports `Open` straight away.
    pub fn set_auto_open(&self, auto_open: bool) {
        let mut inner = self.inner.lock().unwrap();
        inner.auto_open = auto_open;
    }

    /// Report an event as if the network produced it.
    ///
    /// Returns false if nobody is listening.
    pub fn emit(&self, event: TransportEvent) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match &event {
            TransportEvent::Open => inner.connected = true,
            TransportEvent::Error(_) | TransportEvent::Reconnecting | TransportEvent::Closed => {
                inner.connected = false
            }
            TransportEvent::Data(_) => {}
        }
        match &inner.events {
            Some(sender) => sender.send(event).is_ok(),
            None => false,
        }
    }

    /// Deliver a message from another participant.
    pub fn deliver(&self, data: Vec<u8>) -> bool {
        self.emit(TransportEvent::Data(data))
    }

    /// Get all messages that were sent.
    pub fn sent_messages(&self) -> Vec<Vec<u8>> {
        let inner = self.inner.lock().unwrap();
        inner.sent_messages.clone()
    }

    /// Get the last message that was sent.
    pub fn last_sent(&self) -> Option<Vec<u8>> {
        let inner = self.inner.lock().unwrap();
        inner.sent_messages.last().cloned()
    }

    /// Remove and return everything sent so far.
    pub fn take_sent(&self) -> Vec<Vec<u8>> {
        let mut inner = self.inner.lock().unwrap();
        std::mem::take(&mut inner.sent_messages)
    }

    /// How many times `connect()` was called.
    pub fn connect_calls(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.connect_calls
    }

    /// Cause the next connect() to fail with the given error.
    pub fn fail_next_connect(&self, error: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_next_connect = Some(error.to_string());
    }

    /// Cause the next send() to fail with the given error.
    pub fn fail_next_send(&self, error: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_next_send = Some(error.to_string());
    }

    /// Clear all state (messages, listener, connection).
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        *inner = MockTransportInner::default();
    }
}

impl Clone for MockTransport {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self) -> Result<UnboundedReceiver<TransportEvent>, TransportError> {
        let mut inner = self.inner.lock().unwrap();
        inner.connect_calls += 1;

        // Check for forced failure
        if let Some(error) = inner.fail_next_connect.take() {
            return Err(TransportError::ConnectionFailed(error));
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        if inner.auto_open {
            inner.connected = true;
            // Receiver is alive, cannot fail
            let _ = sender.send(TransportEvent::Open);
        }
        inner.events = Some(sender);
        Ok(receiver)
    }

    async fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();

        if !inner.connected {
            return Err(TransportError::NotConnected);
        }

        // Check for forced failure
        if let Some(error) = inner.fail_next_send.take() {
            return Err(TransportError::SendFailed(error));
        }

        inner.sent_messages.push(data.to_vec());
        Ok(())
    }

    fn is_connected(&self) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.connected
    }

    async fn close(&self) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        inner.connected = false;
        inner.events = None;
        Ok(())
    }
}
