//! Outbound presence buffer for Plume.
//!
//! While the transport is not open, cursor messages are either held here or
//! dropped, depending on [`OutboundPolicy`]. The buffer is:
//! - FIFO, so a participant's cursor updates go out in the order produced
//! - Bounded, evicting the oldest message when full
//!
//! Presence is last-writer-wins, so when space runs out the newest position
//! is the one worth keeping.

use std::collections::VecDeque;

use plume_types::PresenceMessage;

/// What to do with outbound presence while the transport is not open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboundPolicy {
    /// Hold up to `capacity` messages and flush them on open.
    Queue {
        /// Maximum number of held messages.
        capacity: usize,
    },
    /// Discard messages produced while not open.
    Drop,
}

impl Default for OutboundPolicy {
    fn default() -> Self {
        Self::Queue { capacity: 32 }
    }
}

/// Result of offering a message to the outbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Offer {
    /// The message was queued.
    Queued,
    /// The message was queued and the oldest held message was evicted.
    Displaced(PresenceMessage),
    /// The policy discards messages; nothing was queued.
    Dropped(PresenceMessage),
}

/// Bounded FIFO of presence messages waiting for the transport.
#[derive(Debug)]
pub struct Outbox {
    policy: OutboundPolicy,
    queue: VecDeque<PresenceMessage>,
}

impl Outbox {
    /// Create an outbox with the given policy.
    pub fn new(policy: OutboundPolicy) -> Self {
        Self {
            policy,
            queue: VecDeque::new(),
        }
    }

    /// The configured policy.
    pub fn policy(&self) -> OutboundPolicy {
        self.policy
    }

    /// Offer a message produced while the transport is not open.
    pub fn offer(&mut self, msg: PresenceMessage) -> Offer {
        match self.policy {
            OutboundPolicy::Drop => Offer::Dropped(msg),
            OutboundPolicy::Queue { capacity: 0 } => Offer::Dropped(msg),
            OutboundPolicy::Queue { capacity } => {
                let displaced = if self.queue.len() >= capacity {
                    self.queue.pop_front()
                } else {
                    None
                };
                self.queue.push_back(msg);
                match displaced {
                    Some(old) => Offer::Displaced(old),
                    None => Offer::Queued,
                }
            }
        }
    }

    /// Take every held message, oldest first.
    pub fn drain(&mut self) -> Vec<PresenceMessage> {
        self.queue.drain(..).collect()
    }

    /// Number of held messages.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Check if nothing is held.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Discard all held messages.
    pub fn clear(&mut self) {
        self.queue.clear();
    }
}
