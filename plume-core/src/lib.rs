//! # plume-core
//!
//! Pure logic for Plume (no I/O, instant tests).
//!
//! This crate implements the state machines and algorithms for collaborative
//! rich-text editing without any network, editor or clock access, enabling
//! fast unit tests.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input and produce output
//! without side effects:
//! - [`replica`]: the local copy of the document and delta application
//! - [`transform`]: rebasing concurrent changes
//! - [`registry`]: remote cursors keyed by participant
//! - [`bootstrap`]: fetch, create-if-missing, load
//! - [`connection`] and [`outbox`]: presence transport lifecycle
//! - [`session`]: ties the above together, one event at a time
//!
//! Time is passed in as [`std::time::Instant`] values rather than read.
//! The actual I/O is performed by `plume-client`, which interprets the
//! actions produced by these state machines.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bootstrap;
pub mod connection;
pub mod operation;
pub mod outbox;
pub mod registry;
pub mod replica;
pub mod session;
pub mod transform;

pub use bootstrap::{
    Bootstrap, BootstrapAction, BootstrapError, BootstrapEvent, Snapshot, MAX_CREATE_ATTEMPTS,
    RICH_TEXT,
};
pub use connection::{ConnectionAction, ConnectionEvent, ConnectionNotice, ConnectionState};
pub use operation::{ChangeSource, LocalOperation, OpOrigin, RemoteOperation};
pub use outbox::{Offer, OutboundPolicy, Outbox};
pub use registry::{CursorRegistry, CursorState};
pub use replica::{apply, DocumentReplica, EchoApplied, RemoteApplied, ReplicaError};
pub use session::{
    Action, Event, Lifecycle, LocalPresence, Selection, Session, SessionError, SessionEvent,
    SessionSettings, DEFAULT_STALE_AFTER,
};
pub use transform::transform;
