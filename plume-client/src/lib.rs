//! # plume-client
//!
//! Client library for Plume collaborative rich-text editing.
//!
//! This is the library an application embeds to connect an editor widget
//! to a shared document and to the other participants' cursors.
//!
//! ## Features
//!
//! - **Loop-free sync**: own edits are never applied twice, rendered
//!   remote edits are never resubmitted
//! - **Live cursors**: remote cursors redraw in place and expire when silent
//! - **Pluggable collaborators**: [`DocumentService`], [`Transport`] and
//!   [`Editor`] traits, with in-memory and mock implementations
//! - **Pure State Machine**: Uses plume-core for side-effect-free logic
//!
//! ## Example
//!
//! ```ignore
//! use plume_client::{SessionConfig, SyncSession};
//!
//! let config = SessionConfig::from_file(Path::new("plume.toml"))?;
//! let mut session = SyncSession::start(&config, docs, transport, editor).await?;
//!
//! session.set_display_name("Ann");
//! session.run(shutdown_signal).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod document;
pub mod editor;
pub mod session;
pub mod transport;

pub use config::{ConfigError, SessionConfig};
pub use document::{DocumentError, DocumentService, MemoryDocumentHub, MemoryDocumentService};
pub use editor::{Editor, EditorEvent, MockEditor};
pub use session::{ClientError, Subscriptions, SyncSession};
pub use transport::{MockTransport, Transport, TransportError, TransportEvent};
