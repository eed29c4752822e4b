//! Bootstrap state machine for Plume.
//!
//! Runs once per session, before any edit or cursor traffic:
//! 1. Fetch the document snapshot
//! 2. If the document has no type yet, create it as an empty rich-text doc
//! 3. Load the snapshot into the replica
//!
//! Another participant may create the document between our fetch and our
//! create. The service then reports a conflict, which is harmless: we fetch
//! again and continue with whatever they created.
//!
//! Like the connection machine, this only decides what to do next. The
//! client performs the fetches and creates and feeds the results back in.

use plume_types::Delta;
use thiserror::Error;

/// Document type this crate edits.
pub const RICH_TEXT: &str = "rich-text";

/// Create attempts allowed before giving up on a document that never appears.
pub const MAX_CREATE_ATTEMPTS: u32 = 3;

/// Materialized document content at a point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Document type, or `None` if the document does not exist yet.
    pub doc_type: Option<String>,
    /// Full content.
    pub content: Delta,
    /// Version the content corresponds to.
    pub version: u64,
}

impl Snapshot {
    /// Snapshot of a document that has not been created.
    pub fn missing() -> Self {
        Self {
            doc_type: None,
            content: Delta::new(),
            version: 0,
        }
    }
}

/// Errors that end a bootstrap.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BootstrapError {
    /// The document exists with a type we cannot edit.
    #[error("document has type {found:?}, expected {expected:?}")]
    WrongType {
        /// Type we can edit.
        expected: String,
        /// Type the service reported.
        found: String,
    },

    /// The document was still missing after repeated create conflicts.
    #[error("document still missing after {0} create attempts")]
    CreateLoop(u32),

    /// An event arrived that does not fit the current phase.
    #[error("unexpected {event} while {phase}")]
    UnexpectedEvent {
        /// Event that arrived.
        event: &'static str,
        /// Phase the machine was in.
        phase: &'static str,
    },
}

/// Results reported back by the client.
#[derive(Debug, Clone, PartialEq)]
pub enum BootstrapEvent {
    /// A fetch completed.
    Fetched(Snapshot),
    /// Our create succeeded.
    Created,
    /// Someone else created the document first.
    CreateConflict,
}

impl BootstrapEvent {
    fn name(&self) -> &'static str {
        match self {
            BootstrapEvent::Fetched(_) => "fetch result",
            BootstrapEvent::Created => "create result",
            BootstrapEvent::CreateConflict => "create conflict",
        }
    }
}

/// Work for the client to perform.
#[derive(Debug, Clone, PartialEq)]
pub enum BootstrapAction {
    /// Fetch the snapshot from the document service.
    FetchSnapshot,
    /// Create the document.
    CreateDocument {
        /// Type to create it as.
        doc_type: String,
        /// Initial content.
        initial: Delta,
    },
    /// Load this snapshot into the replica; bootstrap is then complete.
    LoadSnapshot {
        /// Content to load.
        content: Delta,
        /// Version of that content.
        version: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Fetching { creates: u32 },
    Creating { creates: u32 },
    Loaded,
}

impl Phase {
    fn name(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Fetching { .. } => "fetching",
            Phase::Creating { .. } => "creating",
            Phase::Loaded => "loaded",
        }
    }
}

/// One-shot bootstrap sequence.
#[derive(Debug, Clone)]
pub struct Bootstrap {
    expected_type: String,
    phase: Phase,
}

impl Bootstrap {
    /// Bootstrap a document of the given type.
    pub fn new(expected_type: impl Into<String>) -> Self {
        Self {
            expected_type: expected_type.into(),
            phase: Phase::Idle,
        }
    }

    /// Bootstrap a rich-text document.
    pub fn rich_text() -> Self {
        Self::new(RICH_TEXT)
    }

    /// Begin: the first action is always a fetch.
    pub fn start(&mut self) -> Vec<BootstrapAction> {
        if self.phase != Phase::Idle {
            return vec![];
        }
        self.phase = Phase::Fetching { creates: 0 };
        vec![BootstrapAction::FetchSnapshot]
    }

    /// Feed a result back and get the next actions.
    pub fn on_event(&mut self, event: BootstrapEvent) -> Result<Vec<BootstrapAction>, BootstrapError> {
        match (self.phase, event) {
            (Phase::Fetching { creates }, BootstrapEvent::Fetched(snapshot)) => {
                match snapshot.doc_type {
                    None if creates >= MAX_CREATE_ATTEMPTS => {
                        Err(BootstrapError::CreateLoop(creates))
                    }
                    None => {
                        self.phase = Phase::Creating {
                            creates: creates + 1,
                        };
                        Ok(vec![BootstrapAction::CreateDocument {
                            doc_type: self.expected_type.clone(),
                            initial: Delta::new(),
                        }])
                    }
                    Some(found) if found != self.expected_type => Err(BootstrapError::WrongType {
                        expected: self.expected_type.clone(),
                        found,
                    }),
                    Some(_) => {
                        self.phase = Phase::Loaded;
                        Ok(vec![BootstrapAction::LoadSnapshot {
                            content: snapshot.content,
                            version: snapshot.version,
                        }])
                    }
                }
            }

            // Either way the document now exists; fetch it to learn its version
            (Phase::Creating { creates }, BootstrapEvent::Created)
            | (Phase::Creating { creates }, BootstrapEvent::CreateConflict) => {
                self.phase = Phase::Fetching { creates };
                Ok(vec![BootstrapAction::FetchSnapshot])
            }

            (phase, event) => Err(BootstrapError::UnexpectedEvent {
                event: event.name(),
                phase: phase.name(),
            }),
        }
    }

    /// True once the snapshot load has been handed out.
    pub fn is_complete(&self) -> bool {
        self.phase == Phase::Loaded
    }
}
