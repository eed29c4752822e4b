//! Origin-tagged operations.
//!
//! A [`Delta`] carries no notion of where it came from. Origin is decided at
//! the boundary and travels alongside the delta in these wrappers, so the
//! session can `match` on it instead of testing a loose flag.

use plume_types::Delta;

/// Who produced an operation delivered by the document service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpOrigin {
    /// The service echoing back an operation this session submitted.
    LocalEcho,
    /// An operation submitted by another participant.
    Remote,
}

/// An operation delivered by the document service.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteOperation {
    /// The change itself.
    pub delta: Delta,
    /// Whether this is an echo of our own submission.
    pub origin: OpOrigin,
    /// Document version after the service applied this operation.
    pub version: u64,
}

impl RemoteOperation {
    /// An operation from another participant.
    pub fn remote(delta: Delta, version: u64) -> Self {
        Self {
            delta,
            origin: OpOrigin::Remote,
            version,
        }
    }

    /// An echo of one of our own submissions.
    pub fn echo(delta: Delta, version: u64) -> Self {
        Self {
            delta,
            origin: OpOrigin::LocalEcho,
            version,
        }
    }
}

/// Why the editor's content changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeSource {
    /// The local user typed or formatted.
    User,
    /// The session pushed content into the editor.
    Api,
}

/// A user edit captured from the editor, ready to submit.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalOperation {
    delta: Delta,
    base_version: u64,
}

impl LocalOperation {
    /// An edit made on top of document version `base_version`.
    pub fn new(delta: Delta, base_version: u64) -> Self {
        Self {
            delta,
            base_version,
        }
    }

    /// The captured change.
    pub fn delta(&self) -> &Delta {
        &self.delta
    }

    /// The service version this edit was made against.
    pub fn base_version(&self) -> u64 {
        self.base_version
    }

    /// Unwrap into the delta for submission.
    pub fn into_delta(self) -> Delta {
        self.delta
    }
}
